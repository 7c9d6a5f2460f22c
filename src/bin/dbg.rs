use std::{
    fmt::Write as _,
    path::PathBuf,
    time::{Duration, Instant},
};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    debugger::{Cli, Command, CommandResult, Executor},
    emu::{
        Chip8, Chip8Config, Chip8Runner, Chip8RunnerResult, DEFAULT_INSTRUCTIONS_PER_SECOND,
        DISPLAY_X, DISPLAY_Y, Opcode, RunState, STACK_CAPACITY,
    },
    u4,
};

/// Maps a terminal key onto the hex keypad using the 1234/QWER/ASDF/ZXCV block.
fn keypad_index(code: KeyCode) -> Option<u4> {
    let KeyCode::Char(c) = code else {
        return None;
    };

    let key = match c.to_ascii_lowercase() {
        '1' => 0x1,
        '2' => 0x2,
        '3' => 0x3,
        '4' => 0xC,
        'q' => 0x4,
        'w' => 0x5,
        'e' => 0x6,
        'r' => 0xD,
        'a' => 0x7,
        's' => 0x8,
        'd' => 0x9,
        'f' => 0xE,
        'z' => 0xA,
        'x' => 0x0,
        'c' => 0xB,
        'v' => 0xF,
        _ => return None,
    };

    Some(u4::new(key))
}

// Most terminals never report key releases, so a key stays held for a short
// while after its last press or auto-repeat.
const KEY_HOLD_TIME: Duration = Duration::from_millis(50);

#[derive(Default)]
struct HeldKeys([Option<Instant>; 16]);

impl HeldKeys {
    fn press(&mut self, key: u4, now: Instant) {
        self.0[key] = Some(now);
    }

    /// Forgets keys not seen within the hold time and returns them.
    fn expire(&mut self, now: Instant) -> Vec<u4> {
        let mut released = Vec::new();

        for (idx, seen) in self.0.iter_mut().enumerate() {
            if let Some(at) = *seen
                && now.duration_since(at) > KEY_HOLD_TIME
            {
                *seen = None;
                released.push(u4::new(idx as u8));
            }
        }

        released
    }
}

/// Text for the output pane, or `None` when the debugger should exit.
fn describe(result: CommandResult) -> Option<String> {
    let text = match result {
        CommandResult::Quit => return None,
        CommandResult::Ok => "OK".to_string(),
        CommandResult::Breakpoints(bps) if bps.is_empty() => "No breakpoints".to_string(),
        CommandResult::Breakpoints(bps) => {
            let list: Vec<String> = bps.iter().map(|bp| format!("{bp:03X}")).collect();
            format!("Breakpoints: {}", list.join(", "))
        }
        CommandResult::MemDump { data, offset } => {
            let mut text = String::new();
            for (row, chunk) in data.chunks(16).enumerate() {
                let addr = usize::from(offset) + row * 16;
                let bytes: Vec<String> = chunk.iter().map(|b| format!("{b:02X}")).collect();
                let _ = writeln!(text, "{addr:03X}: {}", bytes.join(" "));
            }
            text
        }
        CommandResult::Disasm {
            instructions,
            offset,
        } => {
            let mut text = String::new();
            for (idx, (raw, opcode)) in instructions.iter().enumerate() {
                let addr = usize::from(offset) + idx * 2;
                let _ = writeln!(text, "{addr:03X}: {raw:04X}  {opcode}");
            }
            text
        }
    };

    Some(text)
}

/// First address of the code pane: up to a third of `rows` above `pc`, on the same
/// alignment as `pc` so its row is always visible.
fn code_window_start(pc: usize, rows: usize) -> usize {
    pc - 2 * std::cmp::min(rows / 3, pc / 2)
}

struct App {
    executor: Executor,
    input: String,
    output: String,
    should_quit: bool,
    last_tick: Instant,
    last_command: Option<Command>,
    held_keys: HeldKeys,
}

impl App {
    fn new(rom: &[u8], config: Chip8Config) -> anyhow::Result<Self> {
        let mut chip8 = Chip8::new();
        chip8
            .load(rom)
            .context("ROM does not fit in CHIP-8 memory")?;

        Ok(Self {
            executor: Executor::new(Chip8Runner::new(chip8, config)),
            input: String::new(),
            output: "Paused. Type `run` to start.".to_string(),
            should_quit: false,
            last_tick: Instant::now(),
            last_command: None,
            held_keys: HeldKeys::default(),
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let now = Instant::now();
            let dt = now.duration_since(self.last_tick).as_secs_f32();
            self.last_tick = now;

            self.poll_machine(dt);
            terminal.draw(|frame| frame.render_widget(&*self, frame.area()))?;

            for key in self.held_keys.expire(Instant::now()) {
                self.executor.runner_mut().set_key(key, false);
            }

            if event::poll(Duration::from_millis(16))?
                && let Event::Key(key) = event::read()?
            {
                self.on_key(key);
            }
        }

        Ok(())
    }

    fn poll_machine(&mut self, dt: f32) {
        match self.executor.poll(dt) {
            Ok(Chip8RunnerResult::HitBreakpoint) => {
                self.output = format!("Hit breakpoint at {:03X}", self.executor.get_pc());
            }
            Ok(Chip8RunnerResult::Quit) => self.should_quit = true,
            Ok(Chip8RunnerResult::Ok { .. }) => {}
            Err(e) => self.output = format!("Stopped: {e}"),
        }
    }

    fn on_key(&mut self, key: KeyEvent) {
        let interrupt =
            key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL);

        if interrupt {
            self.should_quit = true;
        } else if self.executor.is_running() {
            self.on_running_key(key.code);
        } else if key.kind == KeyEventKind::Press {
            self.on_prompt_key(key.code);
        }
    }

    /// While running, keys feed the keypad and Esc drops back to the prompt.
    fn on_running_key(&mut self, code: KeyCode) {
        if code == KeyCode::Esc {
            self.executor.pause();
            self.output = "Paused".to_string();
        } else if let Some(key) = keypad_index(code) {
            self.executor.runner_mut().set_key(key, true);
            self.held_keys.press(key, Instant::now());
        }
    }

    fn on_prompt_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Esc => self.should_quit = true,
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            _ => {}
        }
    }

    fn submit(&mut self) {
        let line = std::mem::take(&mut self.input);

        // An empty line repeats the previous command
        let command = if line.trim().is_empty() {
            let Some(command) = self.last_command.clone() else {
                return;
            };
            command
        } else {
            match Cli::try_parse_from(line.split_whitespace()) {
                Ok(cli) => cli.command,
                Err(e) => {
                    self.output = e.to_string();
                    self.last_command = None;
                    return;
                }
            }
        };
        self.last_command = Some(command.clone());

        match self.executor.execute(command) {
            Ok(result) => match describe(result) {
                Some(text) => self.output = text,
                None => self.should_quit = true,
            },
            Err(e) => self.output = e.to_string(),
        }
    }
}

const CODE_WIDTH: u16 = 28;
const SIDE_WIDTH: u16 = 17;
/// Two CHIP-8 rows share one terminal row using half blocks.
const DISPLAY_ROWS: u16 = DISPLAY_Y as u16 / 2;

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + CODE_WIDTH + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = 3 + 11 + 2 + 4 + 2 + 3;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            let message = format!(
                "Need at least {MIN_WIDTH}x{MIN_HEIGHT}, have {}x{}",
                area.width, area.height
            );

            Paragraph::new(message.red())
                .alignment(Alignment::Center)
                .block(Block::bordered().title(" Too small "))
                .render(area.centered(Constraint::Length(45), Constraint::Length(3)), buf);

            return;
        }

        let [left, code, side] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(CODE_WIDTH),
            Constraint::Length(SIDE_WIDTH),
        ])
        .areas(area);

        let [display, output, input] = Layout::vertical([
            Constraint::Length(DISPLAY_ROWS + 2),
            Constraint::Min(3),
            Constraint::Length(3),
        ])
        .areas(left);

        let [state, registers, keypad, stack] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(11 + 2),
            Constraint::Length(4 + 2),
            Constraint::Min(3),
        ])
        .areas(side);

        self.render_display(display, buf);
        self.render_output(output, buf);
        self.render_input(input, buf);
        self.render_code(code, buf);
        self.render_state(state, buf);
        self.render_registers(registers, buf);
        self.render_keypad(keypad, buf);
        self.render_stack(stack, buf);
    }
}

impl App {
    fn render_display(&self, area: Rect, buf: &mut Buffer) {
        let display = self.executor.get_display();

        let text: Vec<Line> = display
            .chunks_exact(2)
            .map(|rows| {
                let cells: String = rows[0]
                    .iter()
                    .zip(rows[1].iter())
                    .map(|(&top, &bottom)| match (top, bottom) {
                        (true, true) => '█',
                        (true, false) => '▀',
                        (false, true) => '▄',
                        (false, false) => ' ',
                    })
                    .collect();
                Line::from(cells.green())
            })
            .collect();

        Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(area, buf);
    }

    /// Disassembly around the program counter, with breakpoints marked.
    fn render_code(&self, area: Rect, buf: &mut Buffer) {
        let pc = usize::from(self.executor.get_pc());
        let memory = self.executor.get_memory();
        let visible = usize::from(area.height.saturating_sub(2));

        let lines: Vec<Line> = (code_window_start(pc, visible)..memory.len())
            .step_by(2)
            .take(visible)
            .map(|addr| {
                let low = memory.get(addr + 1).copied().unwrap_or(0);
                let raw = u16::from_be_bytes([memory[addr], low]);
                let marker = if self.executor.breakpoints().contains(&(addr as u16)) {
                    '●'
                } else {
                    ' '
                };
                let text = format!("{marker}{addr:03X} {raw:04X} {}", Opcode::decode(raw));

                if addr == pc {
                    Line::from(text.black().on_white())
                } else {
                    Line::from(text)
                }
            })
            .collect();

        Paragraph::new(lines)
            .block(Block::bordered().title(" Code "))
            .render(area, buf);
    }

    fn render_registers(&self, area: Rect, buf: &mut Buffer) {
        let v = self.executor.get_v();

        let mut lines = vec![
            Line::from(format!(
                "PC {:03X}  I {:03X}",
                self.executor.get_pc(),
                self.executor.get_i()
            )),
            Line::from(format!(
                "DT {:02X}   ST {:02X}",
                self.executor.get_delay_timer(),
                self.executor.get_sound_timer()
            )),
            Line::from(""),
        ];

        lines.extend((0..8).map(|idx| {
            let right = format!("V{:X} {:02X}", idx + 8, v[idx + 8]);
            Line::from(vec![
                Span::raw(format!("V{:X} {:02X}    ", idx, v[idx])),
                // VF doubles as the flag register
                if idx + 8 == 0xF {
                    right.yellow()
                } else {
                    Span::raw(right)
                },
            ])
        }));

        Paragraph::new(lines)
            .block(Block::bordered().title(" Registers "))
            .render(area, buf);
    }

    fn render_stack(&self, area: Rect, buf: &mut Buffer) {
        let stack = self.executor.get_stack();
        let max_lines = usize::from(area.height.saturating_sub(2)).max(1);

        // Innermost frame first
        let mut lines: Vec<Line> = stack
            .iter()
            .enumerate()
            .rev()
            .take(max_lines)
            .map(|(depth, addr)| Line::from(format!("{depth:>2} {addr:03X}")))
            .collect();

        if lines.is_empty() {
            lines.push(Line::from("Empty".dark_gray()));
        } else if stack.len() > max_lines
            && let Some(last) = lines.last_mut()
        {
            *last = Line::from("...");
        }

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(format!(" Stack {}/{} ", stack.len(), STACK_CAPACITY)))
            .render(area, buf);
    }

    fn render_output(&self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(self.output.as_str())
            .block(Block::bordered().title(" Output "))
            .render(area, buf);
    }

    fn render_input(&self, area: Rect, buf: &mut Buffer) {
        Paragraph::new(Line::from(vec![Span::raw("> "), Span::raw(self.input.as_str())]))
            .block(Block::bordered().title(" Command "))
            .render(area, buf);
    }

    fn render_state(&self, area: Rect, buf: &mut Buffer) {
        let (text, color) = match self.executor.run_state() {
            RunState::Running => ("RUNNING", Color::Green),
            RunState::Paused => ("PAUSED", Color::Yellow),
            RunState::Quit => ("QUIT", Color::Red),
        };
        let tone = if self.executor.get_sound_timer() > 0 {
            " ♪"
        } else {
            ""
        };

        Paragraph::new(Text::styled(format!("{text}{tone}"), Style::default().fg(color)))
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" State "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        const LAYOUT: [[usize; 4]; 4] = [
            [0x1, 0x2, 0x3, 0xC],
            [0x4, 0x5, 0x6, 0xD],
            [0x7, 0x8, 0x9, 0xE],
            [0xA, 0x0, 0xB, 0xF],
        ];
        let keypad = self.executor.get_keypad();

        let lines: Vec<Line> = LAYOUT
            .iter()
            .map(|row| {
                let mut spans = Vec::with_capacity(row.len() * 2);
                for (col, &key) in row.iter().enumerate() {
                    if col > 0 {
                        spans.push(Span::raw(" "));
                    }
                    let label = format!("{key:X}");
                    spans.push(if keypad[key] {
                        label.black().on_white()
                    } else {
                        Span::raw(label)
                    });
                }
                Line::from(spans)
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }
}

/// TUI debugger for CHIP-8
#[derive(Parser)]
struct Args {
    /// Path to the ROM file to load
    rom_path: PathBuf,

    /// Instructions executed per second while running
    #[arg(long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND)]
    ips: u32,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let rom = std::fs::read(&args.rom_path).context("Failed to read ROM file")?;
    let config = Chip8Config {
        instructions_per_second: args.ips,
    };
    let mut app = App::new(&rom, config).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_window_keeps_pc_alignment() {
        assert_eq!(code_window_start(0x200, 12), 0x1F8);
        assert_eq!(code_window_start(0x203, 12), 0x1FB);
        assert_eq!(code_window_start(0x001, 12), 0x001);
        assert_eq!(code_window_start(0x004, 12), 0x000);

        for pc in [0x000, 0x001, 0x202, 0x2A7, 0xFFF] {
            let first = code_window_start(pc, 20);
            assert!(first <= pc);
            assert_eq!((pc - first) % 2, 0);
        }
    }

    #[test]
    fn keypad_uses_left_hand_block() {
        assert_eq!(keypad_index(KeyCode::Char('1')), Some(u4::new(0x1)));
        assert_eq!(keypad_index(KeyCode::Char('4')), Some(u4::new(0xC)));
        assert_eq!(keypad_index(KeyCode::Char('X')), Some(u4::new(0x0)));
        assert_eq!(keypad_index(KeyCode::Char('v')), Some(u4::new(0xF)));
        assert_eq!(keypad_index(KeyCode::Char('5')), None);
        assert_eq!(keypad_index(KeyCode::Enter), None);
    }

    #[test]
    fn held_keys_expire_after_hold_time() {
        let start = Instant::now();
        let mut held = HeldKeys::default();
        held.press(u4::new(0x5), start);

        assert!(held.expire(start + KEY_HOLD_TIME).is_empty());
        assert_eq!(held.expire(start + KEY_HOLD_TIME * 2), vec![u4::new(0x5)]);
        assert!(held.expire(start + KEY_HOLD_TIME * 3).is_empty());
    }

    #[test]
    fn describes_command_results() {
        assert_eq!(describe(CommandResult::Quit), None);
        assert_eq!(
            describe(CommandResult::Breakpoints(vec![0x202, 0x300])).as_deref(),
            Some("Breakpoints: 202, 300")
        );
        assert_eq!(
            describe(CommandResult::MemDump {
                data: vec![0xAB; 18],
                offset: 0x200,
            })
            .as_deref(),
            Some(concat!(
                "200: AB AB AB AB AB AB AB AB AB AB AB AB AB AB AB AB\n",
                "210: AB AB\n"
            ))
        );
        assert_eq!(
            describe(CommandResult::Disasm {
                instructions: vec![(0x00E0, Opcode::decode(0x00E0))],
                offset: 0x204,
            })
            .as_deref(),
            Some("204: 00E0  CLS\n")
        );
    }
}
