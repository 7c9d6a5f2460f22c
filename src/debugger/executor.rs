use super::commands::{BreakpointAction, Command, CommandError, CommandResult, SetTarget};
use crate::emu::{
    Chip8Error, Chip8Runner, Chip8RunnerResult, Display, MEMORY_SIZE, Opcode, RunState,
};
use std::collections::HashSet;

/// Drives a runner on behalf of an interactive debugger.
///
/// The machine's own run state doubles as the debugger's running/paused flag, so the
/// debugger always starts paused.
pub struct Executor {
    runner: Chip8Runner,
    breakpoints: HashSet<u16>,
}

impl Executor {
    pub fn new(mut runner: Chip8Runner) -> Self {
        runner.set_run_state(RunState::Paused);

        Self {
            runner,
            breakpoints: HashSet::new(),
        }
    }

    pub fn poll(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        if !self.is_running() {
            return Ok(Chip8RunnerResult::Ok {
                display_updated: false,
            });
        }

        let result = self
            .runner
            .update_with_breakpoints(dt, Some(&self.breakpoints));

        if matches!(result, Err(_) | Ok(Chip8RunnerResult::HitBreakpoint)) {
            self.pause();
        }

        result
    }

    pub fn execute(&mut self, command: Command) -> Result<CommandResult, CommandError> {
        match command {
            Command::Run => {
                self.run();
                Ok(CommandResult::Ok)
            }
            Command::Pause => {
                self.pause();
                Ok(CommandResult::Ok)
            }
            Command::Step => self.step(),
            Command::Breakpoint { action } => Ok(self.handle_breakpoint(action)),
            Command::Set { target, value } => self.handle_set(target, value),
            Command::Mem { start, len } => self.handle_mem(start, len),
            Command::Disasm { start, len } => self.handle_disasm(start, len),
            Command::Quit => {
                self.runner.set_run_state(RunState::Quit);
                Ok(CommandResult::Quit)
            }
        }
    }

    pub fn run(&mut self) {
        self.runner.set_run_state(RunState::Running);
    }

    pub fn pause(&mut self) {
        self.runner.set_run_state(RunState::Paused);
    }

    /// Executes one instruction. A machine that has quit stays put.
    pub fn step(&mut self) -> Result<CommandResult, CommandError> {
        if self.runner.run_state() == RunState::Quit {
            return Ok(CommandResult::Quit);
        }

        self.runner.chip8_mut().cpu_cycle()?;
        Ok(CommandResult::Ok)
    }

    pub fn is_running(&self) -> bool {
        self.runner.run_state() == RunState::Running
    }

    pub fn get_display(&self) -> &Display<bool> {
        self.runner.chip8_ref().display()
    }

    pub fn get_pc(&self) -> u16 {
        self.runner.chip8_ref().pc()
    }

    pub fn get_i(&self) -> u16 {
        self.runner.chip8_ref().i()
    }

    pub fn get_v(&self) -> &[u8; 16] {
        self.runner.chip8_ref().v()
    }

    pub fn get_stack(&self) -> &[u16] {
        self.runner.chip8_ref().stack()
    }

    pub fn get_delay_timer(&self) -> u8 {
        self.runner.chip8_ref().delay_timer()
    }

    pub fn get_sound_timer(&self) -> u8 {
        self.runner.chip8_ref().sound_timer()
    }

    pub fn get_keypad(&self) -> &[bool; 16] {
        self.runner.chip8_ref().keypad()
    }

    pub fn get_memory(&self) -> &[u8; MEMORY_SIZE] {
        self.runner.chip8_ref().memory()
    }

    pub fn run_state(&self) -> RunState {
        self.runner.run_state()
    }

    pub fn breakpoints(&self) -> &HashSet<u16> {
        &self.breakpoints
    }

    pub fn runner_mut(&mut self) -> &mut Chip8Runner {
        &mut self.runner
    }

    fn handle_breakpoint(&mut self, action: BreakpointAction) -> CommandResult {
        match action {
            BreakpointAction::Set { addr } => {
                self.breakpoints.insert(addr);
            }
            BreakpointAction::Clear { addr } => {
                self.breakpoints.remove(&addr);
            }
            BreakpointAction::ClearAll => {
                self.breakpoints.clear();
            }
            BreakpointAction::List => {
                let mut bps: Vec<u16> = self.breakpoints.iter().copied().collect();
                bps.sort_unstable();
                return CommandResult::Breakpoints(bps);
            }
        };

        CommandResult::Ok
    }

    fn handle_set(&mut self, target: SetTarget, value: u16) -> Result<CommandResult, CommandError> {
        let chip8 = self.runner.chip8_mut();

        match target {
            SetTarget::V(reg) => {
                chip8.v[reg] = u8::try_from(value).map_err(|_| CommandError::ValueOutOfRange)?;
            }
            SetTarget::I => {
                chip8.i = value;
            }
            SetTarget::Pc => {
                if usize::from(value) >= MEMORY_SIZE {
                    return Err(CommandError::ValueOutOfRange);
                }
                chip8.pc = value;
            }
        }

        Ok(CommandResult::Ok)
    }

    fn handle_mem(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let range = Self::memory_range(start, usize::from(len))?;

        Ok(CommandResult::MemDump {
            data: self.runner.chip8_ref().memory()[range].to_vec(),
            offset: start,
        })
    }

    fn handle_disasm(&self, start: u16, len: u16) -> Result<CommandResult, CommandError> {
        let range = Self::memory_range(start, usize::from(len) * 2)?;

        let instructions = self.runner.chip8_ref().memory()[range]
            .chunks_exact(2)
            .map(|word| {
                let raw = u16::from_be_bytes([word[0], word[1]]);
                (raw, Opcode::decode(raw))
            })
            .collect();

        Ok(CommandResult::Disasm {
            instructions,
            offset: start,
        })
    }

    /// Clamps `start..start + len` to the end of memory.
    fn memory_range(start: u16, len: usize) -> Result<std::ops::Range<usize>, CommandError> {
        let start = usize::from(start);
        if start >= MEMORY_SIZE {
            return Err(CommandError::ValueOutOfRange);
        }

        Ok(start..std::cmp::min(start + len, MEMORY_SIZE))
    }
}
