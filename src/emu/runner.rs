use super::{Chip8, Chip8Error, Chip8Result, RunState};
use crate::u4;
use std::collections::HashSet;

pub const TIMER_HZ: f32 = 60.0;
pub const FRAME_TIME_STEP: f32 = 1.0 / TIMER_HZ;

pub const DEFAULT_INSTRUCTIONS_PER_SECOND: u32 = 700;

/// Settings that affect how the machine is driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Chip8Config {
    /// CPU clock rate; executed in bursts of `cycles_per_frame` per 60Hz frame.
    pub instructions_per_second: u32,
}

impl Chip8Config {
    pub fn cycles_per_frame(&self) -> u32 {
        (self.instructions_per_second as f32 / TIMER_HZ).round() as u32
    }
}

impl Default for Chip8Config {
    fn default() -> Self {
        Self {
            instructions_per_second: DEFAULT_INSTRUCTIONS_PER_SECOND,
        }
    }
}

/// High-level emulator runner that paces instruction bursts and timer ticks into frames.
pub struct Chip8Runner {
    chip8: Chip8,
    config: Chip8Config,
    frame_dt_accumulator: f32,
    tone: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip8RunnerResult {
    /// Execution stopped on a breakpoint address; the current frame was abandoned.
    HitBreakpoint,
    /// The machine is in the terminal `Quit` state.
    Quit,
    /// Zero or more frames ran to completion.
    Ok { display_updated: bool },
}

impl Chip8Runner {
    pub fn new(chip8: Chip8, config: Chip8Config) -> Self {
        Self {
            chip8,
            config,
            frame_dt_accumulator: 0.0,
            tone: false,
        }
    }

    /// Update emulator by delta time.
    ///
    /// Runs one frame for every full 1/60s accumulated in `dt`. Leftover time carries over.
    pub fn update(&mut self, dt: f32) -> Result<Chip8RunnerResult, Chip8Error> {
        self.update_with_breakpoints(dt, None)
    }

    /// Like `update` but checks for breakpoints after each CPU cycle.
    pub fn update_with_breakpoints(
        &mut self,
        dt: f32,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<Chip8RunnerResult, Chip8Error> {
        self.frame_dt_accumulator += dt;

        let mut display_updated = false;
        while self.frame_dt_accumulator >= FRAME_TIME_STEP {
            self.frame_dt_accumulator -= FRAME_TIME_STEP;

            match self.run_frame(breakpoints)? {
                Chip8RunnerResult::Ok { display_updated: d } => display_updated |= d,
                other => {
                    // Don't "catch up" on frames missed while stopped
                    self.frame_dt_accumulator = 0.0;
                    return Ok(other);
                }
            }
        }

        Ok(Chip8RunnerResult::Ok { display_updated })
    }

    /// Runs a single frame: an instruction burst followed by one timer tick.
    ///
    /// Nothing executes while paused, and the timers stay frozen. A breakpoint ends the
    /// burst early, after the timers have ticked for the frame.
    pub fn run_frame(
        &mut self,
        breakpoints: Option<&HashSet<u16>>,
    ) -> Result<Chip8RunnerResult, Chip8Error> {
        match self.chip8.run_state() {
            RunState::Quit => return Ok(Chip8RunnerResult::Quit),
            RunState::Paused => {
                return Ok(Chip8RunnerResult::Ok {
                    display_updated: false,
                });
            }
            RunState::Running => {}
        }

        let mut display_updated = false;
        for _ in 0..self.config.cycles_per_frame() {
            if self.chip8.cpu_cycle()? == Chip8Result::DisplayUpdated {
                display_updated = true;
            }

            if let Some(breakpoints) = breakpoints
                && breakpoints.contains(&self.chip8.pc)
            {
                // The frame is cut short but still owns its timer tick
                self.tone = self.chip8.timers_cycle();
                return Ok(Chip8RunnerResult::HitBreakpoint);
            }
        }

        self.tone = self.chip8.timers_cycle();

        Ok(Chip8RunnerResult::Ok { display_updated })
    }

    /// Whether the last timer tick asked for the tone to play.
    pub fn tone_active(&self) -> bool {
        self.tone
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.chip8.get_display_pixel(y, x)
    }

    pub fn run_state(&self) -> RunState {
        self.chip8.run_state()
    }

    pub fn set_run_state(&mut self, state: RunState) {
        self.chip8.set_run_state(state);
        if state != RunState::Running {
            self.tone = false;
        }
    }

    pub fn toggle_pause(&mut self) {
        self.chip8.toggle_pause();
        if self.chip8.run_state() != RunState::Running {
            self.tone = false;
        }
    }

    pub fn config(&self) -> &Chip8Config {
        &self.config
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner(program: &[u8], instructions_per_second: u32) -> Chip8Runner {
        let mut chip8 = Chip8::new();
        chip8.load(program).unwrap();
        Chip8Runner::new(
            chip8,
            Chip8Config {
                instructions_per_second,
            },
        )
    }

    // ADD V0, 1 ; JP 0x200
    const COUNTER: [u8; 4] = [0x70, 0x01, 0x12, 0x00];

    #[test]
    fn cycles_per_frame_rounds() {
        assert_eq!(Chip8Config::default().cycles_per_frame(), 12);
        let config = Chip8Config {
            instructions_per_second: 60,
        };
        assert_eq!(config.cycles_per_frame(), 1);
        let config = Chip8Config {
            instructions_per_second: 20,
        };
        assert_eq!(config.cycles_per_frame(), 0);
    }

    #[test]
    fn frame_runs_burst_then_ticks_timers() {
        let mut runner = runner(&COUNTER, 600);
        runner.chip8_mut().delay_timer = 3;

        let result = runner.run_frame(None).unwrap();
        assert_eq!(
            result,
            Chip8RunnerResult::Ok {
                display_updated: false
            }
        );
        // 10 instructions: 5 adds, 5 jumps
        assert_eq!(runner.chip8_ref().v()[0], 5);
        assert_eq!(runner.chip8_ref().delay_timer(), 2);
    }

    #[test]
    fn paused_machine_does_not_advance() {
        let mut runner = runner(&COUNTER, 600);
        runner.chip8_mut().delay_timer = 3;
        runner.toggle_pause();

        runner.update(1.0).unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 0);
        assert_eq!(runner.chip8_ref().delay_timer(), 3);

        runner.toggle_pause();
        runner.run_frame(None).unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 5);
    }

    #[test]
    fn quit_stops_the_runner() {
        let mut runner = runner(&COUNTER, 600);
        runner.set_run_state(RunState::Quit);

        assert_eq!(runner.update(1.0).unwrap(), Chip8RunnerResult::Quit);
        assert_eq!(runner.chip8_ref().pc(), 0x200);
    }

    #[test]
    fn update_accumulates_partial_frames() {
        let mut runner = runner(&COUNTER, 120);

        runner.update(FRAME_TIME_STEP * 0.5).unwrap();
        assert_eq!(runner.chip8_ref().pc(), 0x200);

        runner.update(FRAME_TIME_STEP * 0.6).unwrap();
        assert_eq!(runner.chip8_ref().v()[0], 1);
    }

    #[test]
    fn breakpoint_interrupts_the_burst() {
        let mut runner = runner(&COUNTER, 600);
        let breakpoints = HashSet::from([0x202]);

        let result = runner.run_frame(Some(&breakpoints)).unwrap();
        assert_eq!(result, Chip8RunnerResult::HitBreakpoint);
        assert_eq!(runner.chip8_ref().pc(), 0x202);
        assert_eq!(runner.chip8_ref().v()[0], 1);
    }

    #[test]
    fn breakpoint_frames_still_tick_timers() {
        let mut runner = runner(&COUNTER, 600);
        runner.chip8_mut().delay_timer = 3;
        runner.chip8_mut().sound_timer = 2;
        let breakpoints = HashSet::from([0x202]);

        for _ in 0..2 {
            let result = runner.run_frame(Some(&breakpoints)).unwrap();
            assert_eq!(result, Chip8RunnerResult::HitBreakpoint);
        }
        assert_eq!(runner.chip8_ref().delay_timer(), 1);
        assert_eq!(runner.chip8_ref().sound_timer(), 0);
        assert!(runner.tone_active());
    }

    #[test]
    fn draw_marks_display_updated() {
        // DRW V0, V0, 1 ; JP 0x202
        let mut runner = runner(&[0xD0, 0x01, 0x12, 0x02], 120);

        let result = runner.run_frame(None).unwrap();
        assert_eq!(
            result,
            Chip8RunnerResult::Ok {
                display_updated: true
            }
        );
        assert!(runner.get_display_pixel(0, 0));
    }

    #[test]
    fn tone_follows_sound_timer_ticks() {
        let mut runner = runner(&COUNTER, 60);
        runner.chip8_mut().sound_timer = 1;

        runner.run_frame(None).unwrap();
        assert!(runner.tone_active());
        assert!(!runner.should_beep());

        runner.run_frame(None).unwrap();
        assert!(!runner.tone_active());
    }

    #[test]
    fn execution_errors_propagate() {
        // RET with an empty stack
        let mut runner = runner(&[0x00, 0xEE], 600);
        assert!(matches!(
            runner.update(FRAME_TIME_STEP),
            Err(Chip8Error::StackUnderflow)
        ));
    }
}
