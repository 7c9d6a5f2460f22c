use super::{
    CallStack, Chip8Error, Chip8Result, DISPLAY_X, DISPLAY_Y, Display, FONT, FONT_END_ADDRESS,
    FONT_START_ADDRESS, Instruction, Opcode, RunState,
};
use crate::u4;

// Standard CHIP-8 memory layout
pub const ROM_START_ADDRESS: usize = 0x200;
pub const MEMORY_SIZE: usize = 4096;
pub const MAX_ROM_SIZE: usize = MEMORY_SIZE - ROM_START_ADDRESS;

/// CHIP-8 virtual machine state
pub struct Chip8 {
    /// 4KB memory array
    pub(crate) memory: [u8; MEMORY_SIZE],
    /// Display buffer: 64x32 monochrome pixels
    pub(crate) display: Display<bool>,

    /// Program counter: address of the next instruction to execute
    pub(crate) pc: u16,
    /// Index register: used for memory operations
    pub(crate) i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub(crate) v: [u8; 16],
    /// Call stack for subroutine returns
    pub(crate) stack: CallStack,

    /// Delay timer: decrements at 60Hz until it reaches 0
    pub(crate) delay_timer: u8,
    /// Sound timer: decrements at 60Hz, beeps while non-zero
    pub(crate) sound_timer: u8,

    /// Keypad state: 16 keys mapped as booleans (true = pressed)
    pub(crate) keypad: [bool; 16],
    pub(crate) run_state: RunState,
}

impl Chip8 {
    pub fn new() -> Self {
        let mut memory = [0; MEMORY_SIZE];
        memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        Chip8 {
            memory,
            display: [[false; DISPLAY_X]; DISPLAY_Y],
            pc: ROM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            keypad: [false; 16],
            run_state: RunState::Running,
        }
    }

    /// Loads a ROM into memory at the entry point and initializes the font set.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), Chip8Error> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(Chip8Error::RomLoadError {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }

        self.memory[FONT_START_ADDRESS..FONT_END_ADDRESS].copy_from_slice(&FONT);

        let rom_end = ROM_START_ADDRESS + rom.len();
        self.memory[ROM_START_ADDRESS..rom_end].copy_from_slice(rom);

        // Set program counter to start of ROM
        self.pc = ROM_START_ADDRESS as u16;

        log::info!("Loaded {} byte ROM at {:#05X}", rom.len(), ROM_START_ADDRESS);
        Ok(())
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    pub fn cpu_cycle(&mut self) -> Result<Chip8Result, Chip8Error> {
        let address = self.pc;
        let instruction = self.fetch()?;
        let opcode = Opcode::decode(instruction.opcode);

        log::trace!("{address:#05X}: {:04X}  {opcode}", instruction.opcode);

        self.execute(opcode)
    }

    /// Updates the delay and sound timers. Should be called at 60Hz.
    ///
    /// Returns whether the tone should sound during this tick.
    pub fn timers_cycle(&mut self) -> bool {
        self.delay_timer = self.delay_timer.saturating_sub(1);

        if self.sound_timer > 0 {
            self.sound_timer -= 1;
            true
        } else {
            false
        }
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.keypad[key] = pressed;
    }

    /// Overwrite the whole keypad at once.
    pub fn set_keypad(&mut self, keypad: [bool; 16]) {
        self.keypad = keypad;
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, y: usize, x: usize) -> bool {
        self.display[y][x]
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Moves to `state` unless the machine has already quit.
    pub fn set_run_state(&mut self, state: RunState) {
        if self.run_state == RunState::Quit || self.run_state == state {
            return;
        }

        log::debug!("Run state {:?} -> {:?}", self.run_state, state);
        self.run_state = state;
    }

    /// Flips between running and paused.
    pub fn toggle_pause(&mut self) {
        match self.run_state {
            RunState::Running => self.set_run_state(RunState::Paused),
            RunState::Paused => self.set_run_state(RunState::Running),
            RunState::Quit => {}
        }
    }

    pub fn display(&self) -> &Display<bool> {
        &self.display
    }

    pub fn memory(&self) -> &[u8; MEMORY_SIZE] {
        &self.memory
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn i(&self) -> u16 {
        self.i
    }

    pub fn v(&self) -> &[u8; 16] {
        &self.v
    }

    pub fn stack(&self) -> &[u16] {
        self.stack.as_slice()
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound_timer
    }

    pub fn keypad(&self) -> &[bool; 16] {
        &self.keypad
    }

    /// Fetches the next instruction from memory and advances the program counter past it.
    fn fetch(&mut self) -> Result<Instruction, Chip8Error> {
        let high = *self.mem_get(self.pc)?;
        let low = *self.mem_get(self.pc.wrapping_add(1))?;
        self.pc = self.pc.wrapping_add(2);

        Ok(Instruction::new(u16::from_be_bytes([high, low])))
    }

    /// Helper to get a mutable reference to a memory location with bounds checking.
    pub(crate) fn mem_get(&mut self, addr: u16) -> Result<&mut u8, Chip8Error> {
        self.memory
            .get_mut(addr as usize)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_machine_has_font_and_entry_point() {
        let chip8 = Chip8::new();

        assert_eq!(&chip8.memory()[..80], &FONT[..]);
        assert_eq!(chip8.pc(), 0x200);
        assert_eq!(chip8.run_state(), RunState::Running);
        assert!(chip8.display().iter().flatten().all(|&p| !p));
        assert!(chip8.stack().is_empty());
    }

    #[test]
    fn load_copies_rom_at_entry_point() {
        let mut chip8 = Chip8::new();
        chip8.load(&[0x12, 0x34, 0x56]).unwrap();

        assert_eq!(&chip8.memory()[0x200..0x203], &[0x12, 0x34, 0x56]);
        assert_eq!(chip8.pc(), 0x200);
    }

    #[test]
    fn load_accepts_rom_filling_memory() {
        let mut chip8 = Chip8::new();
        let rom = vec![0xAB; MAX_ROM_SIZE];

        chip8.load(&rom).unwrap();
        assert_eq!(chip8.memory()[MEMORY_SIZE - 1], 0xAB);
    }

    #[test]
    fn load_rejects_oversized_rom() {
        let mut chip8 = Chip8::new();
        let rom = vec![0; MAX_ROM_SIZE + 1];

        let err = chip8.load(&rom).unwrap_err();
        assert!(matches!(
            err,
            Chip8Error::RomLoadError {
                size: 3585,
                max_size: 3584
            }
        ));
        assert_eq!(chip8.memory()[0x200], 0);
    }

    #[test]
    fn fetch_advances_pc_by_two() {
        let mut chip8 = Chip8::new();
        chip8.load(&[0x60, 0x2A]).unwrap();

        chip8.cpu_cycle().unwrap();
        assert_eq!(chip8.pc(), 0x202);
        assert_eq!(chip8.v()[0], 0x2A);
    }

    #[test]
    fn fetch_past_end_of_memory_fails() {
        let mut chip8 = Chip8::new();
        chip8.pc = 0xFFF;

        assert!(matches!(
            chip8.cpu_cycle(),
            Err(Chip8Error::MemoryOutOfBounds { address: 0x1000 })
        ));
    }

    #[test]
    fn timers_count_down_to_zero_and_stay_there() {
        let mut chip8 = Chip8::new();
        chip8.delay_timer = 5;

        for _ in 0..5 {
            chip8.timers_cycle();
        }
        assert_eq!(chip8.delay_timer(), 0);

        chip8.timers_cycle();
        assert_eq!(chip8.delay_timer(), 0);
    }

    #[test]
    fn tone_follows_sound_timer() {
        let mut chip8 = Chip8::new();
        chip8.sound_timer = 2;

        assert!(chip8.timers_cycle());
        assert!(chip8.timers_cycle());
        assert!(!chip8.timers_cycle());
        assert_eq!(chip8.sound_timer(), 0);
    }

    #[test]
    fn keypad_can_be_replaced_wholesale() {
        let mut chip8 = Chip8::new();
        chip8.set_key(u4::new(0x3), true);

        let mut keys = [false; 16];
        keys[0xA] = true;
        chip8.set_keypad(keys);

        assert!(!chip8.keypad()[0x3]);
        assert!(chip8.keypad()[0xA]);
    }

    #[test]
    fn quit_is_terminal() {
        let mut chip8 = Chip8::new();

        chip8.toggle_pause();
        assert_eq!(chip8.run_state(), RunState::Paused);
        chip8.toggle_pause();
        assert_eq!(chip8.run_state(), RunState::Running);

        chip8.set_run_state(RunState::Quit);
        chip8.toggle_pause();
        chip8.set_run_state(RunState::Running);
        assert_eq!(chip8.run_state(), RunState::Quit);
    }
}
