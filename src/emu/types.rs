/// Result of executing a single CHIP-8 instruction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Chip8Result {
    /// The instruction did not touch the display.
    Continue,
    /// The display buffer was modified (clear or draw) and should be presented.
    DisplayUpdated,
}

/// Error types that can occur during CHIP-8 emulation
#[derive(Debug, thiserror::Error)]
pub enum Chip8Error {
    #[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
    RomLoadError { size: usize, max_size: usize },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: u16 },

    #[error("Stack overflow: call to {address:#05X} exceeds the maximum nesting depth")]
    StackOverflow { address: u16 },

    #[error("Stack underflow: attempted to return from a subroutine with empty call stack")]
    StackUnderflow,
}

/// Whether the host loop should execute instructions, idle, or stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Running,
    Paused,
    /// Terminal: once set, the machine never runs again.
    Quit,
}

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;
/// A type alias for the CHIP-8 display buffer representation
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];
