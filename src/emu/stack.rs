use super::Chip8Error;

/// Maximum number of nested subroutine calls.
pub const STACK_CAPACITY: usize = 12;

/// Fixed-capacity LIFO of subroutine return addresses.
#[derive(Clone, Debug, Default)]
pub struct CallStack {
    frames: [u16; STACK_CAPACITY],
    len: usize,
}

impl CallStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a return address. `target` is only used to describe an overflow.
    pub fn push(&mut self, return_address: u16, target: u16) -> Result<(), Chip8Error> {
        let slot = self
            .frames
            .get_mut(self.len)
            .ok_or(Chip8Error::StackOverflow { address: target })?;
        *slot = return_address;
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, Chip8Error> {
        self.len = self.len.checked_sub(1).ok_or(Chip8Error::StackUnderflow)?;
        Ok(self.frames[self.len])
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Live return addresses, oldest first.
    pub fn as_slice(&self) -> &[u16] {
        &self.frames[..self.len]
    }
}
