//! Operation tags for correlated motor commands.

/// Wrapping 8-bit counter. Tags are handed out in sequence without
/// checking whether an older operation still holds the same value.
#[derive(Debug, Default)]
pub struct TagAllocator {
    current: u8,
}

impl TagAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance and return the new tag. The first call yields 1.
    pub fn next(&mut self) -> u8 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    pub fn current(&self) -> u8 {
        self.current
    }
}
