use std::fmt;

use crate::locator::Locator;

/// A contiguous byte range inside one block.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Segment {
    /// The block holding the bytes.
    pub locator: Locator,
    /// Offset of the first byte within the block.
    pub offset: u64,
    /// Number of bytes.
    pub len: u64,
}

impl Segment {
    pub fn new(locator: Locator, offset: u64, len: u64) -> Self {
        Self {
            locator,
            offset,
            len,
        }
    }

    /// Offset one past the last byte within the block.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Segment({} [{}..{}))", self.locator, self.offset, self.end())
    }
}
