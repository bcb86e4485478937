use std::fmt;

use serde::{Deserialize, Serialize};

/// A contiguous byte span inside the arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemoryRange {
    pub offset: usize,
    pub len: usize,
}

impl MemoryRange {
    pub const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// The zero-length range. It overlaps nothing and is never tracked.
    pub const fn empty() -> Self {
        Self { offset: 0, len: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the span.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }

    /// Returns `true` if the two spans share at least one byte.
    pub fn overlaps(&self, other: &MemoryRange) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.offset < other.end()
            && other.offset < self.end()
    }

    /// Sub-span starting `start` bytes in, `len` bytes long.
    ///
    /// Returns `None` if the sub-span would leave this range.
    pub fn slice(&self, start: usize, len: usize) -> Option<MemoryRange> {
        let end = start.checked_add(len)?;
        (end <= self.len).then(|| MemoryRange::new(self.offset + start, len))
    }
}

impl fmt::Debug for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{})", self.offset, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlap_detection() {
        let a = MemoryRange::new(0, 10);
        assert!(a.overlaps(&MemoryRange::new(9, 5)));
        assert!(!a.overlaps(&MemoryRange::new(10, 5)));
        assert!(!a.overlaps(&MemoryRange::new(5, 0)));
    }

    #[test]
    fn slice_stays_in_bounds() {
        let r = MemoryRange::new(100, 10);
        assert_eq!(r.slice(2, 3), Some(MemoryRange::new(102, 3)));
        assert_eq!(r.slice(10, 0), Some(MemoryRange::new(110, 0)));
        assert_eq!(r.slice(8, 3), None);
        assert_eq!(r.slice(usize::MAX, 2), None);
    }

    #[test]
    fn debug_format() {
        assert_eq!(format!("{:?}", MemoryRange::new(4, 4)), "[4..8)");
    }
}
