use std::path::PathBuf;

/// Errors from arena operations.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// No contiguous free span is large enough.
    #[error("out of space: requested {requested} bytes, largest free span is {largest_free}")]
    OutOfSpace { requested: usize, largest_free: usize },

    /// The range is not an allocated span or lies outside the region.
    #[error("invalid range: offset {offset}, length {len}")]
    InvalidRange { offset: usize, len: usize },

    /// Arena capacity must be non-zero.
    #[error("invalid arena capacity: {0}")]
    InvalidCapacity(usize),

    /// The span index failed a consistency check.
    #[error("arena corrupted: {0}")]
    Corrupted(String),

    /// A segment file already exists at the path, owned by another store or
    /// left behind by one that did not shut down.
    #[error("segment already exists: {}", .0.display())]
    SegmentExists(PathBuf),

    /// I/O error while creating or mapping a segment.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for arena operations.
pub type ArenaResult<T> = Result<T, ArenaError>;
