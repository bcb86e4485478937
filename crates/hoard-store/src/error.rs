use std::path::PathBuf;

use hoard_arena::ArenaError;
use hoard_types::ObjectId;

use crate::record::ObjectState;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A live (Created or Sealed) object already exists for this id.
    #[error("duplicate object: {0}")]
    DuplicateObject(ObjectId),

    /// No visible object exists for this id.
    #[error("object not found: {0}")]
    NotFound(ObjectId),

    /// The operation is not legal in the object's current state.
    #[error("cannot {operation} object {id} in state {state}")]
    InvalidState {
        id: ObjectId,
        state: ObjectState,
        operation: &'static str,
    },

    /// A write would run past the end of the object's allocation.
    #[error("buffer overrun on {id}: {attempted} bytes exceed capacity {capacity}")]
    BufferOverrun {
        id: ObjectId,
        capacity: usize,
        attempted: usize,
    },

    /// The arena has no contiguous span large enough.
    #[error("out of space: requested {requested} bytes, largest free span is {largest_free}")]
    OutOfSpace { requested: usize, largest_free: usize },

    /// A record cannot be removed while it is live or referenced.
    #[error("record {id} is busy ({ref_count} references)")]
    RecordBusy { id: ObjectId, ref_count: u32 },

    /// A blocking get gave up before the object was sealed.
    #[error("timed out after {waited_ms}ms waiting for {id}")]
    Timeout { id: ObjectId, waited_ms: u64 },

    /// The store is shut down or cannot be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Another running store is already bound to the endpoint.
    #[error("endpoint already in use: {0}")]
    EndpointInUse(PathBuf),

    /// The file-backed segment path is taken by another store or a stale
    /// file.
    #[error("segment already in use: {}", .0.display())]
    SegmentInUse(PathBuf),

    /// Allocator fault other than exhaustion.
    #[error("arena error: {0}")]
    Arena(ArenaError),

    /// Invalid store configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error from the segment backing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Returns `true` only for failures that may clear up on retry.
    ///
    /// Everything except [`StoreError::Unavailable`] is determined by the
    /// current store state and fails the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<ArenaError> for StoreError {
    fn from(err: ArenaError) -> Self {
        match err {
            ArenaError::OutOfSpace {
                requested,
                largest_free,
            } => Self::OutOfSpace {
                requested,
                largest_free,
            },
            ArenaError::SegmentExists(path) => Self::SegmentInUse(path),
            ArenaError::Io(e) => Self::Io(e),
            other => Self::Arena(other),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
