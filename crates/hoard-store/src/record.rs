use std::fmt;

use hoard_arena::MemoryRange;
use hoard_types::ObjectId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a stored object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectState {
    /// Allocated and being written; invisible to readers.
    Created,
    /// Immutable and readable by any session.
    Sealed,
    /// Hidden from readers; memory held until the last reference is released.
    Deleted,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Sealed => write!(f, "sealed"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// Directory entry for one generation of an object.
///
/// `serial` is unique across the store's lifetime. It tells generations of
/// the same id apart when a new object is created under an id whose previous
/// generation is still draining readers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub serial: u64,
    pub state: ObjectState,
    pub range: MemoryRange,
    pub ref_count: u32,
    /// Bytes of the range already reserved by writes.
    pub write_cursor: usize,
    /// Writes reserved but not yet copied into the arena.
    pub inflight_writes: u32,
    /// The creating session disconnected while the object was still in use.
    pub orphaned: bool,
}

impl ObjectRecord {
    /// A fresh record in the Created state.
    pub fn new(id: ObjectId, serial: u64, range: MemoryRange) -> Self {
        Self {
            id,
            serial,
            state: ObjectState::Created,
            range,
            ref_count: 0,
            write_cursor: 0,
            inflight_writes: 0,
            orphaned: false,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.range.len
    }

    /// Created or Sealed.
    pub fn is_live(&self) -> bool {
        matches!(self.state, ObjectState::Created | ObjectState::Sealed)
    }

    pub fn info(&self) -> ObjectInfo {
        ObjectInfo {
            id: self.id,
            state: self.state,
            size: self.size(),
            ref_count: self.ref_count,
            orphaned: self.orphaned,
        }
    }
}

/// Public snapshot of a record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub id: ObjectId,
    pub state: ObjectState,
    pub size: usize,
    pub ref_count: u32,
    pub orphaned: bool,
}
