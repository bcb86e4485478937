use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::SessionResult;

/// Outcome of a put.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PutStatus {
    /// The value was stored and sealed.
    Stored,
    /// An object already exists for the key; its payload is untouched.
    Conflict,
}

/// Outcome of a delete.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteStatus {
    /// The object is gone and its memory reclaimed.
    Deleted,
    /// The object is hidden but readers still hold it.
    PendingRelease,
    /// The caller does not own the key.
    Rejected,
}

/// Key-value access to an object store.
pub trait KeyValueStore {
    fn put(&mut self, key: &str, value: &[u8]) -> SessionResult<PutStatus>;

    fn get(&mut self, key: &str) -> SessionResult<Bytes>;

    fn delete(&mut self, key: &str) -> SessionResult<DeleteStatus>;
}
