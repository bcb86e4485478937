//! Client sessions for Hoard.
//!
//! A [`Session`] connects to a running store by endpoint, maps string keys to
//! object ids, and exposes put/get/delete. Each thread uses its own session;
//! all sessions on an endpoint share one store.
//!
//! A session owns the objects it created. Only the owner may delete them.
//! Values outlive the session that put them; when it closes, only objects
//! still being read are settled by the store's orphan policy.

pub mod config;
pub mod error;
pub mod kv;
pub mod session;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use kv::{DeleteStatus, KeyValueStore, PutStatus};
pub use session::Session;

// Re-export key types
pub use hoard_store::{ObjectView, StoreConfig, StoreServer};
pub use hoard_types::{HashKeyMapper, KeyMapper, ObjectId};
