//! Foundation types for Hoard, a shared-memory object store.
//!
//! Every other Hoard crate depends on `hoard-types`.
//!
//! # Key Types
//!
//! - [`ObjectId`]: 16-byte object address (12-byte key hash + 4 reserved bytes)
//! - [`KeyMapper`]: deterministic mapping from application keys to [`ObjectId`]s
//! - [`HashKeyMapper`]: default BLAKE3-backed mapper with domain separation
//! - [`SessionId`]: UUID v7 identity of a client session

pub mod error;
pub mod mapper;
pub mod object;
pub mod session;

pub use error::TypeError;
pub use mapper::{HashKeyMapper, KeyMapper};
pub use object::ObjectId;
pub use session::SessionId;
