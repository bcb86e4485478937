//! Object lifecycle core for Hoard.
//!
//! An [`ObjectStore`] owns one shared-memory arena and a directory of object
//! records. Objects move through a fixed state machine:
//!
//! ```text
//! create ──► Created ──seal──► Sealed ──delete──► Deleted ──last release──► reclaimed
//!               │                                    ▲
//!               └──────────────abort─────────────────┘ (reclaimed at once)
//! ```
//!
//! # Design Rules
//!
//! 1. A payload is written only while its object is Created, and only through
//!    disjoint spans reserved under the state lock.
//! 2. Sealed payloads are immutable and readable through [`ObjectView`]s, each
//!    holding one reference.
//! 3. Deleting a referenced object hides it immediately; its memory returns to
//!    the arena when the last view is released, exactly once.
//! 4. Payload copies, tail zeroing at seal, and blocking waits never hold a
//!    lock.
//! 5. Readers of an unsealed id wait on a per-identifier condition variable.
//!
//! Running stores are published under an endpoint name through
//! [`StoreServer`] and looked up with [`EndpointRegistry`].

pub mod config;
pub mod directory;
pub mod endpoint;
pub mod error;
pub mod record;
pub mod store;
pub mod view;

pub use config::{OrphanPolicy, SegmentConfig, StoreConfig};
pub use directory::ObjectDirectory;
pub use endpoint::{EndpointRegistry, StoreServer};
pub use error::{StoreError, StoreResult};
pub use record::{ObjectInfo, ObjectRecord, ObjectState};
pub use store::{CloseReport, DeleteOutcome, ObjectStore, StoreStats, SweepReport};
pub use view::ObjectView;
