//! Shared-memory arena for Hoard.
//!
//! The arena is a single pre-allocated, memory-mapped region carved into
//! contiguous spans, one per object payload.
//!
//! - [`SharedRegion`] owns the mapping (anonymous or file-backed) and gives
//!   bounds-checked raw access to it.
//! - [`ArenaAllocator`] tracks which spans are free and which are handed out.
//!   It never touches the mapped bytes itself.
//!
//! # Invariants
//!
//! 1. The sum of allocated span lengths never exceeds the capacity.
//! 2. No two allocated spans overlap.
//! 3. Free spans are fully coalesced: no two free spans are adjacent.
//! 4. Every mutation of the span index happens under one mutex.

pub mod allocator;
pub mod error;
pub mod range;
pub mod region;

pub use allocator::ArenaAllocator;
pub use error::{ArenaError, ArenaResult};
pub use range::MemoryRange;
pub use region::SharedRegion;
