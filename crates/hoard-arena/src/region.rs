use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::error::{ArenaError, ArenaResult};
use crate::range::MemoryRange;

/// A fixed-size memory-mapped region holding object payloads.
///
/// The region is either anonymous shared memory or a file-backed segment
/// (typically under `/dev/shm`). A file-backed segment is created on open and
/// removed again when the region is dropped.
///
/// Access goes through raw pointers so disjoint spans can be written and read
/// from many threads at once. The region only checks bounds; callers are
/// responsible for never writing a span while anyone else reads or writes it.
pub struct SharedRegion {
    map: MmapMut,
    base: *mut u8,
    len: usize,
    path: Option<PathBuf>,
}

// SAFETY: the mapping is plain memory owned by `map` for the lifetime of the
// region; `base` is only dereferenced through the bounds-checked accessors
// below, whose callers guarantee span-level exclusivity.
unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
    /// Map `len` bytes of anonymous shared memory.
    pub fn anonymous(len: usize) -> ArenaResult<Self> {
        if len == 0 {
            return Err(ArenaError::InvalidCapacity(len));
        }
        let mut map = MmapOptions::new().len(len).map_anon()?;
        let base = map.as_mut_ptr();
        debug!(len, "mapped anonymous region");
        Ok(Self {
            map,
            base,
            len,
            path: None,
        })
    }

    /// Create the segment file at `path`, size it to `len` bytes, and map it.
    ///
    /// The file must not exist yet: an existing segment belongs to another
    /// region (or is stale) and is never truncated or adopted. Fails with
    /// [`ArenaError::SegmentExists`] in that case.
    pub fn create_file(path: &Path, len: usize) -> ArenaResult<Self> {
        if len == 0 {
            return Err(ArenaError::InvalidCapacity(len));
        }
        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(ArenaError::SegmentExists(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        // From here on the file is ours; remove it again if sizing or
        // mapping fails.
        let mapped = file.set_len(len as u64).and_then(|()| {
            // SAFETY: the file was created exclusively by this call and is
            // only unlinked, never truncated, while mapped.
            unsafe { MmapOptions::new().len(len).map_mut(&file) }
        });
        let mut map = match mapped {
            Ok(map) => map,
            Err(e) => {
                if let Err(rm) = fs::remove_file(path) {
                    warn!(path = %path.display(), error = %rm, "failed to remove segment file");
                }
                return Err(e.into());
            }
        };
        let base = map.as_mut_ptr();
        debug!(len, path = %path.display(), "mapped file-backed segment");
        Ok(Self {
            map,
            base,
            len,
            path: Some(path.to_path_buf()),
        })
    }

    /// Size of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: zero-sized regions are rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the backing segment file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Returns `true` if the region is still reachable by other processes:
    /// anonymous regions always are, file-backed ones while the segment file
    /// exists.
    pub fn is_reachable(&self) -> bool {
        self.path.as_deref().map_or(true, Path::exists)
    }

    fn check(&self, range: MemoryRange) -> ArenaResult<()> {
        match range.offset.checked_add(range.len) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(ArenaError::InvalidRange {
                offset: range.offset,
                len: range.len,
            }),
        }
    }

    /// Borrow the bytes of `range`.
    ///
    /// # Safety
    ///
    /// No thread may write to `range` for as long as the returned slice is
    /// alive.
    pub unsafe fn read(&self, range: MemoryRange) -> ArenaResult<&[u8]> {
        self.check(range)?;
        Ok(std::slice::from_raw_parts(self.base.add(range.offset), range.len))
    }

    /// Copy `data` into the region at `offset`.
    ///
    /// # Safety
    ///
    /// No other thread may read or write the destination span while the copy
    /// runs.
    pub unsafe fn write(&self, offset: usize, data: &[u8]) -> ArenaResult<()> {
        self.check(MemoryRange::new(offset, data.len()))?;
        std::ptr::copy_nonoverlapping(data.as_ptr(), self.base.add(offset), data.len());
        Ok(())
    }

    /// Zero every byte of `range`.
    ///
    /// # Safety
    ///
    /// Same contract as [`SharedRegion::write`].
    pub unsafe fn zero(&self, range: MemoryRange) -> ArenaResult<()> {
        self.check(range)?;
        std::ptr::write_bytes(self.base.add(range.offset), 0, range.len);
        Ok(())
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Some(path) = &self.path {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove segment file");
            }
        }
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("len", &self.len)
            .field("path", &self.path)
            .field("mapped", &self.map.len())
            .finish()
    }
}
