use std::collections::BTreeMap;
use std::sync::Mutex;

use tracing::trace;

use crate::error::{ArenaError, ArenaResult};
use crate::range::MemoryRange;

/// Span bookkeeping, keyed by offset.
#[derive(Debug)]
struct SpanIndex {
    free: BTreeMap<usize, usize>,
    allocated: BTreeMap<usize, usize>,
    allocated_bytes: usize,
}

impl SpanIndex {
    fn new(capacity: usize) -> Self {
        let mut free = BTreeMap::new();
        if capacity > 0 {
            free.insert(0, capacity);
        }
        Self {
            free,
            allocated: BTreeMap::new(),
            allocated_bytes: 0,
        }
    }

    fn largest_free(&self) -> usize {
        self.free.values().copied().max().unwrap_or(0)
    }

    /// Smallest free span that fits `size`; lowest offset wins ties.
    fn best_fit(&self, size: usize) -> Option<(usize, usize)> {
        let mut best: Option<(usize, usize)> = None;
        for (&offset, &len) in &self.free {
            if len < size {
                continue;
            }
            if len == size {
                return Some((offset, len));
            }
            if best.map_or(true, |(_, best_len)| len < best_len) {
                best = Some((offset, len));
            }
        }
        best
    }
}

/// Best-fit free-list allocator over a fixed-capacity arena.
///
/// The allocator only hands out offsets; it never touches the mapped memory.
/// Every mutation happens under a single mutex, and freed spans are merged
/// with their free neighbours so the index stays fully coalesced.
///
/// Zero-length requests succeed with [`MemoryRange::empty`] and are never
/// tracked.
pub struct ArenaAllocator {
    capacity: usize,
    index: Mutex<SpanIndex>,
}

impl ArenaAllocator {
    /// Create an allocator managing `capacity` bytes, all initially free.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            index: Mutex::new(SpanIndex::new(capacity)),
        }
    }

    /// Total bytes managed by the allocator.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Reserve a contiguous span of `size` bytes.
    pub fn allocate(&self, size: usize) -> ArenaResult<MemoryRange> {
        if size == 0 {
            return Ok(MemoryRange::empty());
        }
        let mut index = self.index.lock().expect("arena lock poisoned");
        let Some((offset, len)) = index.best_fit(size) else {
            return Err(ArenaError::OutOfSpace {
                requested: size,
                largest_free: index.largest_free(),
            });
        };
        index.free.remove(&offset);
        if len > size {
            index.free.insert(offset + size, len - size);
        }
        index.allocated.insert(offset, size);
        index.allocated_bytes += size;
        trace!(offset, size, "span allocated");
        Ok(MemoryRange::new(offset, size))
    }

    /// Return a previously allocated span to the free pool.
    ///
    /// The range must match an allocated span exactly; anything else is
    /// rejected with [`ArenaError::InvalidRange`] and leaves the index
    /// untouched.
    pub fn free(&self, range: MemoryRange) -> ArenaResult<()> {
        if range.is_empty() {
            return Ok(());
        }
        let mut index = self.index.lock().expect("arena lock poisoned");
        if index.allocated.get(&range.offset) != Some(&range.len) {
            return Err(ArenaError::InvalidRange {
                offset: range.offset,
                len: range.len,
            });
        }
        index.allocated.remove(&range.offset);
        index.allocated_bytes -= range.len;

        let mut start = range.offset;
        let mut len = range.len;

        let prev = index
            .free
            .range(..start)
            .next_back()
            .map(|(&off, &l)| (off, l));
        if let Some((prev_off, prev_len)) = prev {
            if prev_off + prev_len == start {
                index.free.remove(&prev_off);
                start = prev_off;
                len += prev_len;
            }
        }
        if let Some(next_len) = index.free.remove(&(start + len)) {
            len += next_len;
        }
        index.free.insert(start, len);
        trace!(offset = range.offset, size = range.len, "span freed");
        Ok(())
    }

    /// Bytes currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.index.lock().expect("arena lock poisoned").allocated_bytes
    }

    /// Bytes currently free (not necessarily contiguous).
    pub fn free_bytes(&self) -> usize {
        self.capacity - self.allocated_bytes()
    }

    /// Length of the largest contiguous free span.
    pub fn largest_free_span(&self) -> usize {
        self.index.lock().expect("arena lock poisoned").largest_free()
    }

    /// Number of distinct free spans (a fragmentation indicator).
    pub fn free_span_count(&self) -> usize {
        self.index.lock().expect("arena lock poisoned").free.len()
    }

    /// Snapshot of all allocated spans, sorted by offset.
    pub fn allocated_spans(&self) -> Vec<MemoryRange> {
        let index = self.index.lock().expect("arena lock poisoned");
        index
            .allocated
            .iter()
            .map(|(&offset, &len)| MemoryRange::new(offset, len))
            .collect()
    }

    /// Check the span index invariants: spans in bounds, no overlap, free
    /// spans coalesced, and free plus allocated bytes equal to capacity.
    pub fn verify(&self) -> ArenaResult<()> {
        let index = self.index.lock().expect("arena lock poisoned");

        let mut spans: Vec<(usize, usize, bool)> = index
            .free
            .iter()
            .map(|(&o, &l)| (o, l, true))
            .chain(index.allocated.iter().map(|(&o, &l)| (o, l, false)))
            .collect();
        spans.sort_unstable();

        let mut cursor = 0usize;
        let mut prev_free = false;
        for (offset, len, is_free) in spans {
            if len == 0 {
                return Err(ArenaError::Corrupted(format!("empty span at {offset}")));
            }
            if offset != cursor {
                return Err(ArenaError::Corrupted(format!(
                    "span at {offset} does not start at {cursor}"
                )));
            }
            if is_free && prev_free {
                return Err(ArenaError::Corrupted(format!(
                    "adjacent free spans at {offset}"
                )));
            }
            prev_free = is_free;
            cursor = offset + len;
        }
        if cursor != self.capacity {
            return Err(ArenaError::Corrupted(format!(
                "spans cover {cursor} of {} bytes",
                self.capacity
            )));
        }

        let allocated: usize = index.allocated.values().sum();
        if allocated != index.allocated_bytes {
            return Err(ArenaError::Corrupted(format!(
                "allocated counter {} disagrees with spans {allocated}",
                index.allocated_bytes
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ArenaAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaAllocator")
            .field("capacity", &self.capacity)
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}
