use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use hoard_arena::{ArenaAllocator, ArenaError, MemoryRange, SharedRegion};
use hoard_types::{ObjectId, SessionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{OrphanPolicy, SegmentConfig, StoreConfig};
use crate::directory::ObjectDirectory;
use crate::error::{StoreError, StoreResult};
use crate::record::{ObjectInfo, ObjectRecord, ObjectState};
use crate::view::ObjectView;

/// Result of a successful [`ObjectStore::delete`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteOutcome {
    /// The object is gone and its memory is back in the arena.
    Reclaimed,
    /// The object is hidden but readers still hold it; memory is returned by
    /// the last release.
    PendingRelease,
}

/// What closing a session did to the objects it created.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReport {
    /// Unsealed objects discarded.
    pub aborted: usize,
    /// Sealed objects nobody was reading; they stay stored and readable.
    pub kept: usize,
    /// Objects still referenced (or mid-write) at close, flagged as orphaned.
    pub orphaned: usize,
    /// Orphans deleted at close and left to drain their readers.
    pub pending: usize,
}

/// What an orphan sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub aborted: usize,
    pub reclaimed: usize,
    pub pending: usize,
}

/// Point-in-time counters for a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub capacity: usize,
    pub allocated_bytes: usize,
    pub free_bytes: usize,
    pub largest_free_span: usize,
    pub free_spans: usize,
    pub created: usize,
    pub sealed: usize,
    pub draining: usize,
    pub orphaned: usize,
    pub sessions: usize,
    pub waiters: usize,
}

/// Condition variable shared by every caller waiting on one id.
struct WaitSlot {
    cond: Arc<Condvar>,
    waiting: usize,
}

/// Everything guarded by the store's state mutex.
struct StoreState {
    directory: ObjectDirectory,
    waiters: HashMap<ObjectId, WaitSlot>,
    sessions: HashSet<SessionId>,
    next_serial: u64,
}

impl StoreState {
    fn register_waiter(&mut self, id: ObjectId) -> Arc<Condvar> {
        let slot = self.waiters.entry(id).or_insert_with(|| WaitSlot {
            cond: Arc::new(Condvar::new()),
            waiting: 0,
        });
        slot.waiting += 1;
        Arc::clone(&slot.cond)
    }

    fn unregister_waiter(&mut self, id: &ObjectId) {
        if let Some(slot) = self.waiters.get_mut(id) {
            slot.waiting -= 1;
            if slot.waiting == 0 {
                self.waiters.remove(id);
            }
        }
    }

    fn notify(&self, id: &ObjectId) {
        if let Some(slot) = self.waiters.get(id) {
            slot.cond.notify_all();
        }
    }

    fn waiter_count(&self) -> usize {
        self.waiters.values().map(|slot| slot.waiting).sum()
    }
}

/// The object lifecycle manager.
///
/// Owns the arena mapping, the span allocator and the object directory, and
/// enforces the create → seal → get/release → delete state machine with
/// reference counting. Shared between sessions as `Arc<ObjectStore>`.
///
/// Locking: one mutex guards the directory, waiter table and session set;
/// the allocator has its own. The state lock is always taken first. Payload
/// copies happen outside both.
pub struct ObjectStore {
    config: StoreConfig,
    region: SharedRegion,
    arena: ArenaAllocator,
    state: Mutex<StoreState>,
    running: AtomicBool,
}

impl ObjectStore {
    /// Map the arena described by `config` and start accepting requests.
    pub fn open(config: StoreConfig) -> StoreResult<Arc<Self>> {
        config.validate()?;
        let region = match &config.segment {
            SegmentConfig::Anonymous => SharedRegion::anonymous(config.capacity)?,
            SegmentConfig::File { path } => SharedRegion::create_file(path, config.capacity)?,
        };
        let arena = ArenaAllocator::new(config.capacity);

        info!(
            endpoint = %config.endpoint.display(),
            capacity = config.capacity,
            orphan_policy = ?config.orphan_policy,
            "object store opened"
        );

        Ok(Arc::new(Self {
            config,
            region,
            arena,
            state: Mutex::new(StoreState {
                directory: ObjectDirectory::new(),
                waiters: HashMap::new(),
                sessions: HashSet::new(),
                next_serial: 1,
            }),
            running: AtomicBool::new(true),
        }))
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.arena.capacity()
    }

    pub(crate) fn region(&self) -> &SharedRegion {
        &self.region
    }

    /// Path of the file-backed segment, if the store uses one.
    pub fn segment_path(&self) -> Option<&Path> {
        self.region.path()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Running and its segment still present.
    pub fn is_reachable(&self) -> bool {
        self.is_running() && self.region.is_reachable()
    }

    fn ensure_running(&self) -> StoreResult<()> {
        if self.is_running() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is shut down".into()))
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().expect("store lock poisoned")
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Allocate `size` bytes for a new object in the Created state.
    pub fn create(&self, id: &ObjectId, size: usize) -> StoreResult<()> {
        self.ensure_running()?;
        let mut state = self.lock_state();
        if state.directory.contains(id) {
            return Err(StoreError::DuplicateObject(*id));
        }
        let range = self.arena.allocate(size)?;
        let serial = state.next_serial;
        state.next_serial += 1;
        state.directory.insert(ObjectRecord::new(*id, serial, range))?;
        debug!(%id, size, offset = range.offset, "object created");
        Ok(())
    }

    /// Append `data` to a Created object's payload.
    ///
    /// The target span is reserved under the lock and copied after it is
    /// dropped, so concurrent writers to the same object land in disjoint
    /// spans.
    pub fn write(&self, id: &ObjectId, data: &[u8]) -> StoreResult<()> {
        self.ensure_running()?;
        let (serial, target) = {
            let mut state = self.lock_state();
            let rec = state.directory.lookup_mut(id)?;
            if rec.state != ObjectState::Created {
                return Err(StoreError::InvalidState {
                    id: *id,
                    state: rec.state,
                    operation: "write",
                });
            }
            if data.is_empty() {
                return Ok(());
            }
            let Some(target) = rec.range.slice(rec.write_cursor, data.len()) else {
                return Err(StoreError::BufferOverrun {
                    id: *id,
                    capacity: rec.size(),
                    attempted: rec.write_cursor.saturating_add(data.len()),
                });
            };
            rec.write_cursor += data.len();
            rec.inflight_writes += 1;
            (rec.serial, target)
        };

        // SAFETY: `target` was reserved for this call alone. The record cannot
        // be sealed, aborted or read while `inflight_writes` is non-zero.
        let copied = unsafe { self.region.write(target.offset, data) };

        let mut state = self.lock_state();
        if let Ok(rec) = state.directory.record_mut(id, serial) {
            rec.inflight_writes -= 1;
        }
        copied.map_err(StoreError::from)
    }

    /// Make a Created object immutable and visible to readers.
    ///
    /// Bytes never written are zeroed so readers cannot observe a previous
    /// occupant of the span. The tail is reserved like a write and zeroed
    /// after the lock is dropped.
    pub fn seal(&self, id: &ObjectId) -> StoreResult<()> {
        self.ensure_running()?;
        let (serial, tail) = {
            let mut state = self.lock_state();
            let rec = state.directory.lookup_mut(id)?;
            if rec.state != ObjectState::Created || rec.inflight_writes > 0 {
                return Err(StoreError::InvalidState {
                    id: *id,
                    state: rec.state,
                    operation: "seal",
                });
            }
            let serial = rec.serial;
            let Some(tail) = rec
                .range
                .slice(rec.write_cursor, rec.size() - rec.write_cursor)
                .filter(|tail| !tail.is_empty())
            else {
                return self.publish_locked(&mut state, id, serial);
            };
            rec.write_cursor = rec.size();
            rec.inflight_writes += 1;
            (serial, tail)
        };

        // SAFETY: the tail was reserved for this call alone; writers see the
        // cursor at the end and readers wait until the flip to Sealed.
        let zeroed = unsafe { self.region.zero(tail) };

        let mut state = self.lock_state();
        let rec = state.directory.record_mut(id, serial)?;
        rec.inflight_writes -= 1;
        zeroed?;
        self.publish_locked(&mut state, id, serial)
    }

    /// Flip a Created generation with no writes in flight to Sealed.
    fn publish_locked(&self, state: &mut StoreState, id: &ObjectId, serial: u64) -> StoreResult<()> {
        let rec = state.directory.record_mut(id, serial)?;
        if rec.state != ObjectState::Created || rec.inflight_writes > 0 {
            return Err(StoreError::InvalidState {
                id: *id,
                state: rec.state,
                operation: "seal",
            });
        }
        rec.state = ObjectState::Sealed;
        let size = rec.size();
        state.notify(id);
        debug!(%id, size, "object sealed");
        Ok(())
    }

    /// Acquire a read view of a sealed object.
    ///
    /// If the object is absent or still Created, waits for it to be sealed
    /// for at most `timeout`. At expiry the call fails with
    /// [`StoreError::Timeout`] if an unsealed object exists and
    /// [`StoreError::NotFound`] otherwise. A timed-out call leaves the
    /// reference count untouched.
    pub fn get(self: &Arc<Self>, id: &ObjectId, timeout: Duration) -> StoreResult<ObjectView> {
        let (state, outcome) = self.wait_until(id, timeout, |state| {
            let rec = state.directory.lookup_mut(id).ok()?;
            if rec.state != ObjectState::Sealed {
                return None;
            }
            rec.ref_count += 1;
            Some(Ok((rec.serial, rec.range, rec.ref_count)))
        });
        let (serial, range, ref_count) = match outcome {
            Some(acquired) => acquired?,
            None if state.directory.contains(id) => {
                return Err(StoreError::Timeout {
                    id: *id,
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            None => return Err(StoreError::NotFound(*id)),
        };
        drop(state);
        debug!(%id, ref_count, "object acquired");
        Ok(ObjectView::new(Arc::clone(self), *id, serial, range))
    }

    /// Give back the reference held by `view`.
    pub fn release(&self, view: ObjectView) -> StoreResult<()> {
        view.release()
    }

    /// Drop one reference from a specific generation of `id`.
    ///
    /// The release that brings a Deleted object to zero references reclaims
    /// it.
    pub(crate) fn release_ref(&self, id: &ObjectId, serial: u64) -> StoreResult<()> {
        let mut state = self.lock_state();
        let rec = state.directory.record_mut(id, serial)?;
        if rec.ref_count == 0 || rec.state == ObjectState::Created {
            return Err(StoreError::InvalidState {
                id: *id,
                state: rec.state,
                operation: "release",
            });
        }
        rec.ref_count -= 1;
        let ref_count = rec.ref_count;
        let drained = ref_count == 0 && rec.state == ObjectState::Deleted;
        debug!(%id, ref_count, "object released");
        if drained {
            self.reclaim_locked(&mut state, id, serial)?;
        }
        Ok(())
    }

    /// Delete a sealed object.
    ///
    /// The id disappears from `get` and `contains` at once. Memory is freed
    /// now if nobody holds a view, otherwise by the last release, and the
    /// call reports [`DeleteOutcome::PendingRelease`]. Repeating the call
    /// while readers drain reports `PendingRelease` again.
    pub fn delete(&self, id: &ObjectId) -> StoreResult<DeleteOutcome> {
        self.ensure_running()?;
        let mut state = self.lock_state();
        self.delete_locked(&mut state, id)
    }

    /// Discard an unsealed object and free its span.
    pub fn abort(&self, id: &ObjectId) -> StoreResult<()> {
        let mut state = self.lock_state();
        self.abort_locked(&mut state, id)
    }

    /// `true` if the id is Created or Sealed.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.lock_state().directory.contains(id)
    }

    /// Snapshot of the live record for `id`.
    pub fn info(&self, id: &ObjectId) -> StoreResult<ObjectInfo> {
        Ok(self.lock_state().directory.lookup(id)?.info())
    }

    /// Snapshots of every record, live and draining, sorted by id.
    pub fn list(&self) -> Vec<ObjectInfo> {
        let state = self.lock_state();
        let mut infos: Vec<ObjectInfo> = state.directory.records().map(ObjectRecord::info).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    /// Wait until no deleted generation of `id` is still draining readers.
    ///
    /// Returns `false` on timeout or shutdown.
    pub fn wait_reclaimed(&self, id: &ObjectId, timeout: Duration) -> bool {
        let (_state, outcome) = self.wait_until(id, timeout, |state| {
            (!state.directory.is_draining(id)).then_some(Ok(()))
        });
        matches!(outcome, Some(Ok(())))
    }

    fn delete_locked(&self, state: &mut StoreState, id: &ObjectId) -> StoreResult<DeleteOutcome> {
        let (obj_state, ref_count) = match state.directory.lookup(id) {
            Ok(rec) => (rec.state, rec.ref_count),
            Err(StoreError::NotFound(_)) if state.directory.is_draining(id) => {
                return Ok(DeleteOutcome::PendingRelease);
            }
            Err(e) => return Err(e),
        };
        if obj_state != ObjectState::Sealed {
            return Err(StoreError::InvalidState {
                id: *id,
                state: obj_state,
                operation: "delete",
            });
        }
        let serial = state.directory.retire(id)?;
        if ref_count == 0 {
            self.reclaim_locked(state, id, serial)?;
            debug!(%id, "object deleted");
            Ok(DeleteOutcome::Reclaimed)
        } else {
            state.notify(id);
            debug!(%id, ref_count, "object marked deleted, pending release");
            Ok(DeleteOutcome::PendingRelease)
        }
    }

    fn abort_locked(&self, state: &mut StoreState, id: &ObjectId) -> StoreResult<()> {
        let rec = state.directory.lookup(id)?;
        if rec.state != ObjectState::Created || rec.inflight_writes > 0 {
            return Err(StoreError::InvalidState {
                id: *id,
                state: rec.state,
                operation: "abort",
            });
        }
        let serial = state.directory.retire(id)?;
        self.reclaim_locked(state, id, serial)?;
        debug!(%id, "object aborted");
        Ok(())
    }

    fn reclaim_locked(&self, state: &mut StoreState, id: &ObjectId, serial: u64) -> StoreResult<()> {
        let record = state.directory.remove(id, serial)?;
        self.arena.free(record.range)?;
        state.notify(id);
        debug!(%id, serial, size = record.size(), "object reclaimed");
        Ok(())
    }

    /// Block on the per-id condition variable until `poll` yields a result,
    /// the store shuts down, or `timeout` passes (`None`).
    ///
    /// The state lock is held while `poll` runs and is handed back to the
    /// caller together with the outcome.
    fn wait_until<T>(
        &self,
        id: &ObjectId,
        timeout: Duration,
        mut poll: impl FnMut(&mut StoreState) -> Option<StoreResult<T>>,
    ) -> (MutexGuard<'_, StoreState>, Option<StoreResult<T>>) {
        let start = Instant::now();
        let mut state = self.lock_state();
        let mut waiter: Option<Arc<Condvar>> = None;
        let outcome = loop {
            if !self.is_running() {
                break Some(Err(StoreError::Unavailable("store is shut down".into())));
            }
            if let Some(done) = poll(&mut *state) {
                break Some(done);
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                break None;
            }
            let cond = Arc::clone(waiter.get_or_insert_with(|| state.register_waiter(*id)));
            state = cond
                .wait_timeout(state, timeout - elapsed)
                .expect("store lock poisoned")
                .0;
        };
        if waiter.is_some() {
            state.unregister_waiter(id);
        }
        (state, outcome)
    }

    // -----------------------------------------------------------------------
    // Sessions and orphans
    // -----------------------------------------------------------------------

    /// Register a new client session.
    pub fn open_session(&self) -> StoreResult<SessionId> {
        self.ensure_running()?;
        let session = SessionId::new();
        let mut state = self.lock_state();
        state.sessions.insert(session);
        info!(session = %session, sessions = state.sessions.len(), "session opened");
        Ok(session)
    }

    /// Tear down a session and settle the objects it created.
    ///
    /// Unsealed objects are aborted. Sealed objects with no outstanding
    /// references stay stored and readable by other sessions. Only objects
    /// still referenced (or with writes in flight) become orphans: under
    /// [`OrphanPolicy::Reclaim`] referenced sealed orphans are deleted now
    /// and reclaimed by their last release, otherwise they stay readable
    /// until [`ObjectStore::sweep_orphans`].
    pub fn close_session(
        &self,
        session: SessionId,
        owned: impl IntoIterator<Item = ObjectId>,
    ) -> CloseReport {
        let mut state = self.lock_state();
        state.sessions.remove(&session);
        let mut report = CloseReport::default();

        for id in owned {
            let (obj_state, ref_count, inflight) = match state.directory.lookup(&id) {
                Ok(rec) => (rec.state, rec.ref_count, rec.inflight_writes),
                Err(_) => continue,
            };
            match obj_state {
                ObjectState::Created if inflight == 0 => {
                    match self.abort_locked(&mut state, &id) {
                        Ok(()) => report.aborted += 1,
                        Err(e) => warn!(%id, error = %e, "failed to abort unsealed object"),
                    }
                    continue;
                }
                ObjectState::Sealed if ref_count == 0 => {
                    report.kept += 1;
                    continue;
                }
                _ => {}
            }
            if let Ok(rec) = state.directory.lookup_mut(&id) {
                rec.orphaned = true;
            }
            report.orphaned += 1;
            if obj_state == ObjectState::Sealed && self.config.orphan_policy == OrphanPolicy::Reclaim {
                match self.delete_locked(&mut state, &id) {
                    Ok(DeleteOutcome::PendingRelease) => report.pending += 1,
                    Ok(DeleteOutcome::Reclaimed) => {}
                    Err(e) => warn!(%id, error = %e, "failed to reclaim orphan"),
                }
            }
        }

        info!(
            session = %session,
            aborted = report.aborted,
            kept = report.kept,
            orphaned = report.orphaned,
            pending = report.pending,
            "session closed"
        );
        report
    }

    /// Delete every orphaned object: sealed orphans are deleted (reclaimed
    /// now or on last release), unsealed orphans with no writes in flight
    /// are aborted.
    pub fn sweep_orphans(&self) -> SweepReport {
        let mut state = self.lock_state();
        let orphans: Vec<(ObjectId, ObjectState)> = state
            .directory
            .live_records()
            .filter(|rec| rec.orphaned)
            .map(|rec| (rec.id, rec.state))
            .collect();

        let mut report = SweepReport::default();
        for (id, obj_state) in orphans {
            match obj_state {
                ObjectState::Created => {
                    if self.abort_locked(&mut state, &id).is_ok() {
                        report.aborted += 1;
                    }
                }
                ObjectState::Sealed => match self.delete_locked(&mut state, &id) {
                    Ok(DeleteOutcome::Reclaimed) => report.reclaimed += 1,
                    Ok(DeleteOutcome::PendingRelease) => report.pending += 1,
                    Err(e) => warn!(%id, error = %e, "failed to sweep orphan"),
                },
                ObjectState::Deleted => {}
            }
        }
        info!(
            aborted = report.aborted,
            reclaimed = report.reclaimed,
            pending = report.pending,
            "orphan sweep finished"
        );
        report
    }

    /// Stop accepting requests and wake every waiter.
    ///
    /// Views already handed out stay valid and can still be released.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let state = self.lock_state();
        for slot in state.waiters.values() {
            slot.cond.notify_all();
        }
        info!(endpoint = %self.config.endpoint.display(), "object store shut down");
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> StoreStats {
        let state = self.lock_state();
        let (mut created, mut sealed, mut orphaned) = (0, 0, 0);
        for rec in state.directory.live_records() {
            match rec.state {
                ObjectState::Created => created += 1,
                ObjectState::Sealed => sealed += 1,
                ObjectState::Deleted => {}
            }
            if rec.orphaned {
                orphaned += 1;
            }
        }
        StoreStats {
            capacity: self.arena.capacity(),
            allocated_bytes: self.arena.allocated_bytes(),
            free_bytes: self.arena.free_bytes(),
            largest_free_span: self.arena.largest_free_span(),
            free_spans: self.arena.free_span_count(),
            created,
            sealed,
            draining: state.directory.draining_len(),
            orphaned,
            sessions: state.sessions.len(),
            waiters: state.waiter_count(),
        }
    }

    /// Cross-check the directory against the allocator.
    ///
    /// Every record must own exactly one allocated span and every allocated
    /// span must belong to a record. Created records never carry references.
    pub fn check_consistency(&self) -> StoreResult<()> {
        let state = self.lock_state();
        self.arena.verify()?;

        let mut ranges: Vec<MemoryRange> = state
            .directory
            .records()
            .map(|rec| rec.range)
            .filter(|range| !range.is_empty())
            .collect();
        ranges.sort();
        let spans = self.arena.allocated_spans();
        if ranges != spans {
            return Err(ArenaError::Corrupted(format!(
                "directory holds {} spans, allocator {}",
                ranges.len(),
                spans.len()
            ))
            .into());
        }

        if let Some(rec) = state
            .directory
            .records()
            .find(|rec| rec.state == ObjectState::Created && rec.ref_count > 0)
        {
            return Err(StoreError::InvalidState {
                id: rec.id,
                state: rec.state,
                operation: "reference",
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("endpoint", &self.config.endpoint)
            .field("capacity", &self.arena.capacity())
            .field("running", &self.is_running())
            .finish()
    }
}
