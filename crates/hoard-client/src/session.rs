use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use hoard_store::{
    CloseReport, DeleteOutcome, EndpointRegistry, ObjectStore, ObjectView, StoreError,
};
use hoard_types::{HashKeyMapper, KeyMapper, ObjectId, SessionId};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::kv::{DeleteStatus, KeyValueStore, PutStatus};

/// One client's connection to a store.
///
/// Tracks the ids this session created; only those may be deleted through
/// it. Closing or dropping the session hands them back to the store.
pub struct Session<M: KeyMapper = HashKeyMapper> {
    id: SessionId,
    store: Weak<ObjectStore>,
    config: SessionConfig,
    mapper: M,
    owned: HashSet<ObjectId>,
    closed: bool,
}

impl Session {
    /// Connect to the store bound at `endpoint` with default settings.
    pub fn connect(endpoint: impl AsRef<Path>) -> SessionResult<Self> {
        Self::connect_with(endpoint, SessionConfig::default(), HashKeyMapper::default())
    }
}

impl<M: KeyMapper> Session<M> {
    /// Connect to the store bound at `endpoint`.
    ///
    /// Fails with [`SessionError::Unavailable`] when nothing is running
    /// there.
    pub fn connect_with(
        endpoint: impl AsRef<Path>,
        config: SessionConfig,
        mapper: M,
    ) -> SessionResult<Self> {
        let store = EndpointRegistry::global().resolve(endpoint.as_ref())?;
        Self::attach_with(&store, config, mapper)
    }

    /// Open a session directly on a store handle.
    pub fn attach_with(store: &Arc<ObjectStore>, config: SessionConfig, mapper: M) -> SessionResult<Self> {
        config.validate()?;
        let id = store.open_session()?;
        Ok(Self {
            id,
            store: Arc::downgrade(store),
            config,
            mapper,
            owned: HashSet::new(),
            closed: false,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The object id `key` maps to.
    pub fn object_id(&self, key: &str) -> ObjectId {
        self.mapper.map_key(key.as_bytes())
    }

    fn store(&self) -> SessionResult<Arc<ObjectStore>> {
        match self.store.upgrade() {
            Some(store) if store.is_running() => Ok(store),
            _ => Err(SessionError::Unavailable("store is shut down".into())),
        }
    }

    /// Store `value` under `key`.
    ///
    /// Returns [`PutStatus::Conflict`] without touching anything if the key
    /// already has an object. A failed write discards the new object.
    pub fn put(&mut self, key: &str, value: &[u8]) -> SessionResult<PutStatus> {
        let id = self.object_id(key);
        let store = self.store()?;
        match store.create(&id, value.len()) {
            Ok(()) => {}
            Err(StoreError::DuplicateObject(_)) => {
                debug!(key, %id, "put conflict");
                return Ok(PutStatus::Conflict);
            }
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = store.write(&id, value).and_then(|()| store.seal(&id)) {
            warn!(key, %id, error = %e, "put failed, discarding object");
            if let Err(abort) = store.abort(&id) {
                warn!(key, %id, error = %abort, "failed to discard object");
            }
            return Err(e.into());
        }
        self.owned.insert(id);
        debug!(key, %id, len = value.len(), "put");
        Ok(PutStatus::Stored)
    }

    /// Copy out the value stored under `key`.
    pub fn get(&mut self, key: &str) -> SessionResult<Bytes> {
        let view = self.get_view(key)?;
        let value = Bytes::copy_from_slice(&view);
        view.release()?;
        Ok(value)
    }

    /// Borrow the value stored under `key` without copying.
    ///
    /// The object stays allocated until the view is released or dropped.
    pub fn get_view(&self, key: &str) -> SessionResult<ObjectView> {
        let id = self.object_id(key);
        let store = self.store()?;
        match store.get(&id, self.config.get_timeout()) {
            Ok(view) => Ok(view),
            Err(StoreError::NotFound(_) | StoreError::Timeout { .. }) => {
                Err(SessionError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a key this session put.
    ///
    /// Keys owned by other sessions are [`DeleteStatus::Rejected`]. If readers
    /// still hold the object, waits up to the configured delete wait for
    /// them before reporting [`DeleteStatus::PendingRelease`].
    pub fn delete(&mut self, key: &str) -> SessionResult<DeleteStatus> {
        let id = self.object_id(key);
        if !self.owned.contains(&id) {
            warn!(key, %id, session = %self.id, "delete rejected, key not owned");
            return Ok(DeleteStatus::Rejected);
        }
        let store = self.store()?;
        let outcome = match store.delete(&id) {
            Ok(outcome) => outcome,
            // Already settled through another path.
            Err(StoreError::NotFound(_)) => DeleteOutcome::Reclaimed,
            Err(e) => return Err(e.into()),
        };
        self.owned.remove(&id);
        let status = match outcome {
            DeleteOutcome::Reclaimed => DeleteStatus::Deleted,
            DeleteOutcome::PendingRelease if store.wait_reclaimed(&id, self.config.delete_wait()) => {
                DeleteStatus::Deleted
            }
            DeleteOutcome::PendingRelease => DeleteStatus::PendingRelease,
        };
        debug!(key, %id, ?status, "delete");
        Ok(status)
    }

    /// `true` if an object (sealed or not) exists for `key`.
    pub fn contains(&self, key: &str) -> SessionResult<bool> {
        Ok(self.store()?.contains(&self.object_id(key)))
    }

    /// `true` if this session put `key` and has not deleted it.
    pub fn owns(&self, key: &str) -> bool {
        self.owned.contains(&self.object_id(key))
    }

    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }

    /// Close the session and let the store settle its objects.
    pub fn close(mut self) -> CloseReport {
        self.close_inner()
    }

    fn close_inner(&mut self) -> CloseReport {
        if self.closed {
            return CloseReport::default();
        }
        self.closed = true;
        let owned = std::mem::take(&mut self.owned);
        match self.store.upgrade() {
            Some(store) => store.close_session(self.id, owned),
            None => {
                info!(session = %self.id, "store gone, nothing to settle");
                CloseReport::default()
            }
        }
    }
}

impl<M: KeyMapper> Drop for Session<M> {
    fn drop(&mut self) {
        self.close_inner();
    }
}

impl<M: KeyMapper> KeyValueStore for Session<M> {
    fn put(&mut self, key: &str, value: &[u8]) -> SessionResult<PutStatus> {
        Session::<M>::put(self, key, value)
    }

    fn get(&mut self, key: &str) -> SessionResult<Bytes> {
        Session::<M>::get(self, key)
    }

    fn delete(&mut self, key: &str) -> SessionResult<DeleteStatus> {
        Session::<M>::delete(self, key)
    }
}

impl<M: KeyMapper> std::fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("owned", &self.owned.len())
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::thread;
    use std::time::Duration;

    use hoard_store::{OrphanPolicy, StoreConfig, StoreServer};

    use super::*;

    fn server(capacity: usize) -> StoreServer {
        let endpoint = PathBuf::from(format!("/tmp/hoard-client-test-{}", SessionId::new()));
        StoreServer::start(StoreConfig::new(endpoint, capacity)).unwrap()
    }

    fn fast() -> SessionConfig {
        SessionConfig::default()
            .with_get_timeout(Duration::from_millis(20))
            .with_delete_wait(Duration::from_millis(20))
    }

    fn session(server: &StoreServer) -> Session {
        Session::connect_with(server.endpoint(), fast(), HashKeyMapper::default()).unwrap()
    }

    // -----------------------------------------------------------------------
    // Put / get
    // -----------------------------------------------------------------------

    #[test]
    fn put_then_get() {
        let server = server(1024);
        let mut s = Session::connect(server.endpoint()).unwrap();
        assert_eq!(s.put("alpha", b"one").unwrap(), PutStatus::Stored);
        assert_eq!(s.get("alpha").unwrap(), Bytes::from_static(b"one"));
        assert!(s.contains("alpha").unwrap());
        assert!(s.owns("alpha"));
        assert_eq!(s.owned_count(), 1);
        // The copy released its reference.
        let info = server.store().info(&s.object_id("alpha")).unwrap();
        assert_eq!(info.ref_count, 0);
    }

    #[test]
    fn empty_value() {
        let server = server(64);
        let mut s = session(&server);
        assert_eq!(s.put("empty", b"").unwrap(), PutStatus::Stored);
        assert!(s.get("empty").unwrap().is_empty());
    }

    #[test]
    fn second_put_conflicts_and_keeps_value() {
        let server = server(1024);
        let mut a = session(&server);
        let mut b = session(&server);
        a.put("k", b"first").unwrap();
        assert_eq!(b.put("k", b"second").unwrap(), PutStatus::Conflict);
        assert!(!b.owns("k"));
        assert_eq!(b.get("k").unwrap(), Bytes::from_static(b"first"));
    }

    #[test]
    fn missing_key_is_not_found() {
        let server = server(64);
        let mut s = session(&server);
        assert!(matches!(s.get("nope"), Err(SessionError::NotFound(k)) if k == "nope"));
    }

    #[test]
    fn oversized_put_fails_and_owns_nothing() {
        let server = server(16);
        let mut s = session(&server);
        let err = s.put("big", &[0u8; 17]).unwrap_err();
        assert!(matches!(err, SessionError::Store(StoreError::OutOfSpace { .. })));
        assert_eq!(s.owned_count(), 0);
        assert!(!s.contains("big").unwrap());
    }

    #[test]
    fn view_is_zero_copy_and_pins_the_object() {
        let server = server(64);
        let mut s = session(&server);
        s.put("k", b"pinned").unwrap();
        let view = s.get_view("k").unwrap();
        assert_eq!(&*view, b"pinned");
        assert_eq!(s.delete("k").unwrap(), DeleteStatus::PendingRelease);
        assert_eq!(&*view, b"pinned");
        drop(view);
        assert_eq!(server.store().stats().allocated_bytes, 0);
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    #[test]
    fn owner_deletes() {
        let server = server(64);
        let mut s = session(&server);
        s.put("k", b"v").unwrap();
        assert_eq!(s.delete("k").unwrap(), DeleteStatus::Deleted);
        assert!(!s.contains("k").unwrap());
        assert!(!s.owns("k"));
        assert_eq!(s.delete("k").unwrap(), DeleteStatus::Rejected);
    }

    #[test]
    fn non_owner_is_rejected() {
        let server = server(64);
        let mut a = session(&server);
        let mut b = session(&server);
        a.put("k", b"v").unwrap();
        assert_eq!(b.delete("k").unwrap(), DeleteStatus::Rejected);
        assert!(b.contains("k").unwrap());
    }

    #[test]
    fn delete_waits_for_a_reader_that_finishes() {
        let server = server(64);
        let config = fast().with_delete_wait(Duration::from_secs(5));
        let mut owner = Session::connect_with(server.endpoint(), config, HashKeyMapper::default()).unwrap();
        let reader = session(&server);
        owner.put("k", b"v").unwrap();
        let view = reader.get_view("k").unwrap();

        let releaser = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            view.release().unwrap();
        });
        assert_eq!(owner.delete("k").unwrap(), DeleteStatus::Deleted);
        releaser.join().unwrap();
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    #[test]
    fn values_outlive_the_session_that_put_them() {
        let server = server(64);
        {
            let mut a = session(&server);
            assert_eq!(a.put("user1", b"profile").unwrap(), PutStatus::Stored);
        }
        let mut b = session(&server);
        assert_eq!(b.get("user1").unwrap(), Bytes::from_static(b"profile"));
        assert!(!b.owns("user1"));
        assert_eq!(server.store().stats().orphaned, 0);
    }

    #[test]
    fn closing_orphans_objects_still_being_read() {
        let server = server(64);
        let mut a = session(&server);
        let b = session(&server);
        a.put("read", b"v").unwrap();
        a.put("idle", b"w").unwrap();
        let view = b.get_view("read").unwrap();

        let report = a.close();
        assert_eq!(report.kept, 1);
        assert_eq!(report.orphaned, 1);
        assert_eq!(report.pending, 1);
        assert!(matches!(b.get_view("read"), Err(SessionError::NotFound(_))));
        assert_eq!(&*view, b"v");
        view.release().unwrap();
        assert!(b.contains("idle").unwrap());
        assert_eq!(server.store().stats().allocated_bytes, 1);
        assert_eq!(server.store().stats().sessions, 1);
    }

    #[test]
    fn retained_orphans_stay_readable() {
        let endpoint = PathBuf::from(format!("/tmp/hoard-client-test-{}", SessionId::new()));
        let server = StoreServer::start(
            StoreConfig::new(endpoint, 64).with_orphan_policy(OrphanPolicy::Retain),
        )
        .unwrap();
        let mut b = session(&server);
        let view = {
            let mut a = session(&server);
            a.put("k", b"v").unwrap();
            b.get_view("k").unwrap()
        };
        assert_eq!(b.get("k").unwrap(), Bytes::from_static(b"v"));
        assert_eq!(b.delete("k").unwrap(), DeleteStatus::Rejected);
        drop(view);
        assert_eq!(server.store().sweep_orphans().reclaimed, 1);
        assert!(!b.contains("k").unwrap());
    }

    #[test]
    fn unknown_endpoint_is_unavailable() {
        let err = Session::connect("/tmp/hoard-client-test-nowhere").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn operations_after_shutdown_are_unavailable() {
        let server = server(64);
        let mut s = session(&server);
        s.put("k", b"v").unwrap();
        server.shutdown();
        assert!(matches!(s.get("k"), Err(SessionError::Unavailable(_))));
        assert!(matches!(s.put("j", b"v"), Err(SessionError::Unavailable(_))));
        assert!(matches!(s.contains("k"), Err(SessionError::Unavailable(_))));
    }

    // -----------------------------------------------------------------------
    // Mapping and trait use
    // -----------------------------------------------------------------------

    #[test]
    fn custom_mapper() {
        let server = server(64);
        let mapper = |key: &[u8]| {
            let mut raw = [0u8; 16];
            raw[..key.len().min(16)].copy_from_slice(&key[..key.len().min(16)]);
            ObjectId::from_raw(raw)
        };
        let mut s = Session::attach_with(server.store(), fast(), mapper).unwrap();
        s.put("abc", b"v").unwrap();
        let mut raw = [0u8; 16];
        raw[..3].copy_from_slice(b"abc");
        assert!(server.store().contains(&ObjectId::from_raw(raw)));
    }

    fn roundtrip(kv: &mut impl KeyValueStore) -> SessionResult<Bytes> {
        kv.put("trait-key", b"via trait")?;
        let value = kv.get("trait-key")?;
        kv.delete("trait-key")?;
        Ok(value)
    }

    #[test]
    fn usable_through_the_trait() {
        let server = server(64);
        let mut s = session(&server);
        assert_eq!(roundtrip(&mut s).unwrap(), Bytes::from_static(b"via trait"));
        assert_eq!(s.owned_count(), 0);
    }

    #[test]
    fn sessions_on_many_threads() {
        let server = server(64 * 1024);
        let endpoint = server.endpoint().to_path_buf();
        let workers: Vec<_> = (0..8)
            .map(|t| {
                let endpoint = endpoint.clone();
                thread::spawn(move || {
                    let mut s = Session::connect(&endpoint).unwrap();
                    for i in 0..50 {
                        let key = format!("t{t}-k{i}");
                        let value = key.repeat(3);
                        assert_eq!(s.put(&key, value.as_bytes()).unwrap(), PutStatus::Stored);
                        assert_eq!(s.get(&key).unwrap(), Bytes::from(value));
                    }
                    for i in 0..25 {
                        assert_eq!(s.delete(&format!("t{t}-k{i}")).unwrap(), DeleteStatus::Deleted);
                    }
                    s.owned_count()
                })
            })
            .collect();
        for w in workers {
            assert_eq!(w.join().unwrap(), 25);
        }
        // Every session has closed; undeleted values stay readable.
        let stats = server.store().stats();
        assert_eq!(stats.sealed, 8 * 25);
        assert_eq!(stats.orphaned, 0);
        assert_eq!(stats.sessions, 0);
        let mut reader = session(&server);
        assert_eq!(reader.get("t7-k49").unwrap(), Bytes::from("t7-k49".repeat(3)));
        assert!(matches!(reader.get("t7-k0"), Err(SessionError::NotFound(_))));
        server.store().check_consistency().unwrap();
    }
}
