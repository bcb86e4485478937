use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock, Weak};

use tracing::{debug, info};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::store::ObjectStore;

/// Name table mapping endpoints to running stores.
///
/// Entries hold weak references: a registry never keeps a store alive, and an
/// entry whose store is gone or shut down counts as free.
#[derive(Debug, Default)]
pub struct EndpointRegistry {
    entries: RwLock<HashMap<PathBuf, Weak<ObjectStore>>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by [`StoreServer`] and sessions.
    pub fn global() -> &'static EndpointRegistry {
        static GLOBAL: OnceLock<EndpointRegistry> = OnceLock::new();
        GLOBAL.get_or_init(EndpointRegistry::new)
    }

    /// Open a store from `config` and bind it at `config.endpoint`.
    ///
    /// The check that the endpoint is free, the open, and the bind all run
    /// under the registry write lock, so two concurrent starts on one
    /// endpoint cannot both open (and map) a segment.
    pub fn open_and_bind(&self, config: StoreConfig) -> StoreResult<Arc<ObjectStore>> {
        let endpoint = config.endpoint.clone();
        let mut entries = self.entries.write().expect("endpoint registry lock poisoned");
        if let Some(existing) = entries.get(&endpoint).and_then(Weak::upgrade) {
            if existing.is_running() {
                return Err(StoreError::EndpointInUse(endpoint));
            }
        }
        let store = ObjectStore::open(config)?;
        entries.insert(endpoint.clone(), Arc::downgrade(&store));
        debug!(endpoint = %endpoint.display(), "endpoint bound");
        Ok(store)
    }

    /// `true` if a running store is bound at `endpoint`.
    pub fn is_bound(&self, endpoint: &Path) -> bool {
        let entries = self.entries.read().expect("endpoint registry lock poisoned");
        entries
            .get(endpoint)
            .and_then(Weak::upgrade)
            .is_some_and(|store| store.is_running())
    }

    /// Look up the running store at `endpoint`.
    ///
    /// Fails with [`StoreError::Unavailable`] if nothing is bound, the store
    /// has shut down, or its segment file has disappeared.
    pub fn resolve(&self, endpoint: &Path) -> StoreResult<Arc<ObjectStore>> {
        let entries = self.entries.read().expect("endpoint registry lock poisoned");
        let store = entries
            .get(endpoint)
            .and_then(Weak::upgrade)
            .ok_or_else(|| {
                StoreError::Unavailable(format!("no store at {}", endpoint.display()))
            })?;
        if !store.is_running() {
            return Err(StoreError::Unavailable(format!(
                "store at {} is shut down",
                endpoint.display()
            )));
        }
        if !store.is_reachable() {
            return Err(StoreError::Unavailable(format!(
                "segment for {} is missing",
                endpoint.display()
            )));
        }
        Ok(store)
    }

    /// Remove the binding, but only if it still points at `store`.
    pub fn unbind(&self, endpoint: &Path, store: &Arc<ObjectStore>) {
        let mut entries = self.entries.write().expect("endpoint registry lock poisoned");
        let ours = entries
            .get(endpoint)
            .is_some_and(|bound| Weak::ptr_eq(bound, &Arc::downgrade(store)));
        if ours {
            entries.remove(endpoint);
            debug!(endpoint = %endpoint.display(), "endpoint unbound");
        }
    }

    /// Endpoints with a running store, sorted.
    pub fn endpoints(&self) -> Vec<PathBuf> {
        let entries = self.entries.read().expect("endpoint registry lock poisoned");
        let mut live: Vec<PathBuf> = entries
            .iter()
            .filter(|(_, store)| store.upgrade().is_some_and(|s| s.is_running()))
            .map(|(endpoint, _)| endpoint.clone())
            .collect();
        live.sort();
        live
    }
}

/// A running store published at its configured endpoint.
///
/// Dropping the server shuts the store down and unbinds the endpoint.
/// Sessions that still hold the store see [`StoreError::Unavailable`] from
/// then on.
pub struct StoreServer {
    store: Arc<ObjectStore>,
    endpoint: PathBuf,
    registry: &'static EndpointRegistry,
}

impl StoreServer {
    /// Open a store from `config` and bind it in the global registry.
    pub fn start(config: StoreConfig) -> StoreResult<Self> {
        Self::start_in(EndpointRegistry::global(), config)
    }

    /// Same as [`StoreServer::start`] against a specific registry.
    pub fn start_in(registry: &'static EndpointRegistry, config: StoreConfig) -> StoreResult<Self> {
        let endpoint = config.endpoint.clone();
        let store = registry.open_and_bind(config)?;
        info!(endpoint = %endpoint.display(), "store server started");
        Ok(Self {
            store,
            endpoint,
            registry,
        })
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn endpoint(&self) -> &Path {
        &self.endpoint
    }

    /// Stop the store and unbind the endpoint.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for StoreServer {
    fn drop(&mut self) {
        self.store.shutdown();
        self.registry.unbind(&self.endpoint, &self.store);
        info!(endpoint = %self.endpoint.display(), "store server stopped");
    }
}

impl std::fmt::Debug for StoreServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreServer")
            .field("endpoint", &self.endpoint)
            .field("store", &self.store)
            .finish()
    }
}
