use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Default arena capacity: 64 MiB.
pub const DEFAULT_CAPACITY: usize = 64 * 1024 * 1024;

/// Largest arena a single store will map: 64 GiB, or the whole address
/// space on targets with narrower pointers.
pub const MAX_CAPACITY: usize = if usize::BITS >= 64 {
    (64u64 << 30) as usize
} else {
    usize::MAX
};

/// What happens to a session's sealed objects that are still referenced
/// when the session closes. Unreferenced ones always stay readable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Delete them right away; the last release of the remaining readers
    /// reclaims them.
    #[default]
    Reclaim,
    /// Keep them readable until an explicit orphan sweep.
    Retain,
}

/// Backing for the arena mapping.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SegmentConfig {
    /// Anonymous shared memory, private to this process tree.
    #[default]
    Anonymous,
    /// A file-backed segment, e.g. under `/dev/shm`. Created on start and
    /// removed on shutdown.
    File { path: PathBuf },
}

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Name sessions use to reach the store.
    pub endpoint: PathBuf,
    /// Arena size in bytes.
    pub capacity: usize,
    pub orphan_policy: OrphanPolicy,
    pub segment: SegmentConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: PathBuf::from("/tmp/hoard"),
            capacity: DEFAULT_CAPACITY,
            orphan_policy: OrphanPolicy::default(),
            segment: SegmentConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Default configuration bound at `endpoint` with `capacity` bytes.
    pub fn new(endpoint: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            capacity,
            ..Self::default()
        }
    }

    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    pub fn with_segment(mut self, segment: SegmentConfig) -> Self {
        self.segment = segment;
        self
    }

    /// Check the configuration for values the store cannot run with.
    pub fn validate(&self) -> StoreResult<()> {
        if self.capacity == 0 {
            return Err(StoreError::Config("capacity must be non-zero".into()));
        }
        if self.capacity > MAX_CAPACITY {
            return Err(StoreError::Config(format!(
                "capacity {} exceeds maximum {MAX_CAPACITY}",
                self.capacity
            )));
        }
        if self.endpoint.as_os_str().is_empty() {
            return Err(StoreError::Config("endpoint must not be empty".into()));
        }
        if let SegmentConfig::File { path } = &self.segment {
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("segment path must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> StoreResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| StoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> StoreResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> StoreResult<String> {
        toml::to_string(self).map_err(|e| StoreError::Config(e.to_string()))
    }
}
