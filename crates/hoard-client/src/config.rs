use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Per-session tuning.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How long `get` waits for an unsealed object.
    pub get_timeout_ms: u64,
    /// How long `delete` waits for readers of a deleted object to finish.
    pub delete_wait_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            get_timeout_ms: 500,
            delete_wait_ms: 100,
        }
    }
}

impl SessionConfig {
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }

    pub fn delete_wait(&self) -> Duration {
        Duration::from_millis(self.delete_wait_ms)
    }

    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_delete_wait(mut self, wait: Duration) -> Self {
        self.delete_wait_ms = wait.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> SessionResult<()> {
        if self.get_timeout_ms > 60 * 60 * 1000 {
            return Err(SessionError::Config(format!(
                "get_timeout_ms {} exceeds one hour",
                self.get_timeout_ms
            )));
        }
        if self.delete_wait_ms > 60 * 60 * 1000 {
            return Err(SessionError::Config(format!(
                "delete_wait_ms {} exceeds one hour",
                self.delete_wait_ms
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(s: &str) -> SessionResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| SessionError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SessionConfig::default();
        assert_eq!(c.get_timeout(), Duration::from_millis(500));
        assert_eq!(c.delete_wait(), Duration::from_millis(100));
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml() {
        let c = SessionConfig::from_toml_str("get_timeout_ms = 20\n").unwrap();
        assert_eq!(c.get_timeout_ms, 20);
        assert_eq!(c.delete_wait_ms, 100);
    }

    #[test]
    fn absurd_timeout_rejected() {
        assert!(matches!(
            SessionConfig::from_toml_str("delete_wait_ms = 999999999\n"),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SessionConfig::load(&dir.path().join("nope.toml")),
            Err(SessionError::Config(_))
        ));
    }
}
