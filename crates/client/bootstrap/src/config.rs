//! Client configuration structures and loaders.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use runtime::{PersistenceConfig, RuntimeConfig};

use crate::dirs;

/// Configuration required to bootstrap a client session.
#[derive(Clone, Debug, Default)]
pub struct ClientConfig {
    pub runtime: RuntimeConfig,
    pub enable_persistence: bool,
    pub session_id: Option<String>,
    pub save_data_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl ClientConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `BATCH_INTERVAL_MS` - Broadcast tick (default: 1000)
    /// - `MAX_BROADCAST_ATTEMPTS` - Attempts before an action is rejected (default: 5)
    /// - `BACKOFF_BASE_MS` / `BACKOFF_MAX_MS` - Retry backoff (default: 200 / 10000)
    /// - `COMPLETION_CACHE_CAPACITY` - Resolutions kept for late waiters (default: 256)
    /// - `EVENT_BUFFER_SIZE` - Notification buffer per topic (default: 256)
    /// - `PERSIST_INTERVAL_MS` - Pending action checkpoint period (default: 30000)
    /// - `BLOCK_INTERVAL_MS` - Expected block time for unlock estimates (default: 8000)
    /// - `ENABLE_PERSISTENCE` - Persist actions awaiting evaluation (default: false)
    /// - `GAME_SESSION_ID` - Session identifier for save and log files (default: auto-generated)
    /// - `SAVE_DATA_DIR` - Directory for save data (default: platform-specific)
    /// - `LOG_DIR` - Directory for log files (default: platform-specific)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with variables read from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read_ms = |key: &str| read::<u64>(&lookup, key).map(Duration::from_millis);
        let mut config = Self::default();
        let runtime = &mut config.runtime;

        if let Some(interval) = read_ms("BATCH_INTERVAL_MS") {
            runtime.batch_interval = interval.max(Duration::from_millis(1));
        }
        if let Some(attempts) = read::<u32>(&lookup, "MAX_BROADCAST_ATTEMPTS") {
            runtime.max_attempts = attempts.max(1);
        }
        if let Some(base) = read_ms("BACKOFF_BASE_MS") {
            runtime.backoff_base = base;
        }
        if let Some(max) = read_ms("BACKOFF_MAX_MS") {
            runtime.backoff_max = max;
        }
        if let Some(capacity) = read::<usize>(&lookup, "COMPLETION_CACHE_CAPACITY") {
            runtime.completion_cache_capacity = capacity.max(1);
        }
        if let Some(capacity) = read::<usize>(&lookup, "EVENT_BUFFER_SIZE") {
            runtime.event_buffer_size = capacity.max(1);
        }
        if let Some(interval) = read_ms("PERSIST_INTERVAL_MS") {
            runtime.persist_interval = interval.max(Duration::from_millis(1));
        }
        if let Some(interval) = read_ms("BLOCK_INTERVAL_MS") {
            runtime.unlock_estimate.block_interval = interval;
        }

        // Accept the bare variable as "true"
        config.enable_persistence = match read::<bool>(&lookup, "ENABLE_PERSISTENCE") {
            Some(enable) => enable,
            None => lookup("ENABLE_PERSISTENCE").is_some(),
        };

        config.session_id = lookup("GAME_SESSION_ID").filter(|id| !id.is_empty());
        config.save_data_dir = lookup("SAVE_DATA_DIR").map(PathBuf::from);
        config.log_dir = lookup("LOG_DIR").map(PathBuf::from);

        config
    }

    /// Session id, generating a timestamped one when none is configured.
    pub fn resolve_session_id(&mut self) -> String {
        self.session_id
            .get_or_insert_with(|| format!("session_{}", chrono::Utc::now().timestamp()))
            .clone()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.save_data_dir.clone().unwrap_or_else(dirs::data_dir)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(dirs::log_dir)
    }

    /// Runtime configuration with persistence filled in for `session_id`.
    pub fn runtime_config(&self, session_id: &str) -> RuntimeConfig {
        let mut runtime = self.runtime.clone();
        runtime.persistence = self
            .enable_persistence
            .then(|| PersistenceConfig::new(session_id, self.data_dir()));
        runtime
    }
}

fn read<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    lookup(key)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ClientConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = config(&[]);
        assert_eq!(config.runtime.batch_interval, Duration::from_secs(1));
        assert_eq!(config.runtime.max_attempts, 5);
        assert!(!config.enable_persistence);
        assert!(config.session_id.is_none());
        assert!(config.runtime_config("s").persistence.is_none());
    }

    #[test]
    fn reads_runtime_overrides() {
        let config = config(&[
            ("BATCH_INTERVAL_MS", "250"),
            ("MAX_BROADCAST_ATTEMPTS", "0"),
            ("BACKOFF_MAX_MS", "5000"),
            ("BLOCK_INTERVAL_MS", "12000"),
            ("EVENT_BUFFER_SIZE", "not-a-number"),
        ]);
        assert_eq!(config.runtime.batch_interval, Duration::from_millis(250));
        assert_eq!(config.runtime.max_attempts, 1);
        assert_eq!(config.runtime.backoff_max, Duration::from_secs(5));
        assert_eq!(
            config.runtime.unlock_estimate.block_interval,
            Duration::from_secs(12)
        );
        assert_eq!(config.runtime.event_buffer_size, 256);
    }

    #[test]
    fn persistence_uses_session_and_data_dir() {
        let mut config = config(&[
            ("ENABLE_PERSISTENCE", ""),
            ("GAME_SESSION_ID", "alpha"),
            ("SAVE_DATA_DIR", "/var/game"),
        ]);
        assert!(config.enable_persistence);

        let session_id = config.resolve_session_id();
        assert_eq!(session_id, "alpha");
        let persistence = config.runtime_config(&session_id).persistence.unwrap();
        assert_eq!(persistence.session_id, "alpha");
        assert_eq!(persistence.base_dir, PathBuf::from("/var/game"));
    }

    #[test]
    fn generated_session_id_is_stable() {
        let mut config = config(&[("ENABLE_PERSISTENCE", "false")]);
        assert!(!config.enable_persistence);
        let first = config.resolve_session_id();
        assert!(first.starts_with("session_"));
        assert_eq!(config.resolve_session_id(), first);
    }
}
