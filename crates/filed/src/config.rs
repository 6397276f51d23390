//! Daemon configuration.
//!
//! Loaded once before the broker starts and shared read-only from then on.
//! Every key has a default, so running without a file works out of the box.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Public endpoint: the socket file external callers connect to.
    pub socket_file: PathBuf,
    /// Internal routing endpoint, private to the broker/worker pair.
    pub worker_socket_file: PathBuf,
    /// Field delimiter for request and reply frames.
    pub delimiter: String,
    /// Worker pool size N.
    pub workers: usize,
    /// Consecutive-failure threshold F; exceeding it retires a worker.
    pub failure_threshold: u32,
    /// Back-off between a worker's transport failures, in seconds.
    pub failure_backoff_secs: u64,
    /// Interval between endpoint self-checks, in seconds.
    pub self_check_interval_secs: u64,
    /// Default retry budget for the client protocol.
    pub client_retries: u32,
    /// Default per-attempt reply timeout for the client protocol, in seconds.
    pub client_timeout_secs: u64,
    /// Log destination; stdout when unset.
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket_file: PathBuf::from("/tmp/filed.sock"),
            worker_socket_file: PathBuf::from("/tmp/filed-workers.sock"),
            delimiter: "|".to_string(),
            workers: 5,
            failure_threshold: 5,
            failure_backoff_secs: 5,
            self_check_interval_secs: 5,
            client_retries: 3,
            client_timeout_secs: 25,
            log_file: None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// Load from a TOML file, or fall back to the defaults when no file is
    /// given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            None => Ok(Self::default()),
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Ok(toml::from_str(&raw)?)
            }
        }
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn self_check_interval(&self) -> Duration {
        Duration::from_secs(self.self_check_interval_secs)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}
