//! Configuration for the dispatcher.

use std::time::Duration;

use anyhow::{bail, Context, Result};

/// Dispatcher configuration, loaded once at startup and never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Unique identifier of the cluster this dispatcher serves.
    pub cluster_uid: String,

    /// Object store bucket holding payloads, results, and status markers.
    pub bucket: String,

    /// Name of the API whose queue this dispatcher consumes.
    pub api_name: String,

    /// URL of the user container the payload is forwarded to.
    pub target_url: String,

    /// Number of consumer workers, each processing one message at a time.
    pub workers: usize,

    /// How long one queue receive call waits for a message.
    pub receive_wait: Duration,

    /// Visibility timeout configured on the queue. Used only to validate
    /// the forward timeout; the queue itself enforces it.
    pub visibility_timeout: Duration,

    /// Hard timeout on the HTTP forward to the user container. Must be
    /// shorter than the visibility timeout, or a slow container lets the
    /// message become visible again while a worker is still on it.
    pub target_timeout: Duration,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cluster_uid = required("CASCADE_CLUSTER_UID")?;
        let bucket = required("CASCADE_BUCKET")?;
        let api_name = required("CASCADE_API_NAME")?;

        let target_url = std::env::var("CASCADE_TARGET_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let workers = std::env::var("CASCADE_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let receive_wait = duration_var("CASCADE_RECEIVE_WAIT_SECS", 10);
        let visibility_timeout = duration_var("CASCADE_VISIBILITY_TIMEOUT_SECS", 60);
        let target_timeout = duration_var("CASCADE_TARGET_TIMEOUT_SECS", 55);

        let log_level = std::env::var("CASCADE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let config = Self {
            cluster_uid,
            bucket,
            api_name,
            target_url,
            workers,
            receive_wait,
            visibility_timeout,
            target_timeout,
            log_level,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that break queue delivery guarantees.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("CASCADE_WORKERS must be at least 1");
        }
        if self.target_timeout >= self.visibility_timeout {
            bail!(
                "target timeout ({:?}) must be shorter than the queue visibility timeout ({:?}); \
                 otherwise a slow user container causes duplicate delivery",
                self.target_timeout,
                self.visibility_timeout
            );
        }
        Ok(())
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} must be set"))
}

fn duration_var(name: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}
