//! Hub configuration.
//!
//! Read once at startup and treated as immutable afterwards. Every field has
//! a default; JSON documents and environment variables only override what
//! they name.

use crate::error::{BusError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Hub configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Data source name for the backing store (file path or `:memory:`).
    pub dsn: String,

    /// Maximum messages per write transaction and per poll fetch.
    /// Default: 1000
    pub max_batch_size: usize,

    /// Interval between poll attempts.
    /// Default: 100ms
    pub poll_interval_ms: u64,

    /// Interval between background reclamation passes.
    /// Default: 600s
    pub gc_interval_secs: u64,

    /// Number of most-recent messages reclamation always keeps.
    /// Default: 10000
    pub gc_keep_items: usize,

    /// How long a forming batch waits for more messages before it is flushed.
    /// Default: 100ms
    pub flush_timeout_ms: u64,

    /// Capacity of each subscriber's output channel.
    /// Default: 1000
    pub subscriber_buffer_size: usize,

    /// Retries for a failed batch write before the batch is dropped.
    /// Default: 3
    pub publish_retries: u32,

    /// Initial backoff between batch write retries (doubles per attempt).
    /// Default: 50ms
    pub publish_retry_backoff_ms: u64,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            dsn: "tablebus.db".to_string(),
            max_batch_size: 1000,
            poll_interval_ms: 100,
            gc_interval_secs: 600,
            gc_keep_items: 10_000,
            flush_timeout_ms: 100,
            subscriber_buffer_size: 1000,
            publish_retries: 3,
            publish_retry_backoff_ms: 50,
        }
    }
}

impl HubConfig {
    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: HubConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = HubConfig::default();
        if let Some(dsn) = lookup("DSN") {
            config.dsn = dsn;
        }
        override_parsed(&lookup, "MAX_BATCH_SIZE", &mut config.max_batch_size)?;
        override_parsed(&lookup, "POLL_INTERVAL_IN_MS", &mut config.poll_interval_ms)?;
        override_parsed(&lookup, "GC_INTERVAL_IN_SEC", &mut config.gc_interval_secs)?;
        override_parsed(&lookup, "GC_KEEP_ITEMS", &mut config.gc_keep_items)?;
        override_parsed(&lookup, "FLUSH_TIMEOUT_IN_MS", &mut config.flush_timeout_ms)?;
        override_parsed(
            &lookup,
            "SUBSCRIBER_BUFFER_SIZE",
            &mut config.subscriber_buffer_size,
        )?;
        override_parsed(&lookup, "PUBLISH_RETRIES", &mut config.publish_retries)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the workers cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(BusError::InvalidConfig(
                "max_batch_size must be greater than zero".into(),
            ));
        }
        if self.subscriber_buffer_size == 0 {
            return Err(BusError::InvalidConfig(
                "subscriber_buffer_size must be greater than zero".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(BusError::InvalidConfig(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.flush_timeout_ms == 0 {
            return Err(BusError::InvalidConfig(
                "flush_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }

    pub fn publish_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.publish_retry_backoff_ms)
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(raw) = lookup(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|_| BusError::InvalidConfig(format!("{}={:?} is not a number", key, raw)))?;
    }
    Ok(())
}
