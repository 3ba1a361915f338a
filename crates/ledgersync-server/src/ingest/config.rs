//! Sync pipeline configuration
//!
//! Batch sizes, concurrency and timeouts shared by ingestion, the full sync
//! and the linker/reconciler passes.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default rows selected per linker pass and child table.
pub const DEFAULT_LINK_BATCH_SIZE: usize = 5_000;

/// Default vouchers selected per reconciler pass.
pub const DEFAULT_RECONCILE_BATCH_SIZE: usize = 5_000;

/// Default records per store batch.
pub const DEFAULT_STORE_BATCH_SIZE: usize = 500;

/// Default timeout for one store batch in seconds.
pub const DEFAULT_STORE_BATCH_TIMEOUT_SECS: u64 = 120;

/// Default timeout for one source call in seconds.
pub const DEFAULT_SOURCE_TIMEOUT_SECS: u64 = 300;

/// Default source export endpoint.
pub const DEFAULT_SOURCE_URL: &str = "http://localhost:9000";

/// Default number of job detail rows kept per job.
pub const DEFAULT_DETAIL_SAMPLE_LIMIT: usize = 200;

/// Default concurrency when no pool size is known.
pub const DEFAULT_CONCURRENCY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Concurrent units of work; matches the database pool by default
    pub concurrency: usize,
    pub link_batch_size: usize,
    pub reconcile_batch_size: usize,
    pub store_batch_size: usize,
    pub store_batch_timeout_secs: u64,
    pub source_url: String,
    pub source_timeout_secs: u64,
    /// Upper bound on sync_job_details rows per job
    pub detail_sample_limit: usize,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl SyncConfig {
    /// Load from `SYNC_*` variables; concurrency defaults to `pool_size`.
    pub fn from_env(pool_size: usize) -> Self {
        Self {
            concurrency: env_or("SYNC_CONCURRENCY", pool_size.max(1)),
            link_batch_size: env_or("SYNC_LINK_BATCH_SIZE", DEFAULT_LINK_BATCH_SIZE),
            reconcile_batch_size: env_or("SYNC_RECONCILE_BATCH_SIZE", DEFAULT_RECONCILE_BATCH_SIZE),
            store_batch_size: env_or("SYNC_STORE_BATCH_SIZE", DEFAULT_STORE_BATCH_SIZE),
            store_batch_timeout_secs: env_or(
                "SYNC_STORE_BATCH_TIMEOUT_SECS",
                DEFAULT_STORE_BATCH_TIMEOUT_SECS,
            ),
            source_url: std::env::var("SYNC_SOURCE_URL")
                .unwrap_or_else(|_| DEFAULT_SOURCE_URL.to_string()),
            source_timeout_secs: env_or("SYNC_SOURCE_TIMEOUT_SECS", DEFAULT_SOURCE_TIMEOUT_SECS),
            detail_sample_limit: env_or("SYNC_DETAIL_SAMPLE_LIMIT", DEFAULT_DETAIL_SAMPLE_LIMIT),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.concurrency == 0 {
            anyhow::bail!("SYNC_CONCURRENCY must be greater than 0");
        }
        if self.link_batch_size == 0 {
            anyhow::bail!("SYNC_LINK_BATCH_SIZE must be greater than 0");
        }
        if self.reconcile_batch_size == 0 {
            anyhow::bail!("SYNC_RECONCILE_BATCH_SIZE must be greater than 0");
        }
        if self.store_batch_size == 0 {
            anyhow::bail!("SYNC_STORE_BATCH_SIZE must be greater than 0");
        }
        if self.store_batch_timeout_secs == 0 {
            anyhow::bail!("SYNC_STORE_BATCH_TIMEOUT_SECS must be greater than 0");
        }
        if self.source_timeout_secs == 0 {
            anyhow::bail!("SYNC_SOURCE_TIMEOUT_SECS must be greater than 0");
        }
        if self.source_url.is_empty() {
            anyhow::bail!("SYNC_SOURCE_URL cannot be empty");
        }
        Ok(())
    }

    pub fn store_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.store_batch_timeout_secs)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_secs(self.source_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            link_batch_size: DEFAULT_LINK_BATCH_SIZE,
            reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
            store_batch_size: DEFAULT_STORE_BATCH_SIZE,
            store_batch_timeout_secs: DEFAULT_STORE_BATCH_TIMEOUT_SECS,
            source_url: DEFAULT_SOURCE_URL.to_string(),
            source_timeout_secs: DEFAULT_SOURCE_TIMEOUT_SECS,
            detail_sample_limit: DEFAULT_DETAIL_SAMPLE_LIMIT,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.link_batch_size, 5_000);
        assert_eq!(config.store_batch_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = SyncConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
