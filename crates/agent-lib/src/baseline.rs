//! Baseline persistence for the counter strategy
//!
//! The baseline lives in the external parameter store, one parameter
//! per instance endpoint address, as a small JSON document. It is owned
//! by the counter decision engine; everything here is plumbing between
//! that engine and the store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::models::Baseline;
use crate::providers::ParameterStore;

/// Reads and writes per-instance baselines under a parameter path
/// prefix.
#[derive(Clone)]
pub struct BaselineStore {
    params: Arc<dyn ParameterStore>,
    prefix: String,
}

impl BaselineStore {
    pub fn new(params: Arc<dyn ParameterStore>, prefix: impl Into<String>) -> Self {
        Self {
            params,
            prefix: prefix.into(),
        }
    }

    fn path_for(&self, endpoint_address: &str) -> String {
        format!("{}-{}", self.prefix, endpoint_address)
    }

    /// Load the baseline for an instance.
    ///
    /// A missing or unreadable parameter is not an error: it means this
    /// is the first check for the instance (or the stored value was
    /// damaged), and the conservative initial baseline guarantees a
    /// not-idle verdict for this invocation.
    pub async fn load_or_init(&self, endpoint_address: &str, now: DateTime<Utc>) -> Baseline {
        let path = self.path_for(endpoint_address);
        match self.params.get(&path, false).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(baseline) => baseline,
                Err(err) => {
                    warn!(
                        endpoint = %endpoint_address,
                        path = %path,
                        error = %err,
                        "Stored baseline did not parse, starting over"
                    );
                    Baseline::initial(now)
                }
            },
            Ok(None) => {
                warn!(
                    endpoint = %endpoint_address,
                    path = %path,
                    "No stored baseline found, treating as a new instance"
                );
                Baseline::initial(now)
            }
            Err(err) => {
                warn!(
                    endpoint = %endpoint_address,
                    path = %path,
                    error = %err,
                    "Could not read stored baseline, treating as a new instance"
                );
                Baseline::initial(now)
            }
        }
    }

    pub async fn save(&self, endpoint_address: &str, baseline: &Baseline) -> Result<()> {
        let path = self.path_for(endpoint_address);
        let value = serde_json::to_string(baseline).context("failed to encode baseline")?;
        self.params
            .put(&path, &value)
            .await
            .with_context(|| format!("failed to persist baseline to {path}"))?;
        debug!(endpoint = %endpoint_address, path = %path, "Wrote refreshed baseline");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryParams {
        values: Mutex<HashMap<String, String>>,
        fail_reads: bool,
    }

    #[async_trait]
    impl ParameterStore for MemoryParams {
        async fn get(&self, path: &str, _decrypt: bool) -> Result<Option<String>> {
            if self.fail_reads {
                anyhow::bail!("store unavailable");
            }
            Ok(self.values.lock().unwrap().get(path).cloned())
        }

        async fn put(&self, path: &str, value: &str) -> Result<()> {
            self.values
                .lock()
                .unwrap()
                .insert(path.to_string(), value.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_missing_baseline_initializes_conservatively() {
        let store = BaselineStore::new(
            Arc::new(MemoryParams::default()),
            "/platform/rds-idle-shutdown",
        );
        let now = Utc::now();

        let baseline = store.load_or_init("db.example.internal", now).await;
        assert_eq!(baseline.select_count, 0);
        assert_eq!(baseline.timestamp, now);
    }

    #[tokio::test]
    async fn test_roundtrip_under_endpoint_keyed_path() {
        let params = Arc::new(MemoryParams::default());
        let store = BaselineStore::new(params.clone(), "/platform/rds-idle-shutdown");
        let now = Utc::now();
        let baseline = Baseline {
            select_count: 560,
            timestamp: now,
        };

        store.save("db.example.internal", &baseline).await.unwrap();
        assert!(params
            .values
            .lock()
            .unwrap()
            .contains_key("/platform/rds-idle-shutdown-db.example.internal"));

        let loaded = store.load_or_init("db.example.internal", Utc::now()).await;
        assert_eq!(loaded, baseline);
    }

    #[tokio::test]
    async fn test_corrupt_baseline_starts_over() {
        let params = Arc::new(MemoryParams::default());
        params
            .put("/platform/rds-idle-shutdown-db.example.internal", "not json")
            .await
            .unwrap();
        let store = BaselineStore::new(params, "/platform/rds-idle-shutdown");

        let now = Utc::now();
        let baseline = store.load_or_init("db.example.internal", now).await;
        assert_eq!(baseline, Baseline::initial(now));
    }

    #[tokio::test]
    async fn test_store_read_failure_starts_over() {
        let params = Arc::new(MemoryParams {
            fail_reads: true,
            ..MemoryParams::default()
        });
        let store = BaselineStore::new(params, "/platform/rds-idle-shutdown");

        let now = Utc::now();
        let baseline = store.load_or_init("db.example.internal", now).await;
        assert_eq!(baseline, Baseline::initial(now));
    }
}
