//! VPC endpoint teardown
//!
//! Companion routine to the shutdown sweep: once databases are stopped
//! their network endpoints are torn down, honoring the same tag-based
//! exemption pattern. Cleanup is best-effort by design: one stuck
//! endpoint must not strand the rest.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::exempt::ExemptionPolicy;
use crate::providers::EndpointManager;

/// Counters from one teardown pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EndpointReport {
    pub exempt: usize,
    pub deleted: usize,
    pub failures: usize,
}

/// Deletes non-exempt VPC endpoints.
pub struct EndpointSweep {
    manager: Arc<dyn EndpointManager>,
    exemption: ExemptionPolicy,
}

impl EndpointSweep {
    pub fn new(manager: Arc<dyn EndpointManager>) -> Self {
        Self {
            manager,
            exemption: ExemptionPolicy::for_endpoints(),
        }
    }

    /// Run one teardown pass. Enumeration failure is fatal; individual
    /// deletion failures are logged, counted, and skipped.
    pub async fn run(&self) -> Result<EndpointReport> {
        let endpoints = self
            .manager
            .list_endpoints()
            .await
            .context("failed to enumerate VPC endpoints")?;

        let mut report = EndpointReport::default();
        for endpoint in endpoints {
            if self.exemption.is_exempt(&endpoint.tags) {
                report.exempt += 1;
                continue;
            }
            match self.manager.delete_endpoint(&endpoint.id).await {
                Ok(()) => {
                    report.deleted += 1;
                    info!(endpoint_id = %endpoint.id, "Deleted VPC endpoint");
                }
                Err(err) => {
                    report.failures += 1;
                    warn!(
                        endpoint_id = %endpoint.id,
                        error = %err,
                        "Failed to delete VPC endpoint, continuing"
                    );
                }
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::VpcEndpoint;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeEndpoints {
        endpoints: Vec<VpcEndpoint>,
        fail_ids: Vec<String>,
        deleted: Mutex<Vec<String>>,
    }

    impl FakeEndpoints {
        fn new(endpoints: Vec<VpcEndpoint>) -> Self {
            Self {
                endpoints,
                fail_ids: Vec::new(),
                deleted: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl EndpointManager for FakeEndpoints {
        async fn list_endpoints(&self) -> Result<Vec<VpcEndpoint>> {
            Ok(self.endpoints.clone())
        }

        async fn delete_endpoint(&self, id: &str) -> Result<()> {
            if self.fail_ids.iter().any(|f| f == id) {
                anyhow::bail!("dependency violation");
            }
            self.deleted.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    fn endpoint(id: &str, tags: &[(&str, &str)]) -> VpcEndpoint {
        VpcEndpoint {
            id: id.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_exempt_endpoints_survive() {
        let manager = Arc::new(FakeEndpoints::new(vec![
            endpoint("vpce-1", &[("VPCENDPOINTS_IDLE_EXEMPT", "true")]),
            endpoint("vpce-2", &[]),
        ]));
        let sweep = EndpointSweep::new(manager.clone());

        let report = sweep.run().await.unwrap();
        assert_eq!(report.exempt, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(*manager.deleted.lock().unwrap(), vec!["vpce-2".to_string()]);
    }

    #[tokio::test]
    async fn test_deletion_failure_does_not_abort_the_rest() {
        let mut fake = FakeEndpoints::new(vec![
            endpoint("vpce-1", &[]),
            endpoint("vpce-2", &[]),
            endpoint("vpce-3", &[]),
        ]);
        fake.fail_ids = vec!["vpce-2".to_string()];
        let manager = Arc::new(fake);
        let sweep = EndpointSweep::new(manager.clone());

        let report = sweep.run().await.unwrap();
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failures, 1);
        assert_eq!(
            *manager.deleted.lock().unwrap(),
            vec!["vpce-1".to_string(), "vpce-3".to_string()]
        );
    }
}
