//! Activity probes over a live database connection
//!
//! The probes issue read-only diagnostic queries through the
//! [`DbConnection`] contract and assemble strategy-specific samples. A
//! missing or malformed status result surfaces as
//! [`ProbeError::Indeterminate`] so the caller can fail safe instead of
//! mistaking a broken read for idleness.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{CounterSample, LogSample, Uptime};

/// Administrative account whose activity never counts as client traffic.
pub const ADMIN_USER: &str = "rdsadmin";

/// Why a probe could not produce a sample.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The diagnostic query could not be executed at all.
    #[error("diagnostic query failed: {0}")]
    Query(anyhow::Error),
    /// The server answered, but without the expected row or value.
    #[error("indeterminate diagnostic result: {0}")]
    Indeterminate(String),
}

/// Connection contract sufficient for the diagnostic probe queries.
///
/// Implementations are scoped resources: the sweep closes them on every
/// exit path of an evaluation.
#[async_trait]
pub trait DbConnection: Send {
    /// Timestamp of the most recent audit-log entry from any client
    /// other than the given accounts, or `None` when no qualifying
    /// entry exists.
    async fn latest_client_event(
        &mut self,
        excluded_users: &[&str],
    ) -> Result<Option<DateTime<Utc>>>;

    /// The database server's own current time.
    async fn server_now(&mut self) -> Result<DateTime<Utc>>;

    /// Server uptime from its status variables, or `None` if the server
    /// did not report it.
    async fn uptime(&mut self) -> Result<Option<Uptime>>;

    /// Cumulative read-query counter, or `None` if the server did not
    /// report it.
    async fn select_count(&mut self) -> Result<Option<u64>>;

    /// Close the connection.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Samples the audit log for the log-based strategy.
#[derive(Debug, Clone)]
pub struct LogProbe {
    /// This agent's own monitoring account, excluded from the activity
    /// scan along with the administrative account
    monitor_user: String,
}

impl LogProbe {
    pub fn new(monitor_user: impl Into<String>) -> Self {
        Self {
            monitor_user: monitor_user.into(),
        }
    }

    pub async fn sample(&self, conn: &mut dyn DbConnection) -> Result<LogSample, ProbeError> {
        let last_activity = conn
            .latest_client_event(&[ADMIN_USER, self.monitor_user.as_str()])
            .await
            .map_err(ProbeError::Query)?;
        let server_now = conn.server_now().await.map_err(ProbeError::Query)?;
        let uptime = conn
            .uptime()
            .await
            .map_err(ProbeError::Query)?
            .ok_or_else(|| ProbeError::Indeterminate("server did not report uptime".into()))?;

        Ok(LogSample {
            last_activity,
            server_now,
            uptime,
        })
    }
}

/// Samples the read-query counter for the counter-based strategy.
#[derive(Debug, Clone, Default)]
pub struct CounterProbe;

impl CounterProbe {
    pub async fn sample(&self, conn: &mut dyn DbConnection) -> Result<CounterSample, ProbeError> {
        let select_count = conn
            .select_count()
            .await
            .map_err(ProbeError::Query)?
            .ok_or_else(|| {
                ProbeError::Indeterminate("server did not report the Com_select counter".into())
            })?;
        let uptime = conn
            .uptime()
            .await
            .map_err(ProbeError::Query)?
            .ok_or_else(|| ProbeError::Indeterminate("server did not report uptime".into()))?;

        Ok(CounterSample {
            select_count,
            uptime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FakeConnection {
        last_event: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        uptime: Option<Uptime>,
        select_count: Option<u64>,
        fail_queries: bool,
        seen_exclusions: Vec<String>,
    }

    impl FakeConnection {
        fn healthy() -> Self {
            Self {
                last_event: Some(Utc::now()),
                now: Utc::now(),
                uptime: Some(Uptime {
                    hours: 3,
                    minutes: 20,
                }),
                select_count: Some(500),
                fail_queries: false,
                seen_exclusions: Vec::new(),
            }
        }
    }

    #[async_trait]
    impl DbConnection for FakeConnection {
        async fn latest_client_event(
            &mut self,
            excluded_users: &[&str],
        ) -> Result<Option<DateTime<Utc>>> {
            if self.fail_queries {
                return Err(anyhow!("connection reset"));
            }
            self.seen_exclusions = excluded_users.iter().map(|u| u.to_string()).collect();
            Ok(self.last_event)
        }

        async fn server_now(&mut self) -> Result<DateTime<Utc>> {
            Ok(self.now)
        }

        async fn uptime(&mut self) -> Result<Option<Uptime>> {
            if self.fail_queries {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.uptime)
        }

        async fn select_count(&mut self) -> Result<Option<u64>> {
            Ok(self.select_count)
        }

        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_log_probe_excludes_admin_and_monitor_accounts() {
        let mut conn = FakeConnection::healthy();
        let probe = LogProbe::new("shutdown_monitor");

        probe.sample(&mut conn).await.unwrap();
        assert_eq!(conn.seen_exclusions, vec!["rdsadmin", "shutdown_monitor"]);
    }

    #[tokio::test]
    async fn test_log_probe_passes_through_empty_log() {
        let mut conn = FakeConnection::healthy();
        conn.last_event = None;

        let sample = LogProbe::new("monitor").sample(&mut conn).await.unwrap();
        // An empty audit log is a valid observation, not a probe failure.
        assert!(sample.last_activity.is_none());
    }

    #[tokio::test]
    async fn test_missing_uptime_is_indeterminate() {
        let mut conn = FakeConnection::healthy();
        conn.uptime = None;

        let err = LogProbe::new("monitor").sample(&mut conn).await.unwrap_err();
        assert!(matches!(err, ProbeError::Indeterminate(_)));
    }

    #[tokio::test]
    async fn test_missing_counter_is_indeterminate() {
        let mut conn = FakeConnection::healthy();
        conn.select_count = None;

        let err = CounterProbe.sample(&mut conn).await.unwrap_err();
        assert!(matches!(err, ProbeError::Indeterminate(_)));
    }

    #[tokio::test]
    async fn test_query_failure_is_surfaced() {
        let mut conn = FakeConnection::healthy();
        conn.fail_queries = true;

        let err = LogProbe::new("monitor").sample(&mut conn).await.unwrap_err();
        assert!(matches!(err, ProbeError::Query(_)));
    }

    #[tokio::test]
    async fn test_counter_probe_sample() {
        let mut conn = FakeConnection::healthy();
        let sample = CounterProbe.sample(&mut conn).await.unwrap();
        assert_eq!(sample.select_count, 500);
        assert_eq!(sample.uptime.hours, 3);
    }
}
