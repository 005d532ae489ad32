//! Core data models for the idle shutdown agent

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Power state of a managed database instance.
///
/// Only `Available` instances are probed; everything else is in some
/// transitional or stopped state and is left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Available,
    Stopped,
    Other(String),
}

impl InstanceStatus {
    /// Map the control plane's status string onto the power states the
    /// sweep cares about.
    pub fn from_api(status: &str) -> Self {
        match status {
            "available" => InstanceStatus::Available,
            "stopped" => InstanceStatus::Stopped,
            other => InstanceStatus::Other(other.to_string()),
        }
    }
}

/// One managed database instance, read fresh from the inventory on every
/// sweep and discarded at the end of it.
#[derive(Debug, Clone)]
pub struct DbInstance {
    /// Unique key for stop/start operations
    pub identifier: String,
    /// Network address; also the key for persisted baseline state
    pub endpoint_address: String,
    pub status: InstanceStatus,
    /// Resource identifier (ARN) used to look up attached tags
    pub resource_id: String,
}

/// Server uptime as reported by the database's own status variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Uptime {
    pub hours: u64,
    pub minutes: u64,
}

impl Uptime {
    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            hours: seconds / 3600,
            minutes: (seconds % 3600) / 60,
        }
    }

    pub fn as_duration(&self) -> Duration {
        Duration::hours(self.hours as i64) + Duration::minutes(self.minutes as i64)
    }
}

/// Probe output for the log-based strategy.
///
/// `server_now` is the database server's own clock, so elapsed-time math
/// is immune to skew between the agent host and the server.
#[derive(Debug, Clone)]
pub struct LogSample {
    /// Most recent non-administrative audit log entry; `None` when the
    /// log holds no qualifying row at all
    pub last_activity: Option<DateTime<Utc>>,
    pub server_now: DateTime<Utc>,
    pub uptime: Uptime,
}

/// Probe output for the counter-based strategy.
#[derive(Debug, Clone)]
pub struct CounterSample {
    /// Cumulative read-query counter; monotonically non-decreasing
    /// absent a restart
    pub select_count: u64,
    pub uptime: Uptime,
}

/// Persisted counter snapshot from the previous evaluation.
///
/// `select_count` already includes the configured tolerance, folded in
/// when the baseline was written. Overwritten after every evaluation so
/// the comparison window slides forward with each check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub select_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl Baseline {
    /// Conservative default for an instance seen for the first time; the
    /// first evaluation against it always comes out not idle.
    pub fn initial(now: DateTime<Utc>) -> Self {
        Self {
            select_count: 0,
            timestamp: now,
        }
    }
}

/// Idle verdict for one instance on one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Idle,
    NotIdle,
}

/// Outcome of one idle evaluation, with the reasoning kept for the
/// decision audit log.
#[derive(Debug, Clone)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: String,
}

impl Decision {
    pub fn idle(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Idle,
            reason: reason.into(),
        }
    }

    pub fn not_idle(reason: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::NotIdle,
            reason: reason.into(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.verdict == Verdict::Idle
    }
}

/// A VPC endpoint eligible for teardown.
#[derive(Debug, Clone)]
pub struct VpcEndpoint {
    pub id: String,
    pub tags: HashMap<String, String>,
}

/// Counters accumulated over one shutdown sweep.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub exempt: usize,
    pub skipped_unavailable: usize,
    pub evaluated: usize,
    pub idle: usize,
    pub stopped: usize,
    pub stop_failures: usize,
    pub probe_failures: usize,
    pub tag_failures: usize,
    pub endpoints_deleted: usize,
    pub endpoint_failures: usize,
}

impl SweepReport {
    /// One-line human summary for the terminal status message.
    pub fn summary(&self) -> String {
        format!(
            "scanned {} instances: {} exempt, {} not running, {} evaluated, {} idle, {} stopped \
             ({} stop failures, {} probe failures, {} endpoints deleted)",
            self.scanned,
            self.exempt,
            self.skipped_unavailable,
            self.evaluated,
            self.idle,
            self.stopped,
            self.stop_failures,
            self.probe_failures,
            self.endpoints_deleted,
        )
    }
}
