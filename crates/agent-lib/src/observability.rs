//! Observability infrastructure for the idle shutdown agent
//!
//! Provides:
//! - Prometheus metrics for sweep outcomes
//! - A decision audit logger handed to the sweeps, so every verdict is
//!   traceable to an instance and a reason

use prometheus::{register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge};
use std::sync::OnceLock;
use tracing::{error, info, warn};

use crate::models::{Decision, InstanceStatus, SweepReport, Verdict};

/// Histogram buckets for sweep duration (in seconds); sweeps are
/// dominated by network round-trips per instance.
const SWEEP_DURATION_BUCKETS: &[f64] = &[0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SweepMetricsInner> = OnceLock::new();

struct SweepMetricsInner {
    sweeps_total: IntCounter,
    sweep_failures_total: IntCounter,
    sweep_duration_seconds: Histogram,
    instances_scanned: IntGauge,
    instances_exempt: IntGauge,
    instances_stopped_total: IntCounter,
    stop_failures_total: IntCounter,
    probe_failures_total: IntCounter,
    endpoints_deleted_total: IntCounter,
    endpoint_failures_total: IntCounter,
}

impl SweepMetricsInner {
    fn new() -> Self {
        Self {
            sweeps_total: register_int_counter!(
                "idle_shutdown_sweeps_total",
                "Total number of completed shutdown sweeps"
            )
            .expect("Failed to register sweeps_total"),

            sweep_failures_total: register_int_counter!(
                "idle_shutdown_sweep_failures_total",
                "Total number of sweeps that aborted with an error"
            )
            .expect("Failed to register sweep_failures_total"),

            sweep_duration_seconds: register_histogram!(
                "idle_shutdown_sweep_duration_seconds",
                "Wall-clock time of one shutdown sweep",
                SWEEP_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register sweep_duration_seconds"),

            instances_scanned: register_int_gauge!(
                "idle_shutdown_instances_scanned",
                "Instances enumerated by the most recent sweep"
            )
            .expect("Failed to register instances_scanned"),

            instances_exempt: register_int_gauge!(
                "idle_shutdown_instances_exempt",
                "Instances excluded by exemption tags in the most recent sweep"
            )
            .expect("Failed to register instances_exempt"),

            instances_stopped_total: register_int_counter!(
                "idle_shutdown_instances_stopped_total",
                "Total number of instances stopped for idleness"
            )
            .expect("Failed to register instances_stopped_total"),

            stop_failures_total: register_int_counter!(
                "idle_shutdown_stop_failures_total",
                "Total number of stop commands that failed"
            )
            .expect("Failed to register stop_failures_total"),

            probe_failures_total: register_int_counter!(
                "idle_shutdown_probe_failures_total",
                "Total number of indeterminate or failed activity probes"
            )
            .expect("Failed to register probe_failures_total"),

            endpoints_deleted_total: register_int_counter!(
                "idle_shutdown_endpoints_deleted_total",
                "Total number of VPC endpoints torn down"
            )
            .expect("Failed to register endpoints_deleted_total"),

            endpoint_failures_total: register_int_counter!(
                "idle_shutdown_endpoint_failures_total",
                "Total number of VPC endpoint deletions that failed"
            )
            .expect("Failed to register endpoint_failures_total"),
        }
    }
}

/// Sweep metrics for Prometheus exposition.
///
/// This is a lightweight handle to the global metrics instance; clones
/// share the same underlying metrics.
#[derive(Clone)]
pub struct SweepMetrics {
    _private: (),
}

impl Default for SweepMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SweepMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SweepMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SweepMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_sweep_duration(&self, duration_secs: f64) {
        self.inner().sweep_duration_seconds.observe(duration_secs);
    }

    pub fn inc_sweep_failures(&self) {
        self.inner().sweep_failures_total.inc();
    }

    /// Record the counters of one completed sweep.
    pub fn record_sweep(&self, report: &SweepReport) {
        let inner = self.inner();
        inner.sweeps_total.inc();
        inner.instances_scanned.set(report.scanned as i64);
        inner.instances_exempt.set(report.exempt as i64);
        inner.instances_stopped_total.inc_by(report.stopped as u64);
        inner.stop_failures_total.inc_by(report.stop_failures as u64);
        inner.probe_failures_total.inc_by(report.probe_failures as u64);
        inner
            .endpoints_deleted_total
            .inc_by(report.endpoints_deleted as u64);
        inner
            .endpoint_failures_total
            .inc_by(report.endpoint_failures as u64);
    }
}

/// Audit logger for shutdown decisions.
///
/// Injected into the sweeps rather than reached for globally, so
/// components stay testable and every event carries the strategy that
/// produced it.
#[derive(Clone)]
pub struct DecisionLogger {
    strategy: &'static str,
}

impl DecisionLogger {
    pub fn new(strategy: &'static str) -> Self {
        Self { strategy }
    }

    pub fn log_exempt(&self, endpoint: &str) {
        info!(
            event = "instance_exempt",
            strategy = %self.strategy,
            endpoint = %endpoint,
            "Instance is exempt from idle shutdown"
        );
    }

    pub fn log_skipped(&self, endpoint: &str, status: &InstanceStatus) {
        info!(
            event = "instance_skipped",
            strategy = %self.strategy,
            endpoint = %endpoint,
            status = ?status,
            "Instance is not powered on, ignoring"
        );
    }

    pub fn log_decision(&self, endpoint: &str, decision: &Decision) {
        match decision.verdict {
            Verdict::Idle => warn!(
                event = "instance_idle",
                strategy = %self.strategy,
                endpoint = %endpoint,
                reason = %decision.reason,
                "Instance deemed idle"
            ),
            Verdict::NotIdle => info!(
                event = "instance_active",
                strategy = %self.strategy,
                endpoint = %endpoint,
                reason = %decision.reason,
                "Instance not idle, skipping"
            ),
        }
    }

    pub fn log_probe_indeterminate(&self, endpoint: &str, error: &dyn std::fmt::Display) {
        warn!(
            event = "probe_indeterminate",
            strategy = %self.strategy,
            endpoint = %endpoint,
            error = %error,
            "Probe produced no usable sample, treating instance as not idle"
        );
    }

    pub fn log_stop_issued(&self, endpoint: &str, identifier: &str) {
        warn!(
            event = "stop_issued",
            strategy = %self.strategy,
            endpoint = %endpoint,
            identifier = %identifier,
            "Issued shutdown command for idle instance"
        );
    }

    pub fn log_stop_failed(&self, endpoint: &str, identifier: &str, error: &dyn std::fmt::Display) {
        error!(
            event = "stop_failed",
            strategy = %self.strategy,
            endpoint = %endpoint,
            identifier = %identifier,
            error = %error,
            "Failed to stop instance believed idle"
        );
    }

    pub fn log_sweep_complete(&self, report: &SweepReport) {
        info!(
            event = "sweep_complete",
            strategy = %self.strategy,
            scanned = report.scanned,
            exempt = report.exempt,
            skipped = report.skipped_unavailable,
            evaluated = report.evaluated,
            idle = report.idle,
            stopped = report.stopped,
            stop_failures = report.stop_failures,
            probe_failures = report.probe_failures,
            endpoints_deleted = report.endpoints_deleted,
            "Sweep complete"
        );
    }
}
