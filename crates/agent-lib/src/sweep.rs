//! The shutdown sweep
//!
//! One run enumerates the instance inventory, filters exempt instances,
//! probes each available candidate over a scoped connection, asks the
//! configured decision engine for a verdict, and stops instances deemed
//! idle. Instances are processed strictly sequentially: the baseline
//! read-modify-write in the parameter store is not atomic, so two
//! evaluations of the same instance must never overlap.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::baseline::BaselineStore;
use crate::decision::{CounterDecision, IdleStrategy, LogDecision};
use crate::endpoints::EndpointSweep;
use crate::exempt::ExemptionPolicy;
use crate::models::{DbInstance, Decision, InstanceStatus, SweepReport};
use crate::observability::{DecisionLogger, SweepMetrics};
use crate::probe::{CounterProbe, DbConnection, LogProbe};
use crate::providers::{
    ConnectionProvider, ControlPlane, EndpointManager, InstanceInventory, ParameterStore,
    TagLookup,
};

/// Default parameter path prefix for credentials and baselines.
pub const DEFAULT_PARAMETER_PREFIX: &str = "/platform/rds-idle-shutdown";

/// When the endpoint teardown pass runs relative to instance
/// processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeardownPolicy {
    /// Never touch VPC endpoints
    Disabled,
    /// Tear down endpoints after at least one instance was stopped
    AfterStop,
    /// Also tear down when instances were found not powered on
    Aggressive,
}

/// Whether a failed stop command ends the sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopFailurePolicy {
    /// Abort the sweep; an instance believed idle that cannot be
    /// stopped is an operational error worth surfacing
    Propagate,
    /// Log, count, and move on to the next candidate
    Continue,
}

/// Sweep tuning and policy knobs.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub strategy: IdleStrategy,
    /// Schema the diagnostics connection opens
    pub database: String,
    /// Prefix under which baselines are stored, keyed by endpoint address
    pub parameter_prefix: String,
    pub username_parameter: String,
    pub password_parameter: String,
    pub wiggle_room: u64,
    pub idle_after_hours: i64,
    pub teardown: TeardownPolicy,
    pub on_stop_failure: StopFailurePolicy,
    /// Evaluate and log decisions without stopping or writing anything
    pub dry_run: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            strategy: IdleStrategy::Log,
            database: "sys".to_string(),
            parameter_prefix: DEFAULT_PARAMETER_PREFIX.to_string(),
            username_parameter: format!("{DEFAULT_PARAMETER_PREFIX}-username"),
            password_parameter: format!("{DEFAULT_PARAMETER_PREFIX}-password"),
            wiggle_room: crate::decision::DEFAULT_WIGGLE_ROOM,
            idle_after_hours: 1,
            teardown: TeardownPolicy::Disabled,
            on_stop_failure: StopFailurePolicy::Propagate,
            dry_run: false,
        }
    }
}

/// The external collaborators a sweep drives.
#[derive(Clone)]
pub struct Collaborators {
    pub inventory: Arc<dyn InstanceInventory>,
    pub tags: Arc<dyn TagLookup>,
    pub params: Arc<dyn ParameterStore>,
    pub connections: Arc<dyn ConnectionProvider>,
    pub control: Arc<dyn ControlPlane>,
    pub endpoints: Option<Arc<dyn EndpointManager>>,
}

/// Orchestrates one idle-shutdown pass over the instance inventory.
pub struct ShutdownSweep {
    collab: Collaborators,
    endpoints: Option<EndpointSweep>,
    config: SweepConfig,
    exemption: ExemptionPolicy,
    log_engine: LogDecision,
    counter_engine: CounterDecision,
    baselines: BaselineStore,
    metrics: SweepMetrics,
    logger: DecisionLogger,
}

impl ShutdownSweep {
    pub fn new(
        collab: Collaborators,
        config: SweepConfig,
        metrics: SweepMetrics,
        logger: DecisionLogger,
    ) -> Self {
        let endpoints = collab.endpoints.clone().map(EndpointSweep::new);
        let baselines = BaselineStore::new(collab.params.clone(), config.parameter_prefix.clone());
        Self {
            exemption: ExemptionPolicy::for_instances(),
            log_engine: LogDecision::new(config.idle_after_hours),
            counter_engine: CounterDecision::new(
                config.wiggle_room,
                chrono::Duration::hours(config.idle_after_hours),
            ),
            endpoints,
            baselines,
            collab,
            config,
            metrics,
            logger,
        }
    }

    /// Run one sweep to completion.
    pub async fn run(&self) -> Result<SweepReport> {
        let start = Instant::now();
        let mut report = SweepReport::default();

        // Fail closed: no action against a possibly-incomplete list.
        let instances = self
            .collab
            .inventory
            .list_instances()
            .await
            .context("failed to enumerate database instances")?;
        report.scanned = instances.len();

        let mut teardown_due = false;
        for instance in &instances {
            self.process_instance(instance, &mut report, &mut teardown_due)
                .await?;
        }

        if teardown_due {
            self.run_teardown(&mut report).await;
        }

        self.metrics.record_sweep(&report);
        self.metrics
            .observe_sweep_duration(start.elapsed().as_secs_f64());
        self.logger.log_sweep_complete(&report);
        Ok(report)
    }

    async fn process_instance(
        &self,
        instance: &DbInstance,
        report: &mut SweepReport,
        teardown_due: &mut bool,
    ) -> Result<()> {
        let tags = match self.collab.tags.tags(&instance.resource_id).await {
            Ok(tags) => tags,
            Err(err) => {
                // Exemption unknown: leave the instance alone rather than
                // risk stopping something that was marked exempt.
                report.tag_failures += 1;
                warn!(
                    endpoint = %instance.endpoint_address,
                    error = %err,
                    "Tag lookup failed, leaving instance untouched"
                );
                return Ok(());
            }
        };

        if self.exemption.is_exempt(&tags) {
            report.exempt += 1;
            self.logger.log_exempt(&instance.endpoint_address);
            return Ok(());
        }

        if instance.status != InstanceStatus::Available {
            report.skipped_unavailable += 1;
            self.logger
                .log_skipped(&instance.endpoint_address, &instance.status);
            if self.config.teardown == TeardownPolicy::Aggressive {
                *teardown_due = true;
            }
            return Ok(());
        }

        let user = self
            .parameter(&self.config.username_parameter, false)
            .await?;
        let password = self
            .parameter(&self.config.password_parameter, true)
            .await?;

        let mut conn = match self
            .collab
            .connections
            .connect(
                &instance.endpoint_address,
                &user,
                &password,
                &self.config.database,
            )
            .await
        {
            Ok(conn) => conn,
            Err(err) => {
                report.probe_failures += 1;
                self.logger
                    .log_probe_indeterminate(&instance.endpoint_address, &err);
                return Ok(());
            }
        };

        // The connection is scoped to this evaluation: closed on every
        // exit path before any control plane action.
        let outcome = self.decide(instance, conn.as_mut(), &user).await;
        if let Err(err) = conn.close().await {
            warn!(
                endpoint = %instance.endpoint_address,
                error = %err,
                "Failed to close diagnostics connection"
            );
        }

        let decision = match outcome {
            Ok(decision) => decision,
            Err(err) => {
                // Never shut down on an ambiguous signal.
                report.probe_failures += 1;
                self.logger
                    .log_probe_indeterminate(&instance.endpoint_address, &err);
                return Ok(());
            }
        };

        report.evaluated += 1;
        self.logger
            .log_decision(&instance.endpoint_address, &decision);
        if !decision.is_idle() {
            return Ok(());
        }
        report.idle += 1;

        if self.config.dry_run {
            info!(
                endpoint = %instance.endpoint_address,
                identifier = %instance.identifier,
                "Dry run: would stop instance"
            );
            return Ok(());
        }

        match self.collab.control.stop_instance(&instance.identifier).await {
            Ok(()) => {
                report.stopped += 1;
                self.logger
                    .log_stop_issued(&instance.endpoint_address, &instance.identifier);
                if matches!(
                    self.config.teardown,
                    TeardownPolicy::AfterStop | TeardownPolicy::Aggressive
                ) {
                    *teardown_due = true;
                }
            }
            Err(err) => {
                report.stop_failures += 1;
                self.logger
                    .log_stop_failed(&instance.endpoint_address, &instance.identifier, &err);
                if self.config.on_stop_failure == StopFailurePolicy::Propagate {
                    return Err(err.context(format!(
                        "failed to stop idle instance {}",
                        instance.identifier
                    )));
                }
            }
        }
        Ok(())
    }

    /// Probe and decide for one available, non-exempt instance.
    async fn decide(
        &self,
        instance: &DbInstance,
        conn: &mut dyn DbConnection,
        monitor_user: &str,
    ) -> Result<Decision> {
        match self.config.strategy {
            IdleStrategy::Log => {
                let sample = LogProbe::new(monitor_user).sample(conn).await?;
                Ok(self.log_engine.decide(&sample))
            }
            IdleStrategy::Counter => {
                let now = Utc::now();
                let baseline = self
                    .baselines
                    .load_or_init(&instance.endpoint_address, now)
                    .await;
                let sample = CounterProbe.sample(conn).await?;
                let (decision, refreshed) = self.counter_engine.decide(&sample, &baseline, now);

                // Written regardless of verdict so the comparison window
                // slides forward with every check.
                if self.config.dry_run {
                    debug!(
                        endpoint = %instance.endpoint_address,
                        "Dry run: not persisting refreshed baseline"
                    );
                } else if let Err(err) = self
                    .baselines
                    .save(&instance.endpoint_address, &refreshed)
                    .await
                {
                    warn!(
                        endpoint = %instance.endpoint_address,
                        error = %err,
                        "Failed to persist refreshed baseline"
                    );
                }
                Ok(decision)
            }
        }
    }

    async fn run_teardown(&self, report: &mut SweepReport) {
        let Some(endpoint_sweep) = &self.endpoints else {
            return;
        };
        if self.config.dry_run {
            info!("Dry run: skipping endpoint teardown");
            return;
        }
        match endpoint_sweep.run().await {
            Ok(ep_report) => {
                report.endpoints_deleted = ep_report.deleted;
                report.endpoint_failures = ep_report.failures;
            }
            Err(err) => {
                warn!(error = %err, "Endpoint teardown pass failed");
            }
        }
    }

    async fn parameter(&self, path: &str, decrypt: bool) -> Result<String> {
        self.collab
            .params
            .get(path, decrypt)
            .await?
            .with_context(|| format!("required parameter {path} is missing"))
    }
}
