//! Agent configuration

use anyhow::{Context, Result};
use idle_shutdown_lib::decision::IdleStrategy;
use idle_shutdown_lib::sweep::{
    StopFailurePolicy, SweepConfig, TeardownPolicy, DEFAULT_PARAMETER_PREFIX,
};
use serde::Deserialize;

/// Agent configuration, sourced from `IDLE_SHUTDOWN_*` environment
/// variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Idle-detection strategy to run
    #[serde(default = "default_strategy")]
    pub strategy: IdleStrategy,

    /// Seconds between sweeps
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Schema the diagnostics connection opens
    #[serde(default = "default_database")]
    pub database: String,

    /// Parameter path prefix for credentials and baselines
    #[serde(default = "default_parameter_prefix")]
    pub parameter_prefix: String,

    /// Override for the monitoring username parameter path
    #[serde(default)]
    pub username_parameter: Option<String>,

    /// Override for the monitoring password parameter path
    #[serde(default)]
    pub password_parameter: Option<String>,

    /// Counter tolerance for the counter strategy
    #[serde(default = "default_wiggle_room")]
    pub wiggle_room: u64,

    /// Hours without activity before an instance counts as idle
    #[serde(default = "default_idle_after_hours")]
    pub idle_after_hours: i64,

    /// VPC endpoint teardown policy
    #[serde(default = "default_teardown")]
    pub teardown: TeardownPolicy,

    /// Whether a failed stop command aborts the sweep
    #[serde(default = "default_on_stop_failure")]
    pub on_stop_failure: StopFailurePolicy,
}

fn default_strategy() -> IdleStrategy {
    IdleStrategy::Log
}

fn default_check_interval() -> u64 {
    900
}

fn default_api_port() -> u16 {
    8080
}

fn default_database() -> String {
    "sys".to_string()
}

fn default_parameter_prefix() -> String {
    DEFAULT_PARAMETER_PREFIX.to_string()
}

fn default_wiggle_room() -> u64 {
    idle_shutdown_lib::decision::DEFAULT_WIGGLE_ROOM
}

fn default_idle_after_hours() -> i64 {
    1
}

fn default_teardown() -> TeardownPolicy {
    TeardownPolicy::Disabled
}

fn default_on_stop_failure() -> StopFailurePolicy {
    StopFailurePolicy::Propagate
}

impl AgentConfig {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("IDLE_SHUTDOWN"))
            .build()
            .context("failed to read environment configuration")?;

        config
            .try_deserialize()
            .context("invalid agent configuration")
    }

    /// Resolve the sweep configuration, deriving the credential
    /// parameter paths from the prefix unless explicitly overridden.
    pub fn sweep_config(&self, dry_run: bool) -> SweepConfig {
        SweepConfig {
            strategy: self.strategy,
            database: self.database.clone(),
            parameter_prefix: self.parameter_prefix.clone(),
            username_parameter: self
                .username_parameter
                .clone()
                .unwrap_or_else(|| format!("{}-username", self.parameter_prefix)),
            password_parameter: self
                .password_parameter
                .clone()
                .unwrap_or_else(|| format!("{}-password", self.parameter_prefix)),
            wiggle_room: self.wiggle_room,
            idle_after_hours: self.idle_after_hours,
            teardown: self.teardown,
            on_stop_failure: self.on_stop_failure,
            dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_config() -> AgentConfig {
        AgentConfig {
            strategy: default_strategy(),
            check_interval_secs: default_check_interval(),
            api_port: default_api_port(),
            database: default_database(),
            parameter_prefix: default_parameter_prefix(),
            username_parameter: None,
            password_parameter: None,
            wiggle_room: default_wiggle_room(),
            idle_after_hours: default_idle_after_hours(),
            teardown: default_teardown(),
            on_stop_failure: default_on_stop_failure(),
        }
    }

    #[test]
    fn test_credential_paths_derive_from_prefix() {
        let mut config = bare_config();
        config.parameter_prefix = "/teams/data/idle".to_string();

        let sweep = config.sweep_config(false);
        assert_eq!(sweep.username_parameter, "/teams/data/idle-username");
        assert_eq!(sweep.password_parameter, "/teams/data/idle-password");
    }

    #[test]
    fn test_explicit_credential_paths_win() {
        let mut config = bare_config();
        config.username_parameter = Some("/secrets/monitor-user".to_string());

        let sweep = config.sweep_config(false);
        assert_eq!(sweep.username_parameter, "/secrets/monitor-user");
        assert_eq!(
            sweep.password_parameter,
            format!("{DEFAULT_PARAMETER_PREFIX}-password")
        );
    }

    #[test]
    fn test_dry_run_flows_through() {
        let config = bare_config();
        assert!(config.sweep_config(true).dry_run);
        assert!(!config.sweep_config(false).dry_run);
    }
}
