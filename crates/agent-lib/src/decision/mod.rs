//! Idle decision engines
//!
//! This module provides the two idle-detection strategies:
//! - Log-based (most recent audit log activity vs. server uptime)
//! - Counter-based (read-query counter growth vs. a persisted baseline)
//!
//! Both are pure: they consume probe samples and produce verdicts, so a
//! deployment picks one per configuration and the sweep drives it.

mod counter;
mod log_based;

pub use counter::{CounterDecision, DEFAULT_WIGGLE_ROOM};
pub use log_based::LogDecision;

use serde::Deserialize;

/// Which idle-detection strategy a deployment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdleStrategy {
    /// Inspect the query audit log for recent client activity
    Log,
    /// Track the cumulative read-query counter across invocations
    Counter,
}

impl IdleStrategy {
    pub fn label(&self) -> &'static str {
        match self {
            IdleStrategy::Log => "log",
            IdleStrategy::Counter => "counter",
        }
    }
}
