//! Idle shutdown library
//!
//! This crate provides the core functionality for:
//! - Tag-based exemption checks
//! - Activity probes against managed MySQL servers
//! - Log- and counter-based idle decision engines
//! - The shutdown sweep and VPC endpoint teardown
//! - Observability (Prometheus metrics + decision audit logging)

pub mod baseline;
pub mod decision;
pub mod endpoints;
pub mod exempt;
pub mod models;
pub mod observability;
pub mod probe;
pub mod providers;
pub mod sweep;

pub use decision::{CounterDecision, IdleStrategy, LogDecision};
pub use exempt::ExemptionPolicy;
pub use models::*;
pub use observability::{DecisionLogger, SweepMetrics};
pub use sweep::{Collaborators, ShutdownSweep, StopFailurePolicy, SweepConfig, TeardownPolicy};
