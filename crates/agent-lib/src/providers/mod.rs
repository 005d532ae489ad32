//! External collaborator contracts
//!
//! The sweeps consume cloud inventory, tags, parameters, database
//! connections, and control actions through these traits, so the
//! decision logic stays independently testable with in-memory fakes.
//! The AWS- and MySQL-backed implementations live in the submodules.

mod aws;
mod mysql;

pub use aws::{Ec2EndpointManager, RdsApi, SsmParameterStore};
pub use mysql::MySqlConnector;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use crate::models::{DbInstance, VpcEndpoint};
use crate::probe::DbConnection;

/// Paged database instance inventory.
#[async_trait]
pub trait InstanceInventory: Send + Sync {
    /// Full inventory for this sweep. Failure here is fatal for the
    /// invocation: the sweep never acts on a possibly-incomplete list.
    async fn list_instances(&self) -> Result<Vec<DbInstance>>;
}

/// Tags attached to a cloud resource.
#[async_trait]
pub trait TagLookup: Send + Sync {
    async fn tags(&self, resource_id: &str) -> Result<HashMap<String, String>>;
}

/// Key/value parameter store holding credentials (read-only) and
/// counter baselines (read-write).
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// Read a parameter; `None` when the path does not exist.
    async fn get(&self, path: &str, decrypt: bool) -> Result<Option<String>>;

    async fn put(&self, path: &str, value: &str) -> Result<()>;
}

/// Opens diagnostic connections to managed database servers.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        user: &str,
        password: &str,
        database: &str,
    ) -> Result<Box<dyn DbConnection>>;
}

/// Instance power control.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn stop_instance(&self, identifier: &str) -> Result<()>;
}

/// VPC endpoint enumeration and teardown.
#[async_trait]
pub trait EndpointManager: Send + Sync {
    async fn list_endpoints(&self) -> Result<Vec<VpcEndpoint>>;

    async fn delete_endpoint(&self, id: &str) -> Result<()>;
}
