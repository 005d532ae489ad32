//! AWS-backed collaborators
//!
//! Thin adapters from the collaborator traits onto the RDS, SSM, and
//! EC2 APIs. No decision logic lives here.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;

use super::{ControlPlane, EndpointManager, InstanceInventory, ParameterStore, TagLookup};
use crate::models::{DbInstance, InstanceStatus, VpcEndpoint};

/// RDS client backing both the instance inventory and the control
/// plane; tags come from the same API.
#[derive(Debug, Clone)]
pub struct RdsApi {
    client: aws_sdk_rds::Client,
}

impl RdsApi {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_rds::Client::new(config),
        }
    }
}

#[async_trait]
impl InstanceInventory for RdsApi {
    async fn list_instances(&self) -> Result<Vec<DbInstance>> {
        let mut instances = Vec::new();
        let mut pages = self
            .client
            .describe_db_instances()
            .into_paginator()
            .items()
            .send();

        while let Some(item) = pages.next().await {
            let db = item.context("failed to enumerate database instances")?;
            let (Some(identifier), Some(arn)) = (db.db_instance_identifier(), db.db_instance_arn())
            else {
                continue;
            };
            let endpoint_address = db
                .endpoint()
                .and_then(|e| e.address())
                .unwrap_or_default()
                .to_string();

            instances.push(DbInstance {
                identifier: identifier.to_string(),
                endpoint_address,
                status: InstanceStatus::from_api(db.db_instance_status().unwrap_or_default()),
                resource_id: arn.to_string(),
            });
        }

        Ok(instances)
    }
}

#[async_trait]
impl TagLookup for RdsApi {
    async fn tags(&self, resource_id: &str) -> Result<HashMap<String, String>> {
        let out = self
            .client
            .list_tags_for_resource()
            .resource_name(resource_id)
            .send()
            .await
            .with_context(|| format!("failed to list tags for {resource_id}"))?;

        Ok(out
            .tag_list()
            .iter()
            .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
            .collect())
    }
}

#[async_trait]
impl ControlPlane for RdsApi {
    async fn stop_instance(&self, identifier: &str) -> Result<()> {
        self.client
            .stop_db_instance()
            .db_instance_identifier(identifier)
            .send()
            .await
            .with_context(|| format!("failed to stop instance {identifier}"))?;
        Ok(())
    }
}

/// SSM parameter store adapter.
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: aws_sdk_ssm::Client,
}

impl SsmParameterStore {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn get(&self, path: &str, decrypt: bool) -> Result<Option<String>> {
        match self
            .client
            .get_parameter()
            .name(path)
            .with_decryption(decrypt)
            .send()
            .await
        {
            Ok(out) => Ok(out
                .parameter()
                .and_then(|p| p.value())
                .map(str::to_string)),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_parameter_not_found())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(err) => {
                Err(anyhow::Error::from(err)).with_context(|| format!("failed to read parameter {path}"))
            }
        }
    }

    async fn put(&self, path: &str, value: &str) -> Result<()> {
        self.client
            .put_parameter()
            .name(path)
            .value(value)
            .r#type(aws_sdk_ssm::types::ParameterType::String)
            .overwrite(true)
            .send()
            .await
            .with_context(|| format!("failed to write parameter {path}"))?;
        Ok(())
    }
}

/// EC2 VPC endpoint adapter.
#[derive(Debug, Clone)]
pub struct Ec2EndpointManager {
    client: aws_sdk_ec2::Client,
}

impl Ec2EndpointManager {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(config),
        }
    }
}

#[async_trait]
impl EndpointManager for Ec2EndpointManager {
    async fn list_endpoints(&self) -> Result<Vec<VpcEndpoint>> {
        let mut endpoints = Vec::new();
        let mut pages = self
            .client
            .describe_vpc_endpoints()
            .into_paginator()
            .items()
            .send();

        while let Some(item) = pages.next().await {
            let ep = item.context("failed to enumerate VPC endpoints")?;
            let Some(id) = ep.vpc_endpoint_id() else {
                continue;
            };
            let tags = ep
                .tags()
                .iter()
                .filter_map(|tag| Some((tag.key()?.to_string(), tag.value()?.to_string())))
                .collect();

            endpoints.push(VpcEndpoint {
                id: id.to_string(),
                tags,
            });
        }

        Ok(endpoints)
    }

    async fn delete_endpoint(&self, id: &str) -> Result<()> {
        let out = self
            .client
            .delete_vpc_endpoints()
            .vpc_endpoint_ids(id)
            .send()
            .await
            .with_context(|| format!("failed to delete VPC endpoint {id}"))?;

        if let Some(failure) = out.unsuccessful().first() {
            let message = failure
                .error()
                .and_then(|e| e.message())
                .unwrap_or("unknown error");
            bail!("VPC endpoint {id} deletion rejected: {message}");
        }
        Ok(())
    }
}
