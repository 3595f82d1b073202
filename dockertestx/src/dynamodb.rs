//! DynamoDB Local container with a connected client, plus table and item
//! helpers.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::config::Credentials;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, KeySchemaElement, ProvisionedThroughput
};
use errors::{DockerTestError, FixtureError};
use std::collections::HashMap;
use testcontainers::core::ContainerPort;

pub use aws_sdk_dynamodb::types::{KeyType, ScalarAttributeType};

pub const DEFAULT_DYNAMODB_IMAGE: &str = "amazon/dynamodb-local";
pub const DEFAULT_DYNAMODB_TAG: &str = "latest";
pub const DYNAMODB_PORT: ContainerPort = ContainerPort::Tcp(8000);

const REGION: &str = "us-east-1";
const READ_CAPACITY_UNITS: i64 = 5;
const WRITE_CAPACITY_UNITS: i64 = 5;

/// An item as written by `PutItem`.
pub type Item = HashMap<String, AttributeValue>;

#[async_trait]
impl Teardown for Client {
    async fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

pub fn dynamodb_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_DYNAMODB_IMAGE, DEFAULT_DYNAMODB_TAG);
    opts.exposed_ports = vec![DYNAMODB_PORT];
    opts
}

pub async fn run_dynamodb() -> Result<Fixture<Client>, DockerTestError> {
    run_dynamodb_with_options(Vec::new(), Vec::new()).await
}

/// Start DynamoDB Local. The emulator accepts any credentials, so the client
/// signs with placeholders. Ready once `ListTables` answers.
pub async fn run_dynamodb_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<Client>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(dynamodb_defaults(), run_opts);
    let resource = pool
        .run_with_options("dynamodb", opts, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(DYNAMODB_PORT).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    let endpoint = format!("http://{}", host_port);
    tracing::info!("DynamoDB Local container is running, endpoint {}", endpoint);

    let client = dynamodb_client(&endpoint).await;
    let probe = &client;
    match pool
        .retry("dynamodb", || async move {
            probe
                .list_tables()
                .limit(1)
                .send()
                .await
                .map_err(|e| DisplayErrorContext(e).to_string())
        })
        .await
    {
        Ok(_) => Ok(Fixture::new(client, resource)),
        Err(e) => {
            resource.discard().await;
            Err(e)
        }
    }
}

pub async fn dynamodb_client(endpoint: &str) -> Client {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(REGION))
        .credentials_provider(Credentials::new(
            "dummy",
            "dummy",
            Some("dummy".to_string()),
            None,
            "dockertestx"
        ))
        .endpoint_url(endpoint)
        .load()
        .await;
    Client::new(&sdk_config)
}

fn request_failed(operation: String, reason: String) -> FixtureError {
    FixtureError::RequestFailed {
        backend: "DynamoDB".to_string(),
        operation,
        reason
    }
}

/// Create a table with provisioned throughput of 5/5.
///
/// Nothing happens if a table with that name already exists.
pub async fn create_table(
    client: &Client,
    table: &str,
    key_schema: Vec<KeySchemaElement>,
    attributes: Vec<AttributeDefinition>,
) -> Result<(), FixtureError> {
    let existing = client
        .list_tables()
        .send()
        .await
        .map_err(|e| request_failed("ListTables".to_string(), DisplayErrorContext(e).to_string()))?;
    if existing.table_names().iter().any(|name| name == table) {
        tracing::debug!("Table {} already exists", table);
        return Ok(());
    }

    let throughput = ProvisionedThroughput::builder()
        .read_capacity_units(READ_CAPACITY_UNITS)
        .write_capacity_units(WRITE_CAPACITY_UNITS)
        .build()
        .map_err(|e| request_failed(format!("CreateTable {}", table), e.to_string()))?;

    client
        .create_table()
        .table_name(table)
        .set_key_schema(Some(key_schema))
        .set_attribute_definitions(Some(attributes))
        .provisioned_throughput(throughput)
        .send()
        .await
        .map_err(|e| {
            request_failed(format!("CreateTable {}", table), DisplayErrorContext(e).to_string())
        })?;
    tracing::debug!("Created table {}", table);
    Ok(())
}

/// Single-attribute hash key definition, the common case for fixtures.
pub fn hash_key(
    name: &str,
    attribute_type: ScalarAttributeType,
) -> Result<(Vec<KeySchemaElement>, Vec<AttributeDefinition>), FixtureError> {
    let attribute = AttributeDefinition::builder()
        .attribute_name(name)
        .attribute_type(attribute_type)
        .build()
        .map_err(|e| request_failed(format!("define key {}", name), e.to_string()))?;
    let key = KeySchemaElement::builder()
        .attribute_name(name)
        .key_type(KeyType::Hash)
        .build()
        .map_err(|e| request_failed(format!("define key {}", name), e.to_string()))?;
    Ok((vec![key], vec![attribute]))
}

/// `PutItem` each item in order. The error names the index of the item
/// that failed.
pub async fn prep_items(client: &Client, table: &str, items: Vec<Item>) -> Result<(), FixtureError> {
    for (index, item) in items.into_iter().enumerate() {
        client
            .put_item()
            .table_name(table)
            .set_item(Some(item))
            .send()
            .await
            .map_err(|e| FixtureError::WriteFailed {
                backend: "DynamoDB".to_string(),
                target: format!("item {} into table {}", index, table),
                reason: DisplayErrorContext(e).to_string()
            })?;
    }
    Ok(())
}

pub async fn delete_table(client: &Client, table: &str) -> Result<(), FixtureError> {
    client
        .delete_table()
        .table_name(table)
        .send()
        .await
        .map_err(|e| {
            request_failed(format!("DeleteTable {}", table), DisplayErrorContext(e).to_string())
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dynamodb_defaults() {
        let opts = dynamodb_defaults();
        assert_eq!(opts.image_ref(), "amazon/dynamodb-local:latest");
        assert_eq!(opts.exposed_ports, vec![DYNAMODB_PORT]);
        assert!(opts.env.is_empty());
    }

    #[test]
    fn test_hash_key_definition() {
        let (keys, attributes) = hash_key("id", ScalarAttributeType::S).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].attribute_name(), "id");
        assert_eq!(attributes[0].attribute_type(), &ScalarAttributeType::S);
        assert_eq!(keys[0].attribute_name(), "id");
        assert_eq!(keys[0].key_type(), &KeyType::Hash);
    }
}
