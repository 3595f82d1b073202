//! MinIO container with an S3 client, plus bucket and object helpers.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::config::Credentials;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use errors::{DockerTestError, FixtureError};
use std::collections::HashMap;
use testcontainers::core::ContainerPort;

pub const DEFAULT_MINIO_IMAGE: &str = "minio/minio";
pub const DEFAULT_MINIO_TAG: &str = "latest";
pub const DEFAULT_ACCESS_KEY: &str = "minioadmin";
pub const DEFAULT_SECRET_KEY: &str = "minioadmin";
pub const DEFAULT_REGION: &str = "us-east-1";
pub const MINIO_PORT: ContainerPort = ContainerPort::Tcp(9000);

#[async_trait]
impl Teardown for Client {
    async fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

/// `minio/minio:latest` running `server /data` with the stock root account.
pub fn minio_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_MINIO_IMAGE, DEFAULT_MINIO_TAG);
    opts.env = vec![
        format!("MINIO_ROOT_USER={}", DEFAULT_ACCESS_KEY),
        format!("MINIO_ROOT_PASSWORD={}", DEFAULT_SECRET_KEY),
    ];
    opts.cmd = vec!["server".to_string(), "/data".to_string()];
    opts.exposed_ports = vec![MINIO_PORT];
    opts
}

pub async fn run_minio() -> Result<Fixture<Client>, DockerTestError> {
    run_minio_with_options(Vec::new(), Vec::new()).await
}

/// Start MinIO and return a path-style S3 client signed with the root
/// credentials from the final environment. Ready once `ListBuckets` works.
pub async fn run_minio_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<Client>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(minio_defaults(), run_opts);
    let access_key = opts.env_value("MINIO_ROOT_USER").to_string();
    let secret_key = opts.env_value("MINIO_ROOT_PASSWORD").to_string();

    let resource = pool
        .run_with_options("minio", opts, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(MINIO_PORT).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    let endpoint = format!("http://{}", host_port);
    tracing::info!("MinIO container is running, endpoint {}", endpoint);

    let client = s3_client(&endpoint, &access_key, &secret_key).await;
    let probe = &client;
    match pool
        .retry("minio", || async move {
            probe
                .list_buckets()
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

/// Path-style S3 client for `endpoint`.
pub async fn s3_client(endpoint: &str, access_key: &str, secret_key: &str) -> Client {
    let sdk_config = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(DEFAULT_REGION))
        .credentials_provider(Credentials::new(
            access_key,
            secret_key,
            None,
            None,
            "dockertestx"
        ))
        .endpoint_url(endpoint)
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

/// Create `bucket` unless it already exists.
pub async fn prep_bucket(client: &Client, bucket: &str) -> Result<(), FixtureError> {
    if client.head_bucket().bucket(bucket).send().await.is_ok() {
        return Ok(());
    }

    client
        .create_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| FixtureError::RequestFailed {
            backend: "S3".to_string(),
            operation: format!("CreateBucket {}", bucket),
            reason: DisplayErrorContext(e).to_string()
        })?;
    tracing::debug!("Created bucket {}", bucket);
    Ok(())
}

pub async fn upload_object(
    client: &Client,
    bucket: &str,
    key: &str,
    body: impl Into<Vec<u8>>,
) -> Result<(), FixtureError> {
    client
        .put_object()
        .bucket(bucket)
        .key(key)
        .body(ByteStream::from(body.into()))
        .send()
        .await
        .map_err(|e| FixtureError::WriteFailed {
            backend: "S3".to_string(),
            target: format!("object {} in bucket {}", key, bucket),
            reason: DisplayErrorContext(e).to_string()
        })?;
    Ok(())
}

/// Ensure `bucket` exists and upload every object into it.
pub async fn prep_s3_objects(
    client: &Client,
    bucket: &str,
    objects: &HashMap<String, Vec<u8>>,
) -> Result<(), FixtureError> {
    prep_bucket(client, bucket).await?;
    for (key, data) in objects {
        upload_object(client, bucket, key, data.clone()).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::with_env;

    #[test]
    fn test_minio_defaults() {
        let opts = minio_defaults();
        assert_eq!(opts.image_ref(), "minio/minio:latest");
        assert_eq!(opts.env_value("MINIO_ROOT_USER"), "minioadmin");
        assert_eq!(opts.env_value("MINIO_ROOT_PASSWORD"), "minioadmin");
        assert_eq!(opts.cmd, vec!["server", "/data"]);
    }

    #[test]
    fn test_credentials_follow_env_overrides() {
        let opts = apply_run_options(
            minio_defaults(),
            vec![
                with_env("MINIO_ROOT_USER", "fixture"),
                with_env("MINIO_ROOT_PASSWORD", "fixture-secret"),
            ],
        );
        assert_eq!(opts.env_value("MINIO_ROOT_USER"), "fixture");
        assert_eq!(opts.env_value("MINIO_ROOT_PASSWORD"), "fixture-secret");
        assert_eq!(opts.env.len(), 2);
    }
}
