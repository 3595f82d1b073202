//! Throwaway service containers for tests.
//!
//! Each service module starts a container, waits until it accepts
//! connections, and returns a `Fixture` holding a connected client:
//! - MySQL / PostgreSQL (`sql`, via `sqlx`)
//! - Redis (`redis`)
//! - Memcached (`memcached`)
//! - MinIO (`minio`, S3 API via `aws-sdk-s3`)
//! - DynamoDB Local (`dynamodb`)
//! - RabbitMQ (`rabbitmq`, via `lapin`)
//!
//! Defaults can be overridden with `RunOption` / `HostOption` mutators, and
//! every module has small helpers that preload fixture data.
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use dockertestx::options::with_tag;
//! use dockertestx::redis::run_redis_with_options;
//!
//! let redis = run_redis_with_options(vec![with_tag("7.0")], Vec::new()).await?;
//! // ... use redis.client() ...
//! redis.cleanup().await;
//! # Ok(())
//! # }
//! ```

pub mod fixture;
pub mod logging;
pub mod options;
pub mod pool;
pub mod resource;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;
#[cfg(feature = "memcached")]
pub mod memcached;
#[cfg(feature = "minio")]
pub mod minio;
#[cfg(feature = "rabbitmq")]
pub mod rabbitmq;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(any(feature = "mysql", feature = "postgres"))]
pub mod sql;

pub use errors::{DockerTestError, FixtureError};
pub use fixture::{Fixture, Teardown};
pub use options::{HostConfig, HostOption, RunOption, RunOptions};
pub use config::PoolConfig;
pub use pool::Pool;
pub use resource::Resource;

use std::sync::atomic::{AtomicU32, Ordering};

static FIXTURE_NAMES: AtomicU32 = AtomicU32::new(0);

/// Name for a bucket, table, queue or container that no other call in this
/// process has been given, e.g. `unique_id("bucket")` -> `bucket-3`.
pub fn unique_id(prefix: &str) -> String {
    let n = FIXTURE_NAMES.fetch_add(1, Ordering::Relaxed);
    format!("{}-{}", prefix, n)
}
