//! Redis container with a connected `ConnectionManager`, plus helpers that
//! seed strings, lists, hashes, sets and sorted sets.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, RedisError, RedisResult, ToRedisArgs, ToSingleRedisArg};
use async_trait::async_trait;
use errors::{DockerTestError, FixtureError};
use std::collections::HashMap;
use std::time::Duration;
use testcontainers::core::ContainerPort;

pub const DEFAULT_REDIS_IMAGE: &str = "redis";
pub const DEFAULT_REDIS_TAG: &str = "7.2";
pub const REDIS_PORT: ContainerPort = ContainerPort::Tcp(6379);

#[async_trait]
impl Teardown for ConnectionManager {
    async fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

pub fn redis_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_REDIS_IMAGE, DEFAULT_REDIS_TAG);
    opts.exposed_ports = vec![REDIS_PORT];
    opts
}

pub async fn run_redis() -> Result<Fixture<ConnectionManager>, DockerTestError> {
    run_redis_with_options(Vec::new(), Vec::new()).await
}

/// Start `redis:7.2` (unless overridden) and connect once `PING` answers.
pub async fn run_redis_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<ConnectionManager>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(redis_defaults(), run_opts);
    let resource = pool
        .run_with_options("redis", opts, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(REDIS_PORT).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    tracing::info!("redis container is running on host port '{}'", host_port);

    let url = format!("redis://{}", host_port);
    let url = url.as_str();
    match pool.retry("redis", || connect(url)).await {
        Ok(conn) => Ok(Fixture::new(conn, resource)),
        Err(e) => {
            resource.discard().await;
            Err(e)
        }
    }
}

async fn connect(url: &str) -> RedisResult<ConnectionManager> {
    let client = ::redis::Client::open(url)?;
    let mut conn = client.get_connection_manager().await?;
    let _: String = ::redis::cmd("PING").query_async(&mut conn).await?;
    Ok(conn)
}

fn expiration_millis(expiration: Duration) -> u64 {
    expiration.as_millis().max(1) as u64
}

fn write_failed(target: String, e: RedisError) -> FixtureError {
    FixtureError::WriteFailed {
        backend: "Redis".to_string(),
        target,
        reason: e.to_string()
    }
}

/// `SET` every item. A zero `expiration` stores the keys without a TTL;
/// anything shorter than a millisecond is rounded up to one.
pub async fn prep_redis<V>(
    conn: &ConnectionManager,
    items: &HashMap<String, V>,
    expiration: Duration,
) -> Result<(), FixtureError>
where
    V: ToSingleRedisArg + Send + Sync
{
    let mut conn = conn.clone();
    for (key, value) in items {
        let result: RedisResult<()> = if expiration.is_zero() {
            conn.set(key, value).await
        } else {
            conn.pset_ex(key, value, expiration_millis(expiration)).await
        };
        result.map_err(|e| write_failed(format!("item with key '{}'", key), e))?;
    }
    Ok(())
}

/// `RPUSH` all values onto the list at `key`, preserving order.
pub async fn prep_redis_list<V>(
    conn: &ConnectionManager,
    key: &str,
    values: &[V],
) -> Result<(), FixtureError>
where
    V: ToRedisArgs + Send + Sync
{
    let mut conn = conn.clone();
    let _: usize = conn
        .rpush(key, values)
        .await
        .map_err(|e| write_failed(format!("list '{}'", key), e))?;
    Ok(())
}

pub async fn prep_redis_hash<V>(
    conn: &ConnectionManager,
    key: &str,
    fields: &HashMap<String, V>,
) -> Result<(), FixtureError>
where
    V: ToRedisArgs + Send + Sync
{
    let mut conn = conn.clone();
    let pairs: Vec<(&String, &V)> = fields.iter().collect();
    let _: () = conn
        .hset_multiple(key, pairs.as_slice())
        .await
        .map_err(|e| write_failed(format!("hash fields for key '{}'", key), e))?;
    Ok(())
}

pub async fn prep_redis_set<V>(
    conn: &ConnectionManager,
    key: &str,
    members: &[V],
) -> Result<(), FixtureError>
where
    V: ToRedisArgs + Send + Sync
{
    let mut conn = conn.clone();
    let _: usize = conn
        .sadd(key, members)
        .await
        .map_err(|e| write_failed(format!("set members for key '{}'", key), e))?;
    Ok(())
}

pub async fn prep_redis_sorted_set(
    conn: &ConnectionManager,
    key: &str,
    members: &HashMap<String, f64>,
) -> Result<(), FixtureError> {
    let mut conn = conn.clone();
    for (member, score) in members {
        let _: usize = conn.zadd(key, member, *score).await.map_err(|e| {
            write_failed(format!("member '{}' of sorted set '{}'", member, key), e)
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::with_tag;

    #[test]
    fn test_redis_defaults() {
        let opts = redis_defaults();
        assert_eq!(opts.image_ref(), "redis:7.2");
        assert!(opts.env.is_empty());
        assert_eq!(opts.exposed_ports, vec![REDIS_PORT]);
    }

    #[test]
    fn test_sub_millisecond_expiration_rounds_up() {
        assert_eq!(expiration_millis(Duration::from_micros(500)), 1);
        assert_eq!(expiration_millis(Duration::from_nanos(1)), 1);
        assert_eq!(expiration_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(expiration_millis(Duration::from_secs(30)), 30_000);
    }

    #[test]
    fn test_redis_tag_override() {
        let opts = apply_run_options(redis_defaults(), vec![with_tag("7.0")]);
        assert_eq!(opts.image_ref(), "redis:7.0");
    }
}
