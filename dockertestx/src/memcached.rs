//! Memcached container with a connected client.
//!
//! The `memcache` client is synchronous, so every call runs on the blocking
//! thread pool.

use crate::fixture::{CloseError, Fixture, Teardown};
use crate::options::{HostOption, RunOption, RunOptions, apply_host_options, apply_run_options};
use crate::pool::Pool;
use async_trait::async_trait;
use errors::{DockerTestError, FixtureError};
use std::sync::Arc;
use testcontainers::core::ContainerPort;

pub const DEFAULT_MEMCACHED_IMAGE: &str = "memcached";
pub const DEFAULT_MEMCACHED_TAG: &str = "1.6.18";
pub const MEMCACHED_PORT: ContainerPort = ContainerPort::Tcp(11211);

/// Expiration applied to items stored without one, in seconds.
pub const DEFAULT_EXPIRATION_SECS: u32 = 3600;

const PROBE_KEY: &str = "test-connection";

/// Shared handle to the synchronous client.
pub type MemcachedClient = Arc<memcache::Client>;

#[async_trait]
impl Teardown for MemcachedClient {
    async fn close(&self) -> Result<(), CloseError> {
        Ok(())
    }
}

/// One cache entry written by `prep_memcached`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemcachedItem {
    pub key: String,
    pub value: Vec<u8>,
    /// Seconds; `0` means `DEFAULT_EXPIRATION_SECS`
    pub expiration: u32
}

impl MemcachedItem {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            expiration: 0
        }
    }

    pub fn with_expiration(mut self, seconds: u32) -> Self {
        self.expiration = seconds;
        self
    }

    fn effective_expiration(&self) -> u32 {
        if self.expiration == 0 {
            DEFAULT_EXPIRATION_SECS
        } else {
            self.expiration
        }
    }
}

pub fn memcached_defaults() -> RunOptions {
    let mut opts = RunOptions::new(DEFAULT_MEMCACHED_IMAGE, DEFAULT_MEMCACHED_TAG);
    opts.exposed_ports = vec![MEMCACHED_PORT];
    opts
}

pub async fn run_memcached() -> Result<Fixture<MemcachedClient>, DockerTestError> {
    run_memcached_with_options(Vec::new(), Vec::new()).await
}

/// Start `memcached:1.6.18` (unless overridden). The server counts as ready
/// once a `GET` of a probe key answers, a miss included.
pub async fn run_memcached_with_options(
    run_opts: Vec<RunOption>,
    host_opts: Vec<HostOption>,
) -> Result<Fixture<MemcachedClient>, DockerTestError> {
    let pool = Pool::new()?;
    let opts = apply_run_options(memcached_defaults(), run_opts);
    let resource = pool
        .run_with_options("memcached", opts, apply_host_options(host_opts))
        .await?;

    let host_port = match resource.host_port(MEMCACHED_PORT).await {
        Ok(host_port) => host_port,
        Err(e) => {
            resource.discard().await;
            return Err(e);
        }
    };
    tracing::info!("memcached container is running on host port '{}'", host_port);

    let url = format!("memcache://{}", host_port);
    let url = url.as_str();
    match pool.retry("memcached", || connect(url.to_string())).await {
        Ok(client) => Ok(Fixture::new(client, resource)),
        Err(e) => {
            resource.discard().await;
            Err(e)
        }
    }
}

async fn connect(url: String) -> Result<MemcachedClient, String> {
    tokio::task::spawn_blocking(move || {
        let client = memcache::Client::connect(url)?;
        client.get::<Vec<u8>>(PROBE_KEY)?;
        Ok::<_, memcache::MemcacheError>(client)
    })
    .await
    .map_err(|e| e.to_string())?
    .map(Arc::new)
    .map_err(|e| e.to_string())
}

/// Store every item, applying `DEFAULT_EXPIRATION_SECS` where no expiration
/// is set.
pub async fn prep_memcached(
    client: &MemcachedClient,
    items: Vec<MemcachedItem>,
) -> Result<(), FixtureError> {
    let client = Arc::clone(client);
    tokio::task::spawn_blocking(move || {
        for item in &items {
            client
                .set(&item.key, item.value.as_slice(), item.effective_expiration())
                .map_err(|e| FixtureError::WriteFailed {
                    backend: "Memcached".to_string(),
                    target: format!("item with key '{}'", item.key),
                    reason: e.to_string()
                })?;
        }
        Ok(())
    })
    .await
    .map_err(|e| FixtureError::RequestFailed {
        backend: "Memcached".to_string(),
        operation: "set".to_string(),
        reason: e.to_string()
    })?
}
