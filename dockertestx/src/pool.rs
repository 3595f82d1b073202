//! Container engine access and the bounded readiness retry.

use crate::options::{HostConfig, RunOptions};
use crate::resource::Resource;
use config::{PoolConfig, Validate};
use errors::DockerTestError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use testcontainers::runners::AsyncRunner;
use testcontainers::{GenericImage, ImageExt};
use tokio::time::{Instant, sleep, timeout};
use tokio_retry::strategy::{ExponentialBackoff, jitter};

/// Starts containers and waits for them to become reachable.
#[derive(Debug, Clone)]
pub struct Pool {
    config: PoolConfig
}

impl Pool {
    /// Pool configured from `DOCKERTESTX_*` environment variables (see
    /// `config::load`).
    pub fn new() -> Result<Self, DockerTestError> {
        let config = config::load().map_err(|e| DockerTestError::InvalidConfig {
            reason: e.to_string()
        })?;
        Ok(Self { config })
    }

    pub fn with_config(config: PoolConfig) -> Result<Self, DockerTestError> {
        config
            .validate()
            .map_err(|e| DockerTestError::InvalidConfig {
                reason: e.to_string()
            })?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Start a container described by `run` and `host`.
    pub async fn run_with_options(
        &self,
        service: &str,
        run: RunOptions,
        host: HostConfig,
    ) -> Result<Resource, DockerTestError> {
        let image_ref = run.image_ref();
        let startup_timeout = run
            .startup_timeout
            .unwrap_or_else(|| self.config.startup_timeout());

        let mut image = GenericImage::new(run.repository.clone(), run.tag.clone());
        for port in &run.exposed_ports {
            image = image.with_exposed_port(*port);
        }
        for wait in run.wait_for.iter().cloned() {
            image = image.with_wait_for(wait);
        }
        if let Some(entrypoint) = &run.entrypoint {
            image = image.with_entrypoint(entrypoint);
        }

        let mut request = image.with_startup_timeout(startup_timeout);
        for (key, value) in run.env_pairs() {
            request = request.with_env_var(key, value);
        }
        if !run.cmd.is_empty() {
            request = request.with_cmd(run.cmd.clone());
        }
        if let Some(name) = &run.container_name {
            request = request.with_container_name(name.clone());
        }
        if host.privileged {
            request = request.with_privileged(true);
        }
        if let Some(size) = host.shm_size {
            request = request.with_shm_size(size);
        }
        for mount in host.mounts {
            request = request.with_mount(mount);
        }
        if let Some(network) = host.network {
            request = request.with_network(network);
        }

        let container = request
            .start()
            .await
            .map_err(|e| DockerTestError::StartFailed {
                service: service.to_string(),
                reason: e.to_string()
            })?;

        tracing::info!(
            "{} container started from {} ({})",
            service,
            image_ref,
            container.id()
        );
        Ok(Resource::new(service, image_ref, container))
    }

    /// Call `op` until it succeeds or `max_wait` of wall-clock time is spent.
    ///
    /// Each attempt is cut off at the remaining budget, and no delay is slept
    /// that would end past it. The error of the last attempt is reported as
    /// `ConnectFailed`.
    pub async fn retry<F, Fut, T, E>(&self, service: &str, mut op: F) -> Result<T, DockerTestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display
    {
        let budget = self.config.max_wait();
        let started = Instant::now();
        let mut delays = retry_schedule(&self.config).map(jitter);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let remaining = budget.saturating_sub(started.elapsed());
            let reason = match timeout(remaining, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("attempt timed out after {:?}", remaining)
            };
            tracing::debug!("{} not ready (attempt {}): {}", service, attempt, reason);

            let delay = delays.next().unwrap_or_else(|| self.config.max_interval());
            if started.elapsed() + delay > budget {
                return Err(DockerTestError::ConnectFailed {
                    service: service.to_string(),
                    reason
                });
            }
            sleep(delay).await;
        }
    }

    /// Stop and remove a container.
    pub async fn purge(&self, resource: Resource) -> Result<(), DockerTestError> {
        resource.purge().await
    }
}

/// Delays between readiness attempts, before jitter.
///
/// Starts at `initial_interval` and doubles up to `max_interval`. The
/// sequence is endless; `Pool::retry` stops on elapsed time.
pub fn retry_schedule(config: &PoolConfig) -> impl Iterator<Item = Duration> + use<> {
    let cap = config.max_interval();
    std::iter::once(config.initial_interval().min(cap)).chain(
        ExponentialBackoff::from_millis(2)
            .factor(config.initial_interval_ms)
            .max_delay(cap)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> PoolConfig {
        PoolConfig {
            max_wait_seconds: 1,
            initial_interval_ms: 1,
            max_interval_ms: 10,
            startup_timeout_seconds: 5
        }
    }

    #[test]
    fn test_default_schedule() {
        let ms: Vec<u128> = retry_schedule(&PoolConfig::default())
            .take(7)
            .map(|d| d.as_millis())
            .collect();
        assert_eq!(ms, vec![500, 1000, 2000, 4000, 5000, 5000, 5000]);
    }

    #[test]
    fn test_schedule_caps_large_initial_interval() {
        let config = PoolConfig {
            initial_interval_ms: 2000,
            max_interval_ms: 2000,
            ..Default::default()
        };
        let ms: Vec<u128> = retry_schedule(&config).take(3).map(|d| d.as_millis()).collect();
        assert_eq!(ms, vec![2000, 2000, 2000]);
    }

    #[test]
    fn test_with_config_rejects_invalid() {
        let config = PoolConfig {
            initial_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            Pool::with_config(config),
            Err(DockerTestError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_failures() {
        let pool = Pool::with_config(fast_config()).unwrap();
        let mut calls = 0;

        let result = pool
            .retry("flaky", || {
                calls += 1;
                let n = calls;
                async move {
                    if n < 3 {
                        Err(format!("refused #{}", n))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reports_last_error() {
        let pool = Pool::with_config(fast_config()).unwrap();
        let mut calls = 0;

        let result: Result<(), _> = pool
            .retry("down", || {
                calls += 1;
                let n = calls;
                async move { Err::<(), _>(format!("refused #{}", n)) }
            })
            .await;

        assert!(calls > 1);
        match result {
            Err(DockerTestError::ConnectFailed { service, reason }) => {
                assert_eq!(service, "down");
                assert_eq!(reason, format!("refused #{}", calls));
            }
            other => panic!("expected ConnectFailed, got {:?}", other)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_attempts_stay_within_max_wait() {
        let config = PoolConfig {
            max_wait_seconds: 2,
            initial_interval_ms: 100,
            max_interval_ms: 100,
            startup_timeout_seconds: 5
        };
        let pool = Pool::with_config(config).unwrap();
        let started = Instant::now();
        let mut calls = 0;

        let result: Result<(), _> = pool
            .retry("slow", || {
                calls += 1;
                async {
                    sleep(Duration::from_millis(300)).await;
                    Err::<(), _>("connection refused")
                }
            })
            .await;

        assert!(matches!(result, Err(DockerTestError::ConnectFailed { .. })));
        assert!(started.elapsed() <= Duration::from_secs(2), "took {:?}", started.elapsed());
        assert!(calls <= 7, "{} attempts of 300ms cannot fit in 2s", calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_attempt_is_cut_off() {
        let pool = Pool::with_config(fast_config()).unwrap();
        let started = Instant::now();

        let result: Result<(), _> = pool
            .retry("hung", || std::future::pending::<Result<(), String>>())
            .await;

        match result {
            Err(DockerTestError::ConnectFailed { reason, .. }) => {
                assert!(reason.contains("timed out"), "got: {}", reason);
            }
            other => panic!("expected ConnectFailed, got {:?}", other)
        }
        assert!(started.elapsed() <= Duration::from_secs(1));
    }
}
