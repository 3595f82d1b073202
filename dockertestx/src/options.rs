//! Functional options for container runs.
//!
//! Every lifecycle helper starts from a service-specific `RunOptions` default
//! and applies the caller's `RunOption` mutators in order, so a later option
//! always wins over an earlier one. Host-level settings go through the same
//! mechanism with `HostOption`.

use errors::DockerTestError;
use std::time::Duration;
use testcontainers::core::{ContainerPort, Mount, WaitFor};

/// Mutator applied to the default `RunOptions` before a container starts.
pub type RunOption = Box<dyn FnOnce(&mut RunOptions) + Send>;

/// Mutator applied to the `HostConfig` before a container starts.
pub type HostOption = Box<dyn FnOnce(&mut HostConfig) + Send>;

/// Description of the container to start.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub repository: String,
    pub tag: String,
    /// `KEY=VALUE` entries passed to the container environment
    pub env: Vec<String>,
    pub cmd: Vec<String>,
    pub entrypoint: Option<String>,
    pub exposed_ports: Vec<ContainerPort>,
    pub container_name: Option<String>,
    pub wait_for: Vec<WaitFor>,
    /// Overrides the pool's configured startup timeout
    pub startup_timeout: Option<Duration>
}

impl RunOptions {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// `repository:tag`, as used in log lines.
    pub fn image_ref(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Value of `key` in the environment list, or the empty string.
    pub fn env_value(&self, key: &str) -> &str {
        get_env_value(&self.env, key)
    }

    /// Replace the entry for `key`, or append one if there is none.
    pub fn set_env(&mut self, key: &str, value: &str) {
        let entry = format!("{}={}", key, value);
        let prefix = format!("{}=", key);
        match self.env.iter_mut().find(|e| e.starts_with(&prefix)) {
            Some(existing) => *existing = entry,
            None => self.env.push(entry)
        }
    }

    /// Environment entries split into `(key, value)` pairs.
    pub fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env
            .iter()
            .map(|e| e.split_once('=').unwrap_or((e.as_str(), "")))
    }
}

/// Host-level container settings.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    pub privileged: bool,
    /// `/dev/shm` size in bytes
    pub shm_size: Option<u64>,
    pub mounts: Vec<Mount>,
    pub network: Option<String>
}

/// Apply `opts` over `defaults`, in order.
pub fn apply_run_options(mut defaults: RunOptions, opts: Vec<RunOption>) -> RunOptions {
    for opt in opts {
        opt(&mut defaults);
    }
    defaults
}

/// Apply `opts` over a default `HostConfig`, in order.
pub fn apply_host_options(opts: Vec<HostOption>) -> HostConfig {
    let mut config = HostConfig::default();
    for opt in opts {
        opt(&mut config);
    }
    config
}

/// Search `env` (`KEY=VALUE` entries) for `key` and return its value.
///
/// Returns the empty string when the key is absent. Only an exact key match
/// counts: `MY_VAR` never matches `MY_VARIABLE=...`.
pub fn get_env_value<'a>(env: &'a [String], key: &str) -> &'a str {
    let prefix = format!("{}=", key);
    env.iter()
        .find_map(|entry| entry.strip_prefix(prefix.as_str()))
        .unwrap_or("")
}

/// Parse a `"3306/tcp"` style port. A bare number is treated as TCP.
pub fn parse_port(spec: &str) -> Result<ContainerPort, DockerTestError> {
    let invalid = || DockerTestError::InvalidPort {
        port: spec.to_string()
    };
    let (number, protocol) = spec.trim().split_once('/').unwrap_or((spec.trim(), "tcp"));
    let number: u16 = number.parse().map_err(|_| invalid())?;

    match protocol.to_ascii_lowercase().as_str() {
        "tcp" => Ok(ContainerPort::Tcp(number)),
        "udp" => Ok(ContainerPort::Udp(number)),
        _ => Err(invalid())
    }
}

/// `"6379/tcp"` style label for a port.
pub fn port_label(port: ContainerPort) -> String {
    match port {
        ContainerPort::Tcp(p) => format!("{}/tcp", p),
        ContainerPort::Udp(p) => format!("{}/udp", p),
        other => format!("{:?}", other)
    }
}

pub fn with_repository(repository: impl Into<String>) -> RunOption {
    let repository = repository.into();
    Box::new(move |opts: &mut RunOptions| opts.repository = repository)
}

pub fn with_tag(tag: impl Into<String>) -> RunOption {
    let tag = tag.into();
    Box::new(move |opts: &mut RunOptions| opts.tag = tag)
}

/// Set (or replace) one environment variable.
pub fn with_env(key: impl Into<String>, value: impl Into<String>) -> RunOption {
    let key = key.into();
    let value = value.into();
    Box::new(move |opts: &mut RunOptions| opts.set_env(&key, &value))
}

pub fn with_cmd<I, S>(cmd: I) -> RunOption
where
    I: IntoIterator<Item = S>,
    S: Into<String>
{
    let cmd: Vec<String> = cmd.into_iter().map(Into::into).collect();
    Box::new(move |opts: &mut RunOptions| opts.cmd = cmd)
}

pub fn with_exposed_port(port: ContainerPort) -> RunOption {
    Box::new(move |opts: &mut RunOptions| {
        if !opts.exposed_ports.contains(&port) {
            opts.exposed_ports.push(port);
        }
    })
}

pub fn with_container_name(name: impl Into<String>) -> RunOption {
    let name = name.into();
    Box::new(move |opts: &mut RunOptions| opts.container_name = Some(name))
}

pub fn with_wait_for(wait: WaitFor) -> RunOption {
    Box::new(move |opts: &mut RunOptions| opts.wait_for.push(wait))
}

pub fn with_startup_timeout(timeout: Duration) -> RunOption {
    Box::new(move |opts: &mut RunOptions| opts.startup_timeout = Some(timeout))
}

pub fn privileged() -> HostOption {
    Box::new(|config: &mut HostConfig| config.privileged = true)
}

pub fn with_shm_size(bytes: u64) -> HostOption {
    Box::new(move |config: &mut HostConfig| config.shm_size = Some(bytes))
}

pub fn with_mount(mount: Mount) -> HostOption {
    Box::new(move |config: &mut HostConfig| config.mounts.push(mount))
}

pub fn with_network(network: impl Into<String>) -> HostOption {
    let network = network.into();
    Box::new(move |config: &mut HostConfig| config.network = Some(network))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mysql_like_env() -> Vec<String> {
        vec![
            "MYSQL_ROOT_PASSWORD=secret".to_string(),
            "MYSQL_DATABASE=test".to_string(),
            "FOO=bar".to_string(),
        ]
    }

    #[test]
    fn test_get_env_value_existing_keys() {
        let env = mysql_like_env();
        assert_eq!(get_env_value(&env, "MYSQL_ROOT_PASSWORD"), "secret");
        assert_eq!(get_env_value(&env, "MYSQL_DATABASE"), "test");
    }

    #[test]
    fn test_get_env_value_missing_key() {
        assert_eq!(get_env_value(&mysql_like_env(), "NOT_EXISTENT"), "");
        assert_eq!(get_env_value(&[], "ANY_VAR"), "");
    }

    #[test]
    fn test_get_env_value_similar_prefixes() {
        let env = vec!["MY_VAR=123".to_string(), "MY_VARIABLE=456".to_string()];
        assert_eq!(get_env_value(&env, "MY_VAR"), "123");
        assert_eq!(get_env_value(&env, "MY_VARIABLE"), "456");

        let reversed = vec!["MY_VARIABLE=456".to_string(), "MY_VAR=123".to_string()];
        assert_eq!(get_env_value(&reversed, "MY_VAR"), "123");
    }

    #[test]
    fn test_get_env_value_keeps_equals_in_value() {
        let env = vec!["OPTS=a=b".to_string()];
        assert_eq!(get_env_value(&env, "OPTS"), "a=b");
    }

    #[test]
    fn test_options_apply_in_order() {
        let defaults = RunOptions::new("redis", "7.2");
        let opts = apply_run_options(defaults, vec![with_tag("7.0"), with_tag("6.2")]);
        assert_eq!(opts.image_ref(), "redis:6.2");
    }

    #[test]
    fn test_no_options_keeps_defaults() {
        let mut defaults = RunOptions::new("postgres", "13");
        defaults.set_env("POSTGRES_PASSWORD", "secret");
        let opts = apply_run_options(defaults, Vec::new());
        assert_eq!(opts.repository, "postgres");
        assert_eq!(opts.tag, "13");
        assert_eq!(opts.env_value("POSTGRES_PASSWORD"), "secret");
    }

    #[test]
    fn test_with_env_replaces_existing_entry() {
        let mut defaults = RunOptions::new("mysql", "8.0");
        defaults.env = mysql_like_env();
        let opts = apply_run_options(
            defaults,
            vec![with_env("MYSQL_ROOT_PASSWORD", "hunter2"), with_env("TZ", "UTC")],
        );
        assert_eq!(opts.env.len(), 4);
        assert_eq!(opts.env_value("MYSQL_ROOT_PASSWORD"), "hunter2");
        assert_eq!(opts.env_value("TZ"), "UTC");
    }

    #[test]
    fn test_custom_closure_option() {
        let custom: RunOption = Box::new(|opts: &mut RunOptions| {
            opts.repository = "mirror.local/redis".to_string();
            opts.cmd = vec!["redis-server".to_string(), "--appendonly".to_string(), "yes".to_string()];
        });
        let opts = apply_run_options(RunOptions::new("redis", "7.2"), vec![custom]);
        assert_eq!(opts.image_ref(), "mirror.local/redis:7.2");
        assert_eq!(opts.cmd.len(), 3);
    }

    #[test]
    fn test_env_pairs_split_on_first_equals() {
        let mut opts = RunOptions::new("minio/minio", "latest");
        opts.env = vec!["A=1".to_string(), "B=x=y".to_string(), "BARE".to_string()];
        let pairs: Vec<_> = opts.env_pairs().collect();
        assert_eq!(pairs, vec![("A", "1"), ("B", "x=y"), ("BARE", "")]);
    }

    #[test]
    fn test_exposed_port_not_duplicated() {
        let mut defaults = RunOptions::new("redis", "7.2");
        defaults.exposed_ports.push(ContainerPort::Tcp(6379));
        let opts = apply_run_options(
            defaults,
            vec![with_exposed_port(ContainerPort::Tcp(6379)), with_exposed_port(ContainerPort::Tcp(16379))],
        );
        assert_eq!(
            opts.exposed_ports,
            vec![ContainerPort::Tcp(6379), ContainerPort::Tcp(16379)]
        );
    }

    #[test]
    fn test_host_options() {
        let config = apply_host_options(vec![privileged(), with_shm_size(1 << 20), with_network("fixtures")]);
        assert!(config.privileged);
        assert_eq!(config.shm_size, Some(1 << 20));
        assert_eq!(config.network.as_deref(), Some("fixtures"));
        assert!(config.mounts.is_empty());
    }

    #[test]
    fn test_parse_port() {
        assert_eq!(parse_port("3306/tcp").unwrap(), ContainerPort::Tcp(3306));
        assert_eq!(parse_port("53/UDP").unwrap(), ContainerPort::Udp(53));
        assert_eq!(parse_port("6379").unwrap(), ContainerPort::Tcp(6379));
        assert!(matches!(
            parse_port("5672/amqp"),
            Err(DockerTestError::InvalidPort { .. })
        ));
        assert!(parse_port("http/tcp").is_err());
    }

    #[test]
    fn test_port_label() {
        assert_eq!(port_label(ContainerPort::Tcp(11211)), "11211/tcp");
        assert_eq!(port_label(ContainerPort::Udp(53)), "53/udp");
    }
}
