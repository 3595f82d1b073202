//! # Environment Variable Loader
//!
//! Resolves the pool configuration from defaults, an optional TOML file and
//! environment variables, in that order of increasing precedence.
//!
//! # Naming Convention
//! - `DOCKERTESTX_CONFIG`: path of a TOML file with pool settings
//! - `DOCKERTESTX_*`: individual overrides, one per `PoolConfig` field

use crate::ConfigError;
use crate::config::PoolConfig;
use crate::file_loader::load_from_toml;
use std::env;
use std::path::Path;
use validator::Validate;

pub const CONFIG_FILE_ENV: &str = "DOCKERTESTX_CONFIG";
pub const MAX_WAIT_ENV: &str = "DOCKERTESTX_MAX_WAIT_SECONDS";
pub const INITIAL_INTERVAL_ENV: &str = "DOCKERTESTX_INITIAL_INTERVAL_MS";
pub const MAX_INTERVAL_ENV: &str = "DOCKERTESTX_MAX_INTERVAL_MS";
pub const STARTUP_TIMEOUT_ENV: &str = "DOCKERTESTX_STARTUP_TIMEOUT_SECONDS";

/// Load the pool configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Builds the configuration used by `Pool::new()`: defaults, then the TOML
/// file named by `DOCKERTESTX_CONFIG` (if set), then individual environment
/// overrides. The result is validated before it is returned.
///
/// ## Environment Variables
/// - `DOCKERTESTX_CONFIG`: TOML file path (optional)
/// - `DOCKERTESTX_MAX_WAIT_SECONDS`: readiness budget (default: 60)
/// - `DOCKERTESTX_INITIAL_INTERVAL_MS`: first retry delay (default: 500)
/// - `DOCKERTESTX_MAX_INTERVAL_MS`: largest retry delay (default: 5000)
/// - `DOCKERTESTX_STARTUP_TIMEOUT_SECONDS`: engine start timeout (default: 120)
pub fn load() -> Result<PoolConfig, ConfigError> {
    let base = match env::var(CONFIG_FILE_ENV) {
        Ok(path) if !path.is_empty() => {
            tracing::debug!("Loading pool configuration from {}", path);
            load_from_toml(Path::new(&path))?
        }
        _ => PoolConfig::default()
    };

    let config = apply_env(base)?;
    config
        .validate()
        .map_err(|e| ConfigError::Validation(e.to_string()))?;
    Ok(config)
}

/// Load configuration from defaults plus environment overrides only.
pub fn load_from_env() -> Result<PoolConfig, ConfigError> {
    apply_env(PoolConfig::default())
}

/// Overlay the `DOCKERTESTX_*` variables onto `base`.
pub fn apply_env(mut base: PoolConfig) -> Result<PoolConfig, ConfigError> {
    if let Some(v) = parse_env(MAX_WAIT_ENV)? {
        base.max_wait_seconds = v;
    }
    if let Some(v) = parse_env(INITIAL_INTERVAL_ENV)? {
        base.initial_interval_ms = v;
    }
    if let Some(v) = parse_env(MAX_INTERVAL_ENV)? {
        base.max_interval_ms = v;
    }
    if let Some(v) = parse_env(STARTUP_TIMEOUT_ENV)? {
        base.startup_timeout_seconds = v;
    }
    Ok(base)
}

fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr
{
    match env::var(key) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: s
        }),
        Err(_) => Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn clear_env() {
        unsafe {
            env::remove_var(CONFIG_FILE_ENV);
            env::remove_var(MAX_WAIT_ENV);
            env::remove_var(INITIAL_INTERVAL_ENV);
            env::remove_var(MAX_INTERVAL_ENV);
            env::remove_var(STARTUP_TIMEOUT_ENV);
        }
    }

    #[test]
    #[serial]
    fn test_load_defaults() {
        clear_env();
        let config = load().unwrap();
        assert_eq!(config, PoolConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        unsafe {
            env::set_var(MAX_WAIT_ENV, "10");
            env::set_var(INITIAL_INTERVAL_ENV, "100");
        }

        let config = load().unwrap();
        assert_eq!(config.max_wait_seconds, 10);
        assert_eq!(config.initial_interval_ms, 100);
        assert_eq!(config.max_interval_ms, 5000);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unparsable_env_is_an_error() {
        clear_env();
        unsafe {
            env::set_var(MAX_WAIT_ENV, "a minute");
        }

        let result = load_from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == MAX_WAIT_ENV
        ));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_env_takes_precedence_over_file() {
        clear_env();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_wait_seconds = 30\nstartup_timeout_seconds = 45").unwrap();
        unsafe {
            env::set_var(CONFIG_FILE_ENV, file.path());
            env::set_var(MAX_WAIT_ENV, "5");
        }

        let config = load().unwrap();
        assert_eq!(config.max_wait_seconds, 5);
        assert_eq!(config.startup_timeout_seconds, 45);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_combination_fails_validation() {
        clear_env();
        unsafe {
            env::set_var(INITIAL_INTERVAL_ENV, "9000");
            env::set_var(MAX_INTERVAL_ENV, "100");
        }

        let result = load();
        assert!(matches!(result, Err(ConfigError::Validation(_))));

        clear_env();
    }
}
