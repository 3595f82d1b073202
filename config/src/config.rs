//! # Configuration Structures
//!
//! Pool settings shared by every container fixture.
//!
//! The structure:
//! - Uses `serde` for TOML deserialization (missing fields fall back to
//!   defaults)
//! - Uses `validator` for range and cross-field checks

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::{Validate, ValidationError};

/// Retry and startup settings for the container pool.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Bounds how long a fixture waits for a freshly started container to accept
/// connections, and how long the container engine may take to report the
/// container as started.
///
/// ## Usage
/// ```rust,no_run
/// use config::PoolConfig;
///
/// let config = PoolConfig::default();
/// assert_eq!(config.max_wait().as_secs(), 60);
/// ```
///
/// ## Fields
/// - `max_wait_seconds`: Total delay budget for readiness retries
/// - `initial_interval_ms`: First delay between readiness attempts
/// - `max_interval_ms`: Upper bound for a single delay
/// - `startup_timeout_seconds`: Container engine start timeout
///
/// ## Validation
/// Every field is range checked and `max_interval_ms` may not be smaller than
/// `initial_interval_ms`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq, Eq)]
#[serde(default)]
#[validate(schema(function = "validate_intervals"))]
pub struct PoolConfig {
    /// Total delay budget for readiness retries, in seconds
    #[validate(range(min = 1, max = 3600))]
    pub max_wait_seconds: u64,

    /// First delay between readiness attempts, in milliseconds
    #[validate(range(min = 1, max = 60000))]
    pub initial_interval_ms: u64,

    /// Upper bound for a single delay, in milliseconds
    #[validate(range(min = 1, max = 60000))]
    pub max_interval_ms: u64,

    /// How long the engine may take to start a container, in seconds
    #[validate(range(min = 1, max = 3600))]
    pub startup_timeout_seconds: u64
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_wait_seconds: 60,
            initial_interval_ms: 500,
            max_interval_ms: 5000,
            startup_timeout_seconds: 120
        }
    }
}

impl PoolConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_seconds)
    }

    pub fn initial_interval(&self) -> Duration {
        Duration::from_millis(self.initial_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }
}

fn validate_intervals(config: &PoolConfig) -> Result<(), ValidationError> {
    if config.max_interval_ms < config.initial_interval_ms {
        let mut err = ValidationError::new("interval_order");
        err.message = Some("max_interval_ms must be >= initial_interval_ms".into());
        return Err(err);
    }
    Ok(())
}
