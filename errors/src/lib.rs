//! # dockertestx Errors
//!
//! Error handling for container fixtures.
//!
//! - `DockerTestError` covers the container lifecycle: configuration, start,
//!   port resolution, readiness and removal.
//! - `FixtureError` covers the data preparation helpers that run against an
//!   already connected client.
//!
//! Client library errors are flattened into `reason` strings so callers never
//! need the wrapped service crates in scope to match on a failure.

use thiserror::Error;

/// Container lifecycle errors
#[derive(Debug, Error)]
pub enum DockerTestError {
    #[error("Invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Invalid container port: {port}")]
    InvalidPort { port: String },

    #[error("Failed to start {service} container: {reason}")]
    StartFailed { service: String, reason: String },

    #[error("No host port was assigned for the {service} container (port {port})")]
    NoHostPort { service: String, port: String },

    #[error("Failed to connect to {service}: {reason}")]
    ConnectFailed { service: String, reason: String },

    #[error("Failed to remove {service} container: {reason}")]
    PurgeFailed { service: String, reason: String }
}

impl DockerTestError {
    /// Name of the service the error refers to, when there is one.
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::StartFailed { service, .. }
            | Self::NoHostPort { service, .. }
            | Self::ConnectFailed { service, .. }
            | Self::PurgeFailed { service, .. } => Some(service),
            Self::InvalidConfig { .. } | Self::InvalidPort { .. } => None
        }
    }
}

/// Fixture preparation errors
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to execute schema SQL: {reason}")]
    SchemaFailed { reason: String },

    #[error("Failed to {stage} transaction: {reason}")]
    TransactionFailed { stage: String, reason: String },

    #[error("Failed to execute initial data SQL (statement {index}): {reason}")]
    StatementFailed { index: usize, reason: String },

    #[error("Failed to write {target} to {backend}: {reason}")]
    WriteFailed {
        backend: String,
        target: String,
        reason: String
    },

    #[error("{operation} on {backend} failed: {reason}")]
    RequestFailed {
        backend: String,
        operation: String,
        reason: String
    },

    #[error("Failed to open a channel: {reason}")]
    ChannelFailed { reason: String },

    #[error("Failed to declare {kind} '{name}': {reason}")]
    DeclareFailed {
        kind: String,
        name: String,
        reason: String
    },

    #[error("Failed to bind queue '{queue}' to exchange '{exchange}': {reason}")]
    BindFailed {
        queue: String,
        exchange: String,
        reason: String
    },

    #[error("Failed to publish message to exchange '{exchange}': {reason}")]
    PublishFailed { exchange: String, reason: String },

    #[error("Failed to register consumer for queue '{queue}': {reason}")]
    ConsumeFailed { queue: String, reason: String }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_failed_message() {
        let err = DockerTestError::StartFailed {
            service: "redis".to_string(),
            reason: "image not found".to_string()
        };
        assert_eq!(
            err.to_string(),
            "Failed to start redis container: image not found"
        );
        assert_eq!(err.service(), Some("redis"));
    }

    #[test]
    fn test_config_error_has_no_service() {
        let err = DockerTestError::InvalidConfig {
            reason: "max_wait_seconds".to_string()
        };
        assert_eq!(err.service(), None);
    }

    #[test]
    fn test_write_failed_message_names_target() {
        let err = FixtureError::WriteFailed {
            backend: "Redis".to_string(),
            target: "key 'session'".to_string(),
            reason: "connection reset".to_string()
        };
        assert_eq!(
            err.to_string(),
            "Failed to write key 'session' to Redis: connection reset"
        );
    }
}
