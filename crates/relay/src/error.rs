use flightlink_capture_agent::AgentError;
use flightlink_supervisor::SupervisorError;
use flightlink_telemetry_core::{SchemaError, TelemetryError};
use flightlink_telemetry_transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Supervisor error: {0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Capture agent error: {0}")]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Provider is not initialized")]
    NotInitialized,

    #[error("Failed to spawn {name} thread: {source}")]
    Thread {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// Whether the relay loop should cool down and retry.
    ///
    /// Contract errors (bad configuration, unknown field names, a missing agent
    /// executable) stop the worker and are reported through
    /// `TelemetryProvider::failure`.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            RelayError::Transport(_) | RelayError::Thread { .. } => true,
            RelayError::Supervisor(e) => e.is_transient(),
            RelayError::Agent(e) => e.is_retryable(),
            RelayError::Config(_)
            | RelayError::Telemetry(_)
            | RelayError::Schema(_)
            | RelayError::NotInitialized => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_errors_are_not_transient() {
        assert!(!RelayError::from(ConfigError::invalid("zero frequency")).is_transient());
        assert!(!RelayError::from(TelemetryError::unknown_field("Altitude")).is_transient());
        assert!(RelayError::from(TransportError::Closed).is_transient());
        let missing = SupervisorError::Spawn {
            program: PathBuf::from("/nonexistent/flightlink-agent"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!RelayError::from(missing).is_transient());
    }
}
