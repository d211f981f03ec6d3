use flightlink_telemetry_core::SchemaError;
use flightlink_telemetry_transport::TransportError;
use thiserror::Error;

use crate::sim::SimError;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Sim(#[from] SimError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl AgentError {
    /// Whether retrying the whole connection handshake may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Sim(_) => true,
            AgentError::Schema(e) => e.is_transient(),
            AgentError::Transport(e) => e.is_transient(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_errors_are_retryable() {
        assert!(AgentError::from(SimError::Refused("not running".into())).is_retryable());
        let fatal = AgentError::from(SchemaError::Empty {
            schema: "flight_status".into(),
        });
        assert!(!fatal.is_retryable());
    }
}
