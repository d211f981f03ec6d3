use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind telemetry socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Telemetry socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed telemetry record: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode telemetry record: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Telemetry record of {size} bytes exceeds the {max} byte datagram limit")]
    Oversized { size: usize, max: usize },

    /// The producing side of an in-process channel has gone away.
    #[error("Telemetry channel closed")]
    Closed,
}

impl TransportError {
    /// Whether the failure concerns one datagram only and the channel remains usable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Decode(_) | TransportError::Oversized { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(TransportError::Oversized { size: 9000, max: 8192 }.is_transient());
        assert!(!TransportError::Closed.is_transient());
        assert!(
            !TransportError::Io(std::io::Error::other("socket closed")).is_transient()
        );
    }
}
