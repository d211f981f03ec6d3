//! Error types for flightlinkctl

use flightlink_relay::RelayError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Unknown value: {0}")]
    UnknownValue(String),

    /// Carries the full configuration error message.
    #[error("{0}")]
    InvalidConfiguration(String),

    #[error("Relay unavailable: {0}")]
    RelayUnavailable(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl CliError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::UnknownValue(_) => 3,
            CliError::InvalidConfiguration(_) | CliError::YamlError(_) => 4,
            CliError::RelayUnavailable(_) => 5,
            CliError::IoError(_) | CliError::JsonError(_) => 1,
        }
    }
}

impl From<RelayError> for CliError {
    fn from(error: RelayError) -> Self {
        match error {
            RelayError::Config(e) => CliError::InvalidConfiguration(e.to_string()),
            other => CliError::RelayUnavailable(other.to_string()),
        }
    }
}
