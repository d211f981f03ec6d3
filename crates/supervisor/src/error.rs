use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to launch capture agent '{}': {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start output forwarder for pid {pid}: {source}")]
    Forwarder {
        pid: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture agent process I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    /// Whether a later launch attempt may succeed.
    ///
    /// A missing executable is a configuration defect and is not retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            SupervisorError::Spawn { source, .. } => !matches!(
                source.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ),
            SupervisorError::Forwarder { .. } | SupervisorError::Io(_) => true,
        }
    }
}
