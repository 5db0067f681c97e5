use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use edgeflow_core::RuntimeKind;
use edgeflow_sandbox::SandboxError;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("function {0} not found")]
    NotFound(String),

    #[error("invalid function id {0:?}")]
    InvalidId(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("function exceeded {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    ExecutionError(String),

    #[error("invalid function code: {0}")]
    InvalidCode(String),

    #[error("runtime {0} is not available on this node")]
    RuntimeUnavailable(RuntimeKind),

    #[error(transparent)]
    Sandbox(SandboxError),
}

impl From<SandboxError> for HostError {
    fn from(e: SandboxError) -> Self {
        match e {
            SandboxError::Timeout(d) => HostError::Timeout(d),
            other => HostError::Sandbox(other),
        }
    }
}

impl HostError {
    /// Whether the caller sent something unusable, as opposed to the host
    /// or the function failing.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            HostError::InvalidId(_)
                | HostError::InvalidCode(_)
                | HostError::RuntimeUnavailable(_)
                | HostError::Sandbox(SandboxError::Compile { .. })
        )
    }
}

pub type HostResult<T> = Result<T, HostError>;
