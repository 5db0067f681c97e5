use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the sandbox engine and its worker.
///
/// Every variant carries owned strings so errors can cross the worker
/// channel and be cloned into responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("module {0} is not loaded")]
    NotLoaded(String),

    #[error("failed to compile module {module_id}: {message}")]
    Compile { module_id: String, message: String },

    #[error("failed to instantiate module: {0}")]
    Instantiation(String),

    #[error("module is missing required exports: {}", .0.join(", "))]
    MissingExports(Vec<String>),

    #[error("export {name} has an unexpected signature: {message}")]
    ExportSignature { name: String, message: String },

    #[error("guest allocator returned a null pointer for {0} bytes")]
    AllocationFailed(usize),

    #[error("guest memory access failed: {0}")]
    MemoryAccess(String),

    #[error("guest trapped: {0}")]
    Trap(String),

    #[error("execution exceeded {0:?}")]
    Timeout(Duration),

    #[error("failed to encode input: {0}")]
    Encode(String),

    #[error("failed to decode module output: {0}")]
    Decode(String),

    #[error("failed to configure sandbox engine: {0}")]
    Engine(String),

    #[error("sandbox worker is not running")]
    WorkerUnavailable,
}

pub type SandboxResult<T> = Result<T, SandboxError>;
