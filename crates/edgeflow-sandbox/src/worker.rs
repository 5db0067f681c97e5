//! Sandbox worker — the engine on its own thread behind a typed channel.
//!
//! Requests are served strictly in arrival order, one at a time. The
//! worker exits once every `SandboxHandle` has been dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::engine::SandboxEngine;
use crate::error::{SandboxError, SandboxResult};

const QUEUE_DEPTH: usize = 64;

#[derive(Debug)]
pub enum SandboxRequest {
    Load {
        module_id: String,
        bytes: Vec<u8>,
    },
    Execute {
        execution_id: String,
        module_id: String,
        input: serde_json::Value,
    },
    Unload {
        module_id: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxResponse {
    LoadResult {
        module_id: String,
        success: bool,
        /// Compiler diagnostic when `success` is false.
        error: Option<String>,
    },
    ExecutionResult {
        execution_id: String,
        result: serde_json::Value,
    },
    Unloaded {
        module_id: String,
        existed: bool,
    },
    Error(SandboxError),
}

struct Envelope {
    request: SandboxRequest,
    reply: oneshot::Sender<SandboxResponse>,
}

/// Cloneable client for a running sandbox worker.
#[derive(Clone)]
pub struct SandboxHandle {
    tx: mpsc::Sender<Envelope>,
    next_execution: Arc<AtomicU64>,
}

/// Move `engine` onto a dedicated thread with its own single-threaded
/// tokio runtime and return a handle to it.
pub fn spawn_worker(engine: SandboxEngine) -> SandboxResult<SandboxHandle> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| SandboxError::Engine(format!("failed to build worker runtime: {e}")))?;
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);

    thread::Builder::new()
        .name("edgeflow-sandbox".to_string())
        .spawn(move || runtime.block_on(run(engine, rx)))
        .map_err(|e| SandboxError::Engine(format!("failed to start sandbox worker: {e}")))?;

    Ok(SandboxHandle {
        tx,
        next_execution: Arc::new(AtomicU64::new(1)),
    })
}

async fn run(mut engine: SandboxEngine, mut rx: mpsc::Receiver<Envelope>) {
    info!("sandbox worker started");
    while let Some(Envelope { request, reply }) = rx.recv().await {
        let response = handle(&mut engine, request).await;
        if reply.send(response).is_err() {
            debug!("sandbox caller went away before the reply");
        }
    }
    info!("sandbox worker stopped");
}

async fn handle(engine: &mut SandboxEngine, request: SandboxRequest) -> SandboxResponse {
    match request {
        SandboxRequest::Load { module_id, bytes } => match engine.load(&module_id, &bytes) {
            Ok(()) => SandboxResponse::LoadResult {
                module_id,
                success: true,
                error: None,
            },
            Err(e) => {
                error!(%module_id, error = %e, "module compilation failed");
                SandboxResponse::LoadResult {
                    module_id,
                    success: false,
                    error: Some(e.to_string()),
                }
            }
        },
        SandboxRequest::Execute {
            execution_id,
            module_id,
            input,
        } => match engine.execute(&module_id, &input).await {
            Ok(result) => SandboxResponse::ExecutionResult {
                execution_id,
                result,
            },
            Err(e) => SandboxResponse::Error(e),
        },
        SandboxRequest::Unload { module_id } => {
            let existed = engine.unload(&module_id);
            SandboxResponse::Unloaded { module_id, existed }
        }
    }
}

impl SandboxHandle {
    /// Send a raw request and wait for its response.
    pub async fn request(&self, request: SandboxRequest) -> SandboxResult<SandboxResponse> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope { request, reply })
            .await
            .map_err(|_| SandboxError::WorkerUnavailable)?;
        rx.await.map_err(|_| SandboxError::WorkerUnavailable)
    }

    pub async fn load(&self, module_id: &str, bytes: Vec<u8>) -> SandboxResult<()> {
        let response = self
            .request(SandboxRequest::Load {
                module_id: module_id.to_string(),
                bytes,
            })
            .await?;
        match response {
            SandboxResponse::LoadResult { success: true, .. } => Ok(()),
            SandboxResponse::LoadResult { error, .. } => Err(SandboxError::Compile {
                module_id: module_id.to_string(),
                message: error.unwrap_or_else(|| "compilation failed".to_string()),
            }),
            other => Err(unexpected(other)),
        }
    }

    pub async fn execute(
        &self,
        module_id: &str,
        input: serde_json::Value,
    ) -> SandboxResult<serde_json::Value> {
        let execution_id = format!("exec-{}", self.next_execution.fetch_add(1, Ordering::Relaxed));
        let response = self
            .request(SandboxRequest::Execute {
                execution_id: execution_id.clone(),
                module_id: module_id.to_string(),
                input,
            })
            .await?;
        match response {
            SandboxResponse::ExecutionResult {
                execution_id: id,
                result,
            } if id == execution_id => Ok(result),
            SandboxResponse::Error(e) => Err(e),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unload(&self, module_id: &str) -> SandboxResult<bool> {
        let response = self
            .request(SandboxRequest::Unload {
                module_id: module_id.to_string(),
            })
            .await?;
        match response {
            SandboxResponse::Unloaded { existed, .. } => Ok(existed),
            SandboxResponse::Error(e) => Err(e),
            other => Err(unexpected(other)),
        }
    }
}

fn unexpected(response: SandboxResponse) -> SandboxError {
    error!(?response, "unexpected sandbox response");
    SandboxError::WorkerUnavailable
}
