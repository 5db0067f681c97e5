//! FunctionHost — deployed-function registry and invocation.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, RwLock, watch};
use tracing::{debug, error, info, warn};

use edgeflow_core::{DeployRequest, FunctionId, RuntimeKind, TaskId, epoch_millis};
use edgeflow_sandbox::{SandboxError, SandboxHandle};

use crate::config::HostConfig;
use crate::error::{HostError, HostResult};
use crate::health::{HealthReport, MemoryStats};
use crate::process::run_function;

const MAX_ID_LEN: usize = 128;

/// Edge-side metadata for one deployed function.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionRecord {
    pub id: FunctionId,
    pub name: String,
    pub runtime: RuntimeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    /// Unix millis of the last successful invocation, or of the deploy.
    pub last_used: u64,
    pub invocations: u64,
}

/// Owns the function table and the body files under `functions_dir`.
#[derive(Clone)]
pub struct FunctionHost {
    config: Arc<HostConfig>,
    functions: Arc<RwLock<HashMap<FunctionId, FunctionRecord>>>,
    /// Held while body files and their records change together.
    disk: Arc<Mutex<()>>,
    sandbox: Option<SandboxHandle>,
}

impl FunctionHost {
    /// Without a sandbox handle, `wasm` deploys are rejected.
    pub fn new(config: HostConfig, sandbox: Option<SandboxHandle>) -> Self {
        Self {
            config: Arc::new(config),
            functions: Arc::new(RwLock::new(HashMap::new())),
            disk: Arc::new(Mutex::new(())),
            sandbox,
        }
    }

    /// Persist the body and create (or replace) the function's record with
    /// fresh stats.
    pub async fn deploy(&self, request: DeployRequest) -> HostResult<()> {
        validate_id(&request.id)?;
        let path = self.config.body_path(&request.id, request.runtime);

        let body = match request.runtime {
            RuntimeKind::Wasm => {
                if self.sandbox.is_none() {
                    return Err(HostError::RuntimeUnavailable(RuntimeKind::Wasm));
                }
                STANDARD
                    .decode(request.code.trim())
                    .map_err(|e| HostError::InvalidCode(format!("wasm code is not base64: {e}")))?
            }
            runtime => {
                if self.config.interpreter(runtime).is_none() {
                    return Err(HostError::RuntimeUnavailable(runtime));
                }
                request.code.into_bytes()
            }
        };

        let _disk = self.disk.lock().await;

        // Compile before touching disk so a bad module never replaces a
        // working body.
        if let (RuntimeKind::Wasm, Some(sandbox)) = (request.runtime, &self.sandbox) {
            sandbox.load(&request.id, body.clone()).await?;
        }

        if let Err(source) = tokio::fs::write(&path, &body).await {
            if request.runtime == RuntimeKind::Wasm {
                // Drop the new module; the next invoke reloads whatever body is on disk.
                self.unload_module(&request.id).await;
            }
            return Err(HostError::Io { path, source });
        }

        let previous = self.functions.read().await.get(&request.id).map(|r| r.runtime);
        if let Some(old) = previous.filter(|old| *old != request.runtime) {
            self.discard_body(&request.id, old).await;
        }

        let record = FunctionRecord {
            id: request.id.clone(),
            name: request.name,
            runtime: request.runtime,
            task_id: request.task_id,
            last_used: epoch_millis(),
            invocations: 0,
        };
        info!(function_id = %record.id, name = %record.name, runtime = %record.runtime, "deployed function");
        self.functions.write().await.insert(request.id, record);
        Ok(())
    }

    /// Run function `id` on `input` and return its result with invocation
    /// metadata attached.
    ///
    /// Object results get a `metadata` field; a `metadata` field produced by
    /// the function itself is replaced. Any other result is wrapped as
    /// `{"result": ..., "metadata": ...}`.
    pub async fn invoke(&self, id: &str, input: Value) -> HostResult<Value> {
        let record = self
            .functions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| HostError::NotFound(id.to_string()))?;

        let started = Instant::now();
        let result = match record.runtime {
            RuntimeKind::Wasm => self.invoke_wasm(id, input).await,
            runtime => self.invoke_process(id, runtime, &input).await,
        };
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!(function_id = %id, error = %e, "function execution failed");
                return Err(e);
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;

        let invocations = {
            let mut functions = self.functions.write().await;
            match functions.get_mut(id) {
                Some(record) => {
                    record.invocations += 1;
                    record.last_used = epoch_millis();
                    record.invocations
                }
                // Evicted or redeployed away while running.
                None => record.invocations + 1,
            }
        };
        info!(function_id = %id, duration_ms, invocations, "executed function");

        Ok(with_metadata(result, id, duration_ms, invocations))
    }

    async fn invoke_process(&self, id: &str, runtime: RuntimeKind, input: &Value) -> HostResult<Value> {
        let program = self
            .config
            .interpreter(runtime)
            .ok_or(HostError::RuntimeUnavailable(runtime))?;
        let payload = serde_json::to_vec(input)
            .map_err(|e| HostError::ExecutionError(format!("failed to encode input: {e}")))?;
        let path = self.config.body_path(id, runtime);
        run_function(program, &path, &payload, self.config.invoke_timeout).await
    }

    async fn invoke_wasm(&self, id: &str, input: Value) -> HostResult<Value> {
        let sandbox = self
            .sandbox
            .as_ref()
            .ok_or(HostError::RuntimeUnavailable(RuntimeKind::Wasm))?;
        match sandbox.execute(id, input.clone()).await {
            // The sandbox cache is bounded; recompile from the body file.
            Err(SandboxError::NotLoaded(_)) => {
                let path = self.config.body_path(id, RuntimeKind::Wasm);
                debug!(function_id = %id, "module not cached, reloading from disk");
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| HostError::Io { path, source })?;
                sandbox.load(id, bytes).await?;
                Ok(sandbox.execute(id, input).await?)
            }
            other => Ok(other?),
        }
    }

    /// Evict every function idle for longer than the retention window.
    pub async fn evict_idle(&self) -> Vec<FunctionId> {
        self.evict_idle_at(epoch_millis()).await
    }

    /// One eviction sweep as of `now` (Unix millis). Returns the evicted ids.
    ///
    /// A body file that is already gone is logged and its record removed;
    /// any other I/O failure keeps the record for the next sweep.
    pub async fn evict_idle_at(&self, now: u64) -> Vec<FunctionId> {
        let retention = self.config.idle_retention.as_millis() as u64;
        let stale: Vec<FunctionRecord> = self
            .functions
            .read()
            .await
            .values()
            .filter(|r| now.saturating_sub(r.last_used) > retention)
            .cloned()
            .collect();

        let mut evicted = Vec::new();
        for record in stale {
            let _disk = self.disk.lock().await;

            // Skip records touched or redeployed since the scan.
            let removed = {
                let mut functions = self.functions.write().await;
                let unchanged = functions
                    .get(&record.id)
                    .is_some_and(|current| current.last_used == record.last_used);
                if unchanged { functions.remove(&record.id) } else { None }
            };
            let Some(removed) = removed else {
                debug!(function_id = %record.id, "function used since scan, not evicting");
                continue;
            };

            let path = self.config.body_path(&removed.id, removed.runtime);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(function_id = %removed.id, path = %path.display(), "body file already removed");
                }
                Err(e) => {
                    warn!(function_id = %removed.id, path = %path.display(), error = %e, "eviction failed, keeping function");
                    self.functions.write().await.insert(removed.id.clone(), removed);
                    continue;
                }
            }

            if removed.runtime == RuntimeKind::Wasm {
                self.unload_module(&removed.id).await;
            }
            info!(function_id = %removed.id, "evicted idle function");
            evicted.push(removed.id);
        }
        evicted
    }

    /// Sweep on `eviction_interval` until `shutdown` fires.
    pub async fn run_eviction(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.eviction_interval.as_secs(),
            retention_secs = self.config.idle_retention.as_secs(),
            "idle eviction started"
        );
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.eviction_interval) => {
                    let evicted = self.evict_idle().await;
                    debug!(count = evicted.len(), "eviction sweep finished");
                }
                _ = shutdown.changed() => {
                    info!("idle eviction shutting down");
                    break;
                }
            }
        }
    }

    pub async fn get(&self, id: &str) -> Option<FunctionRecord> {
        self.functions.read().await.get(id).cloned()
    }

    pub async fn function_count(&self) -> usize {
        self.functions.read().await.len()
    }

    pub async fn health(&self) -> HealthReport {
        HealthReport {
            status: "healthy",
            function_count: self.function_count().await,
            process_memory_stats: MemoryStats::current(),
        }
    }

    async fn discard_body(&self, id: &str, runtime: RuntimeKind) {
        let path = self.config.body_path(id, runtime);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != ErrorKind::NotFound {
                warn!(function_id = %id, path = %path.display(), error = %e, "failed to remove replaced body");
            }
        }
        if runtime == RuntimeKind::Wasm {
            self.unload_module(id).await;
        }
    }

    async fn unload_module(&self, id: &str) {
        if let Some(sandbox) = &self.sandbox {
            if let Err(e) = sandbox.unload(id).await {
                warn!(function_id = %id, error = %e, "failed to unload module");
            }
        }
    }
}

/// Function ids name files, so they are restricted to a safe alphabet.
pub fn validate_id(id: &str) -> HostResult<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_ID_LEN
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid {
        Ok(())
    } else {
        Err(HostError::InvalidId(id.to_string()))
    }
}

fn with_metadata(result: Value, id: &str, duration_ms: u64, invocations: u64) -> Value {
    let metadata = json!({
        "functionId": id,
        "durationMs": duration_ms,
        "invocations": invocations,
    });
    match result {
        Value::Object(mut map) => {
            map.insert("metadata".to_string(), metadata);
            Value::Object(map)
        }
        other => json!({ "result": other, "metadata": metadata }),
    }
}
