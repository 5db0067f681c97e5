//! SandboxEngine — compiles guest modules and runs them under a deadline.

use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;

use lru::LruCache;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Linker, Module};

use edgeflow_core::config::SandboxSection;

use crate::error::{SandboxError, SandboxResult};
use crate::instance::{GuestInstance, GuestState};

/// Interval between epoch increments; bounds how late a timeout can fire.
const EPOCH_TICK: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    /// Wall-clock budget for one execute, instantiation through decode.
    pub execution_timeout: Duration,
    /// Linear memory cap per instance, in bytes.
    pub memory_limit: usize,
    /// Compiled modules kept before the least recently used one is dropped.
    pub cache_capacity: NonZeroUsize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::from_section(&SandboxSection::default())
    }
}

impl SandboxConfig {
    pub fn from_section(section: &SandboxSection) -> Self {
        Self {
            execution_timeout: Duration::from_millis(section.execution_timeout_ms),
            memory_limit: section.memory_limit_bytes,
            cache_capacity: NonZeroUsize::new(section.cache_capacity).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Owns the wasmtime engine, the WASI linker and the module cache.
///
/// Not shared: the sandbox worker holds the only instance and serves
/// requests one at a time, so every method takes `&mut self`.
pub struct SandboxEngine {
    engine: Engine,
    linker: Linker<GuestState>,
    modules: LruCache<String, Module>,
    config: SandboxConfig,
}

impl SandboxEngine {
    pub fn new(config: SandboxConfig) -> SandboxResult<Self> {
        let mut wasm_config = Config::new();
        wasm_config.async_support(true);
        wasm_config.epoch_interruption(true);

        let engine = Engine::new(&wasm_config).map_err(|e| SandboxError::Engine(format!("{e:#}")))?;

        let mut linker = Linker::new(&engine);
        wasmtime_wasi::p1::add_to_linker_async(&mut linker, |state: &mut GuestState| &mut state.wasi)
            .map_err(|e| SandboxError::Engine(format!("{e:#}")))?;

        spawn_epoch_ticker(&engine)?;

        info!(
            timeout_ms = config.execution_timeout.as_millis() as u64,
            memory_limit = config.memory_limit,
            cache_capacity = config.cache_capacity.get(),
            "sandbox engine initialized"
        );

        Ok(Self {
            engine,
            linker,
            modules: LruCache::new(config.cache_capacity),
            config,
        })
    }

    /// Compile `bytes` and cache the result under `module_id`.
    ///
    /// A compile failure leaves the cache untouched, including any module
    /// previously stored under the same id.
    pub fn load(&mut self, module_id: &str, bytes: &[u8]) -> SandboxResult<()> {
        let module = Module::new(&self.engine, bytes).map_err(|e| SandboxError::Compile {
            module_id: module_id.to_string(),
            message: format!("{e:#}"),
        })?;

        if let Some((evicted, _)) = self.modules.push(module_id.to_string(), module) {
            if evicted != module_id {
                debug!(module_id = %evicted, "evicted least recently used module");
            }
        }
        info!(%module_id, size = bytes.len(), "compiled wasm module");
        Ok(())
    }

    /// Drop a cached module. Returns whether it was present.
    pub fn unload(&mut self, module_id: &str) -> bool {
        let existed = self.modules.pop(module_id).is_some();
        if existed {
            info!(%module_id, "unloaded wasm module");
        }
        existed
    }

    pub fn is_loaded(&self, module_id: &str) -> bool {
        self.modules.contains(module_id)
    }

    /// Cached module ids, most recently used first.
    pub fn cached_modules(&self) -> Vec<String> {
        self.modules.iter().map(|(id, _)| id.clone()).collect()
    }

    /// Serialize `input` as JSON, run it through the module and decode the
    /// module's output as JSON.
    pub async fn execute(
        &mut self,
        module_id: &str,
        input: &serde_json::Value,
    ) -> SandboxResult<serde_json::Value> {
        let bytes = serde_json::to_vec(input).map_err(|e| SandboxError::Encode(e.to_string()))?;
        let module = self.module(module_id)?;
        self.with_deadline(module_id, async {
            let output = self.run(&module, &bytes).await?;
            serde_json::from_slice(&output).map_err(|e| SandboxError::Decode(e.to_string()))
        })
        .await
    }

    /// Run already-serialized input through the module and return the raw
    /// output payload.
    pub async fn execute_raw(&mut self, module_id: &str, input: &[u8]) -> SandboxResult<Vec<u8>> {
        let module = self.module(module_id)?;
        self.with_deadline(module_id, self.run(&module, input)).await
    }

    fn module(&mut self, module_id: &str) -> SandboxResult<Module> {
        self.modules
            .get(module_id)
            .cloned()
            .ok_or_else(|| SandboxError::NotLoaded(module_id.to_string()))
    }

    async fn run(&self, module: &Module, input: &[u8]) -> SandboxResult<Vec<u8>> {
        let mut instance = GuestInstance::new(&self.linker, module, self.config.memory_limit).await?;
        instance.call(input).await
    }

    /// Bound `fut` by the execution timeout. On expiry the future, and the
    /// instance it owns, is dropped.
    async fn with_deadline<T>(
        &self,
        module_id: &str,
        fut: impl Future<Output = SandboxResult<T>>,
    ) -> SandboxResult<T> {
        let timeout = self.config.execution_timeout;
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => {
                if let Err(e) = &result {
                    warn!(%module_id, error = %e, "wasm execution failed");
                }
                result
            }
            Err(_) => {
                warn!(%module_id, ?timeout, "wasm execution timed out");
                Err(SandboxError::Timeout(timeout))
            }
        }
    }
}

/// Advance the engine epoch until the engine is dropped.
fn spawn_epoch_ticker(engine: &Engine) -> SandboxResult<()> {
    let weak = engine.weak();
    thread::Builder::new()
        .name("edgeflow-epoch".to_string())
        .spawn(move || {
            while let Some(engine) = weak.upgrade() {
                engine.increment_epoch();
                drop(engine);
                thread::sleep(EPOCH_TICK);
            }
        })
        .map(|_| ())
        .map_err(|e| SandboxError::Engine(format!("failed to start epoch ticker: {e}")))
}
