//! GuestInstance — one instantiation of a cached module, used for exactly
//! one call.
//!
//! The host and guest exchange data through the guest's linear memory:
//!
//! ```text
//! ptr = alloc(len)                 ; 0 means allocation failed
//! memory[ptr..ptr+len] = input
//! out = process(ptr, len)
//! n   = u32::from_le(memory[out..out+4])
//! output = memory[out+4..out+4+n]
//! dealloc(ptr, len); dealloc(out, n + 4)
//! ```
//!
//! `malloc` / `free(ptr)` are accepted in place of `alloc` / `dealloc`.

use wasmtime::{Instance, Linker, Memory, Module, Store, TypedFunc};
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::p1::WasiP1Ctx;

use crate::error::{SandboxError, SandboxResult};
use crate::limiter::SandboxLimiter;

/// Size of the little-endian length header in front of every output buffer.
pub const LENGTH_PREFIX: usize = 4;

/// Per-instance store data.
pub struct GuestState {
    pub(crate) wasi: WasiP1Ctx,
    pub(crate) limiter: SandboxLimiter,
}

impl GuestState {
    /// WASI context with no preopens, no environment and no arguments.
    /// Only stderr is wired through so guest diagnostics reach the log.
    pub fn minimal(memory_limit: usize) -> Self {
        let wasi = WasiCtxBuilder::new().inherit_stderr().build_p1();
        Self {
            wasi,
            limiter: SandboxLimiter::new(memory_limit),
        }
    }
}

enum Deallocator {
    /// `dealloc(ptr, len)`
    Sized(TypedFunc<(i32, i32), ()>),
    /// `free(ptr)`
    Free(TypedFunc<i32, ()>),
}

struct GuestAbi {
    memory: Memory,
    alloc: TypedFunc<i32, i32>,
    dealloc: Deallocator,
    process: TypedFunc<(i32, i32), i32>,
}

pub struct GuestInstance {
    store: Store<GuestState>,
    abi: GuestAbi,
}

impl GuestInstance {
    /// Instantiate `module` and resolve the exports the call protocol needs.
    pub async fn new(
        linker: &Linker<GuestState>,
        module: &Module,
        memory_limit: usize,
    ) -> SandboxResult<Self> {
        let mut store = Store::new(module.engine(), GuestState::minimal(memory_limit));
        store.limiter(|state| &mut state.limiter);
        // Yield back to tokio on every epoch tick so the caller's timeout
        // can fire even while the guest spins.
        store.set_epoch_deadline(1);
        store.epoch_deadline_async_yield_and_update(1);

        let instance = linker
            .instantiate_async(&mut store, module)
            .await
            .map_err(|e| SandboxError::Instantiation(format!("{e:#}")))?;

        // Reactor-style WASI modules need their constructors run first.
        if let Some(init) = instance.get_func(&mut store, "_initialize") {
            let init = init.typed::<(), ()>(&store).map_err(|e| signature("_initialize", e))?;
            init.call_async(&mut store, ())
                .await
                .map_err(|e| SandboxError::Trap(format!("{e:#}")))?;
        }

        let abi = GuestAbi::resolve(&instance, &mut store)?;
        Ok(Self { store, abi })
    }

    /// Run one alloc/write/process/read/free round trip.
    pub async fn call(&mut self, input: &[u8]) -> SandboxResult<Vec<u8>> {
        let len = i32::try_from(input.len())
            .map_err(|_| SandboxError::Encode(format!("input of {} bytes is too large", input.len())))?;

        let ptr = self
            .abi
            .alloc
            .call_async(&mut self.store, len)
            .await
            .map_err(trap)?;
        if ptr == 0 {
            return Err(SandboxError::AllocationFailed(input.len()));
        }

        self.abi
            .memory
            .write(&mut self.store, offset(ptr), input)
            .map_err(|e| SandboxError::MemoryAccess(format!("writing input at {ptr}: {e}")))?;

        let out = self
            .abi
            .process
            .call_async(&mut self.store, (ptr, len))
            .await
            .map_err(trap)?;

        let output = self.read_output(out)?;

        let out_len = i32::try_from(output.len() + LENGTH_PREFIX)
            .map_err(|_| SandboxError::MemoryAccess(format!("output at {out} is too large")))?;
        self.free(ptr, len).await?;
        self.free(out, out_len).await?;

        Ok(output)
    }

    fn read_output(&self, out: i32) -> SandboxResult<Vec<u8>> {
        let start = offset(out);
        let mut header = [0u8; LENGTH_PREFIX];
        self.abi
            .memory
            .read(&self.store, start, &mut header)
            .map_err(|e| SandboxError::MemoryAccess(format!("reading output header at {out}: {e}")))?;
        let len = u32::from_le_bytes(header) as usize;

        let size = self.abi.memory.data_size(&self.store);
        let end = start
            .checked_add(LENGTH_PREFIX)
            .and_then(|p| p.checked_add(len))
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                SandboxError::MemoryAccess(format!(
                    "output of {len} bytes at {out} exceeds memory size {size}"
                ))
            })?;

        Ok(self.abi.memory.data(&self.store)[start + LENGTH_PREFIX..end].to_vec())
    }

    async fn free(&mut self, ptr: i32, len: i32) -> SandboxResult<()> {
        match &self.abi.dealloc {
            Deallocator::Sized(f) => f.call_async(&mut self.store, (ptr, len)).await,
            Deallocator::Free(f) => f.call_async(&mut self.store, ptr).await,
        }
        .map_err(trap)
    }
}

impl GuestAbi {
    fn resolve(instance: &Instance, store: &mut Store<GuestState>) -> SandboxResult<Self> {
        let memory = instance.get_memory(&mut *store, "memory");
        let alloc = instance
            .get_func(&mut *store, "alloc")
            .map(|f| ("alloc", f))
            .or_else(|| instance.get_func(&mut *store, "malloc").map(|f| ("malloc", f)));
        let dealloc = instance
            .get_func(&mut *store, "dealloc")
            .map(|f| ("dealloc", f))
            .or_else(|| instance.get_func(&mut *store, "free").map(|f| ("free", f)));
        let process = instance.get_func(&mut *store, "process");

        let mut missing = Vec::new();
        if memory.is_none() {
            missing.push("memory".to_string());
        }
        if alloc.is_none() {
            missing.push("alloc".to_string());
        }
        if dealloc.is_none() {
            missing.push("dealloc".to_string());
        }
        if process.is_none() {
            missing.push("process".to_string());
        }
        let (Some(memory), Some((alloc_name, alloc)), Some((dealloc_name, dealloc)), Some(process)) =
            (memory, alloc, dealloc, process)
        else {
            return Err(SandboxError::MissingExports(missing));
        };

        let alloc = alloc
            .typed::<i32, i32>(&*store)
            .map_err(|e| signature(alloc_name, e))?;
        let dealloc = if dealloc_name == "free" {
            Deallocator::Free(
                dealloc
                    .typed::<i32, ()>(&*store)
                    .map_err(|e| signature(dealloc_name, e))?,
            )
        } else {
            Deallocator::Sized(
                dealloc
                    .typed::<(i32, i32), ()>(&*store)
                    .map_err(|e| signature(dealloc_name, e))?,
            )
        };
        let process = process
            .typed::<(i32, i32), i32>(&*store)
            .map_err(|e| signature("process", e))?;

        Ok(Self {
            memory,
            alloc,
            dealloc,
            process,
        })
    }
}

/// Guest pointers are unsigned 32-bit offsets carried in an `i32`.
fn offset(ptr: i32) -> usize {
    ptr as u32 as usize
}

fn trap(e: wasmtime::Error) -> SandboxError {
    SandboxError::Trap(format!("{e:#}"))
}

fn signature(name: &str, e: wasmtime::Error) -> SandboxError {
    SandboxError::ExportSignature {
        name: name.to_string(),
        message: format!("{e:#}"),
    }
}
