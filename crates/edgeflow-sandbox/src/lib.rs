//! edgeflow-sandbox — Wasmtime sandbox for compiled function modules.
//!
//! Guest modules are plain core wasm modules exporting a small ABI:
//! `memory`, `alloc`/`malloc`, `dealloc`/`free` and `process`. The engine
//! compiles them once, caches them in an LRU, and gives every execute call
//! its own fresh instance bounded by a wall-clock timeout.
//!
//! # Architecture
//!
//! ```text
//! SandboxHandle (cloneable, used by the function host)
//!   └── mpsc ──► sandbox worker thread (one request at a time)
//!                  └── SandboxEngine
//!                        ├── wasmtime::Engine (async + epoch interruption)
//!                        ├── Linker<GuestState> (WASI preview 1, no preopens)
//!                        ├── LruCache<module id, Module>
//!                        └── GuestInstance per execute
//!                              ├── SandboxLimiter (memory cap)
//!                              └── alloc → write → process → read → free
//! ```

pub mod engine;
pub mod error;
pub mod instance;
pub mod limiter;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
#[doc(hidden)]
pub mod fixtures;

pub use engine::{SandboxConfig, SandboxEngine};
pub use error::{SandboxError, SandboxResult};
pub use instance::LENGTH_PREFIX;
pub use worker::{SandboxHandle, SandboxRequest, SandboxResponse, spawn_worker};
