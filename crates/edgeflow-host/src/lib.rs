//! edgeflow-host — the edge node's function lifecycle.
//!
//! `FunctionHost` stores deployed function bodies under a functions
//! directory, runs them per request, and evicts functions that have sat
//! idle past the retention window.
//!
//! ```text
//! FunctionHost
//!   ├── FunctionRecord table (RwLock<HashMap>)
//!   ├── <functions_dir>/<id>.<ext> body files
//!   ├── node / python / shell → child process, stdin in, stdout out, timeout
//!   ├── wasm → SandboxHandle (load on deploy, execute on invoke)
//!   └── eviction loop (interval + watch shutdown)
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod host;
pub mod process;

pub use config::HostConfig;
pub use error::{HostError, HostResult};
pub use health::{HealthReport, MemoryStats};
pub use host::{FunctionHost, FunctionRecord, validate_id};
