//! SandboxLimiter — memory and table caps for guest instances.

use wasmtime::ResourceLimiter;

/// Table elements a guest may allocate.
pub const DEFAULT_TABLE_LIMIT: usize = 10_000;

/// Per-instance resource limiter.
///
/// A guest growing past its limit sees `memory.grow` return -1; the
/// instance keeps running.
pub struct SandboxLimiter {
    memory_limit: usize,
    table_limit: usize,
    /// High-water mark reported by wasmtime.
    memory_used: usize,
}

impl SandboxLimiter {
    pub fn new(memory_limit: usize) -> Self {
        Self {
            memory_limit,
            table_limit: DEFAULT_TABLE_LIMIT,
            memory_used: 0,
        }
    }
}

impl ResourceLimiter for SandboxLimiter {
    fn memory_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.memory_limit {
            tracing::warn!(
                current,
                desired,
                peak = self.memory_used,
                limit = self.memory_limit,
                "guest memory growth denied"
            );
            return Ok(false);
        }
        self.memory_used = desired;
        Ok(true)
    }

    fn table_growing(
        &mut self,
        current: usize,
        desired: usize,
        _maximum: Option<usize>,
    ) -> wasmtime::Result<bool> {
        if desired > self.table_limit {
            tracing::warn!(
                current,
                desired,
                limit = self.table_limit,
                "guest table growth denied"
            );
            return Ok(false);
        }
        Ok(true)
    }
}
