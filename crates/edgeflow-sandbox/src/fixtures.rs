//! WAT guests shared by the sandbox, host and daemon tests.

/// Echoes its input back. Bump allocator starting at 1024, `dealloc` is a
/// no-op.
pub const ECHO: &str = r#"
(module
  (memory (export "memory") 8)
  (global $next (mut i32) (i32.const 1024))
  (func $alloc (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    global.get $next
    local.set $ptr
    global.get $next
    local.get $len
    i32.add
    global.set $next
    local.get $ptr)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param $ptr i32) (param $len i32) (result i32)
    (local $out i32)
    local.get $len
    i32.const 4
    i32.add
    call $alloc
    local.set $out
    local.get $out
    local.get $len
    i32.store
    local.get $out
    i32.const 4
    i32.add
    local.get $ptr
    local.get $len
    memory.copy
    local.get $out))
"#;

/// Same as `ECHO` but with the libc-style `malloc` / `free(ptr)` names, and
/// a WASI import to check the preview 1 linker.
pub const ECHO_MALLOC: &str = r#"
(module
  (import "wasi_snapshot_preview1" "proc_exit" (func $exit (param i32)))
  (memory (export "memory") 2)
  (global $next (mut i32) (i32.const 1024))
  (global $frees (mut i32) (i32.const 0))
  (func $malloc (export "malloc") (param $len i32) (result i32)
    (local $ptr i32)
    global.get $next
    local.set $ptr
    global.get $next
    local.get $len
    i32.add
    global.set $next
    local.get $ptr)
  (func (export "free") (param i32)
    global.get $frees
    i32.const 1
    i32.add
    global.set $frees)
  (func (export "process") (param $ptr i32) (param $len i32) (result i32)
    (local $out i32)
    local.get $len
    i32.const 4
    i32.add
    call $malloc
    local.set $out
    local.get $out
    local.get $len
    i32.store
    local.get $out
    i32.const 4
    i32.add
    local.get $ptr
    local.get $len
    memory.copy
    local.get $out))
"#;

pub const NO_PROCESS: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32)))
"#;

pub const NULL_ALLOC: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 0)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32) i32.const 0))
"#;

pub const SPIN: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32)
    (loop $forever
      br $forever)
    i32.const 0))
"#;

/// Returns an output pointer just below the 4 GiB boundary.
pub const BAD_OUTPUT_POINTER: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32) i32.const -16))
"#;

/// Returns the four bytes `nope`, length-prefixed.
pub const NOT_JSON: &str = r#"
(module
  (memory (export "memory") 1)
  (data (i32.const 16) "\04\00\00\00nope")
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32) i32.const 16))
"#;

pub const WRONG_ALLOC_SIGNATURE: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i64) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32) i32.const 0))
"#;

pub const TRAPS: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "alloc") (param i32) (result i32) i32.const 1024)
  (func (export "dealloc") (param i32 i32))
  (func (export "process") (param i32 i32) (result i32) unreachable))
"#;

pub fn wasm(wat_text: &str) -> Vec<u8> {
    wat::parse_str(wat_text).expect("fixture WAT must parse")
}
