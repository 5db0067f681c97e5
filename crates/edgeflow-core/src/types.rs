//! Shared types used across edgeflow crates.
//!
//! These are the wire-level shapes exchanged between the orchestrator and
//! the edge nodes. Field names follow the JSON the edge HTTP surface
//! speaks (`camelCase` where the original payloads used it).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for an edge node.
pub type NodeId = String;

/// Unique identifier for a deployed function.
pub type FunctionId = String;

/// Unique identifier for a placement task.
pub type TaskId = String;

// ── Nodes ─────────────────────────────────────────────────────────

/// Resources an edge node advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeResources {
    /// Memory capacity in bytes.
    #[serde(alias = "memoryCapacity")]
    pub memory: u64,
    /// Number of CPUs.
    #[serde(alias = "cpuCount")]
    pub cpus: u32,
}

/// A remote host capable of executing deployed functions.
///
/// Immutable once registered; re-registration replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeNode {
    pub id: NodeId,
    /// Host name or IP the node's HTTP surface listens on.
    #[serde(alias = "ip")]
    pub address: String,
    pub port: u16,
    pub resources: NodeResources,
}

impl EdgeNode {
    /// `host:port` authority for this node.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Resource requirements of a function. Absent fields mean "no requirement".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
}

impl Requirements {
    /// Whether `resources` satisfies every stated requirement.
    pub fn satisfied_by(&self, resources: &NodeResources) -> bool {
        resources.memory >= self.memory.unwrap_or(0) && resources.cpus >= self.cpus.unwrap_or(0)
    }
}

// ── Functions ─────────────────────────────────────────────────────

/// How an edge node runs a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// JavaScript executed by an out-of-process `node` interpreter.
    Node,
    /// Python executed by an out-of-process interpreter.
    Python,
    /// POSIX shell script.
    Shell,
    /// Compiled sandboxed module; `code` is base64-encoded module bytes.
    Wasm,
}

impl RuntimeKind {
    /// File extension used when persisting a body of this kind.
    pub fn extension(&self) -> &'static str {
        match self {
            RuntimeKind::Node => "js",
            RuntimeKind::Python => "py",
            RuntimeKind::Shell => "sh",
            RuntimeKind::Wasm => "wasm",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RuntimeKind::Node => "node",
            RuntimeKind::Python => "python",
            RuntimeKind::Shell => "shell",
            RuntimeKind::Wasm => "wasm",
        };
        f.write_str(name)
    }
}

/// A function submitted to the orchestrator for placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub id: FunctionId,
    pub name: String,
    pub code: String,
    pub runtime: RuntimeKind,
    #[serde(default)]
    pub requirements: Requirements,
}

/// Body of the edge node's deploy endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub id: FunctionId,
    pub name: String,
    pub code: String,
    pub runtime: RuntimeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl DeployRequest {
    /// Build the deploy payload for a function spec and the task placing it.
    pub fn for_task(spec: &FunctionSpec, task_id: &str) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            code: spec.code.clone(),
            runtime: spec.runtime,
            task_id: Some(task_id.to_string()),
        }
    }
}

/// Current Unix time in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
