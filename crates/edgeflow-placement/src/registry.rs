//! Node registry — tracks edge nodes and their live status.
//!
//! Every registered `EdgeNode` has exactly one `NodeStatus`, created in the
//! same write as the node itself. Iteration order is registration order,
//! which placement relies on for its tie-break.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use edgeflow_core::{EdgeNode, NodeResources, Requirements, epoch_millis};

use crate::placer::select_node;

/// Mutable per-node record. Owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    /// Unix millis of the last registration or status update.
    pub last_heartbeat: u64,
    pub resources: NodeResources,
    /// Self-reported load in `[0, 1]`.
    pub current_load: f64,
}

/// Partial status update from a heartbeat or load report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    #[serde(default)]
    pub resources: Option<NodeResources>,
    #[serde(default)]
    pub current_load: Option<f64>,
}

/// Read-only view of one registered node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node: EdgeNode,
    pub status: NodeStatus,
}

/// Registry of known edge nodes.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct NodeRegistry {
    entries: Arc<RwLock<Vec<NodeSnapshot>>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a node and reset its status.
    ///
    /// A re-registered node keeps its original position.
    pub async fn register(&self, node: EdgeNode) {
        let status = NodeStatus {
            last_heartbeat: epoch_millis(),
            resources: node.resources,
            current_load: 0.0,
        };
        let node_id = node.id.clone();

        let mut entries = self.entries.write().await;
        match entries.iter_mut().find(|e| e.node.id == node_id) {
            Some(entry) => {
                entry.node = node;
                entry.status = status;
                info!(%node_id, "re-registered edge node");
            }
            None => {
                entries.push(NodeSnapshot { node, status });
                info!(%node_id, "registered edge node");
            }
        }
    }

    /// Merge `update` into the node's status and refresh its heartbeat.
    ///
    /// Returns `false` (and changes nothing) for an unknown node.
    pub async fn update_status(&self, node_id: &str, update: StatusUpdate) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.node.id == node_id) else {
            debug!(%node_id, "status update for unknown node ignored");
            return false;
        };

        if let Some(resources) = update.resources {
            entry.status.resources = resources;
        }
        if let Some(load) = update.current_load {
            entry.status.current_load = clamp_load(node_id, load);
        }
        entry.status.last_heartbeat = epoch_millis();
        debug!(
            %node_id,
            load = entry.status.current_load,
            "node status updated"
        );
        true
    }

    /// Owned copy of every (node, status) pair in registration order.
    pub async fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.entries.read().await.clone()
    }

    pub async fn get(&self, node_id: &str) -> Option<NodeSnapshot> {
        self.entries
            .read()
            .await
            .iter()
            .find(|e| e.node.id == node_id)
            .cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Select a node for `requirements` from the current live view.
    pub async fn select_node(&self, requirements: &Requirements) -> Option<EdgeNode> {
        let entries = self.entries.read().await;
        select_node(&entries, requirements)
    }
}

fn clamp_load(node_id: &str, load: f64) -> f64 {
    if load.is_nan() {
        warn!(%node_id, "NaN load reported, treating as fully loaded");
        return 1.0;
    }
    let clamped = load.clamp(0.0, 1.0);
    if clamped != load {
        warn!(%node_id, reported = load, clamped, "load outside [0, 1] clamped");
    }
    clamped
}
