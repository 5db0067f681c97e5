//! Placement — least-loaded selection among eligible nodes.
//!
//! A node is eligible when its current resources satisfy the function's
//! requirements and its load is strictly below `ADMISSION_THRESHOLD`.
//! Among eligible nodes the one with the smallest load wins; exact ties go
//! to the node seen first.

use tracing::{debug, info};

use edgeflow_core::{EdgeNode, Requirements};

use crate::registry::NodeSnapshot;

/// Nodes at or above this load are not offered new work.
pub const ADMISSION_THRESHOLD: f64 = 0.8;

/// Pick a node for `requirements`, or `None` when no node is eligible.
///
/// `None` is an expected outcome, not a fault.
pub fn select_node(candidates: &[NodeSnapshot], requirements: &Requirements) -> Option<EdgeNode> {
    let mut best: Option<&NodeSnapshot> = None;

    for candidate in candidates {
        if !requirements.satisfied_by(&candidate.status.resources) {
            debug!(node = %candidate.node.id, "insufficient resources");
            continue;
        }
        if candidate.status.current_load >= ADMISSION_THRESHOLD {
            debug!(
                node = %candidate.node.id,
                load = candidate.status.current_load,
                "above admission threshold"
            );
            continue;
        }
        // Strict comparison keeps the first-seen node on ties.
        match best {
            Some(b) if candidate.status.current_load >= b.status.current_load => {}
            _ => best = Some(candidate),
        }
    }

    match best {
        Some(chosen) => {
            debug!(
                node = %chosen.node.id,
                load = chosen.status.current_load,
                "selected node"
            );
            Some(chosen.node.clone())
        }
        None => {
            info!(
                candidates = candidates.len(),
                memory = ?requirements.memory,
                cpus = ?requirements.cpus,
                "no eligible node"
            );
            None
        }
    }
}
