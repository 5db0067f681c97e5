//! Task — the placement-to-execution record for one scheduled function.

use serde::{Deserialize, Serialize};

use edgeflow_core::{EdgeNode, FunctionSpec, TaskId, epoch_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Deployed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub function: FunctionSpec,
    pub target_node: EdgeNode,
    pub status: TaskStatus,
    /// Unix millis.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployed_at: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Retries performed after the initial attempt.
    pub retry_count: u32,
}

impl Task {
    pub fn new(id: TaskId, function: FunctionSpec, target_node: EdgeNode) -> Self {
        Self {
            id,
            function,
            target_node,
            status: TaskStatus::Pending,
            created_at: epoch_millis(),
            deployed_at: None,
            error: None,
            retry_count: 0,
        }
    }

    pub(crate) fn mark_deployed(&mut self) {
        self.status = TaskStatus::Deployed;
        self.deployed_at = Some(epoch_millis());
        self.error = None;
    }

    pub(crate) fn mark_failed(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
    }
}
