//! DeploymentCoordinator — owns the task table and drives deployments.
//!
//! `schedule_function` returns as soon as a node is chosen and the task is
//! recorded; the deployment itself runs on its own tokio task. Attempts
//! for one task are strictly sequential: the next attempt starts only
//! after the previous one finished and its backoff elapsed. Tasks never
//! wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use edgeflow_core::config::RetryConfig;
use edgeflow_core::{DeployRequest, EdgeNode, FunctionSpec, TaskId};
use edgeflow_placement::NodeRegistry;

use crate::client::DeployClient;
use crate::error::{SchedulerError, SchedulerResult};
use crate::task::Task;

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed after the initial one.
    pub max_retries: u32,
    /// Delay before retry `k` is `base_delay * 2^k`.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

#[derive(Default)]
struct TaskTable {
    by_id: HashMap<TaskId, Task>,
    /// Task ids in acceptance order.
    queue: Vec<TaskId>,
}

/// Schedules functions onto edge nodes and tracks each deployment.
#[derive(Clone)]
pub struct DeploymentCoordinator {
    registry: NodeRegistry,
    client: Arc<dyn DeployClient>,
    retry: RetryPolicy,
    tasks: Arc<RwLock<TaskTable>>,
    handles: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
}

impl DeploymentCoordinator {
    pub fn new(registry: NodeRegistry, client: Arc<dyn DeployClient>) -> Self {
        Self {
            registry,
            client,
            retry: RetryPolicy::default(),
            tasks: Arc::new(RwLock::new(TaskTable::default())),
            handles: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    /// Place `spec` on a node and start deploying it in the background.
    ///
    /// Returns the new task id immediately. Fails with `NoCapacity` when no
    /// node is eligible; placement itself is never retried.
    pub async fn schedule_function(&self, spec: FunctionSpec) -> SchedulerResult<TaskId> {
        let task_id = Uuid::new_v4().to_string();

        let Some(node) = self.registry.select_node(&spec.requirements).await else {
            info!(function = %spec.name, "no capacity for function");
            return Err(SchedulerError::NoCapacity(spec.name));
        };

        let request = DeployRequest::for_task(&spec, &task_id);
        let task = Task::new(task_id.clone(), spec, node.clone());
        {
            let mut table = self.tasks.write().await;
            table.queue.push(task_id.clone());
            table.by_id.insert(task_id.clone(), task);
        }
        info!(%task_id, function = %request.name, node = %node.id, "scheduled task");

        let run = DeploymentRun {
            task_id: task_id.clone(),
            node,
            request,
            client: self.client.clone(),
            tasks: self.tasks.clone(),
            handles: self.handles.clone(),
            retry: self.retry,
        };
        // The run removes its own handle when done, so it must not be able
        // to finish before the handle is inserted.
        let mut handles = self.handles.lock().await;
        handles.insert(task_id.clone(), tokio::spawn(run.execute()));
        drop(handles);

        Ok(task_id)
    }

    /// Full task record, or `None` for an unknown id.
    pub async fn get_task_status(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().await.by_id.get(task_id).cloned()
    }

    /// All tasks in acceptance order.
    pub async fn list_tasks(&self) -> Vec<Task> {
        let table = self.tasks.read().await;
        table
            .queue
            .iter()
            .filter_map(|id| table.by_id.get(id).cloned())
            .collect()
    }

    /// Wait for a task's deployment sequence to finish and return the task.
    ///
    /// Returns immediately for a task whose sequence already finished.
    pub async fn wait(&self, task_id: &str) -> Option<Task> {
        let handle = self.handles.lock().await.remove(task_id);
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(%task_id, error = %e, "deployment task panicked or was cancelled");
            }
        }
        self.get_task_status(task_id).await
    }
}

/// One task's deployment attempt sequence.
struct DeploymentRun {
    task_id: TaskId,
    node: EdgeNode,
    request: DeployRequest,
    client: Arc<dyn DeployClient>,
    tasks: Arc<RwLock<TaskTable>>,
    handles: Arc<Mutex<HashMap<TaskId, JoinHandle<()>>>>,
    retry: RetryPolicy,
}

impl DeploymentRun {
    async fn execute(self) {
        self.run_attempts().await;
        self.handles.lock().await.remove(&self.task_id);
    }

    async fn run_attempts(&self) {
        let mut retries = 0;
        loop {
            if self.attempt().await {
                return;
            }
            if retries >= self.retry.max_retries {
                error!(
                    task_id = %self.task_id,
                    retries,
                    "deployment failed permanently"
                );
                return;
            }

            retries += 1;
            let delay = self.retry.delay_for(retries);
            debug!(task_id = %self.task_id, ?delay, "waiting before retry");
            tokio::time::sleep(delay).await;

            self.update(|task| task.retry_count = retries).await;
            info!(task_id = %self.task_id, attempt = retries, "retrying deployment");
        }
    }

    /// Run one deployment attempt; `true` on success.
    async fn attempt(&self) -> bool {
        match self.client.deploy(&self.node, &self.request).await {
            Ok(()) => {
                self.update(Task::mark_deployed).await;
                info!(task_id = %self.task_id, node = %self.node.id, "deployed task");
                true
            }
            Err(e) => {
                let message = e.to_string();
                warn!(task_id = %self.task_id, node = %self.node.id, error = %message, "deployment attempt failed");
                self.update(|task| task.mark_failed(message)).await;
                false
            }
        }
    }

    async fn update(&self, f: impl FnOnce(&mut Task)) {
        let mut table = self.tasks.write().await;
        if let Some(task) = table.by_id.get_mut(&self.task_id) {
            f(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BoxFuture, DeployError};
    use crate::task::TaskStatus;
    use edgeflow_core::{NodeResources, Requirements, RuntimeKind};
    use edgeflow_placement::StatusUpdate;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    /// Fails the first `failures` calls for each function id, then succeeds.
    /// Ids in `always_fail` never succeed.
    #[derive(Default)]
    struct ScriptedClient {
        failures: u32,
        always_fail: HashSet<String>,
        calls: StdMutex<Vec<(String, Instant, DeployRequest)>>,
    }

    impl ScriptedClient {
        fn failing_first(failures: u32) -> Self {
            Self {
                failures,
                ..Default::default()
            }
        }

        fn always_failing(ids: &[&str]) -> Self {
            Self {
                always_fail: ids.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn calls_for(&self, function_id: &str) -> Vec<(Instant, DeployRequest)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(id, _, _)| id == function_id)
                .map(|(_, at, req)| (*at, req.clone()))
                .collect()
        }
    }

    impl DeployClient for ScriptedClient {
        fn deploy<'a>(
            &'a self,
            _node: &'a EdgeNode,
            request: &'a DeployRequest,
        ) -> BoxFuture<'a, Result<(), DeployError>> {
            Box::pin(async move {
                let previous = {
                    let mut calls = self.calls.lock().unwrap();
                    let previous = calls.iter().filter(|(id, _, _)| *id == request.id).count() as u32;
                    calls.push((request.id.clone(), Instant::now(), request.clone()));
                    previous
                };
                if self.always_fail.contains(&request.id) || previous < self.failures {
                    Err(DeployError::Transport("connection refused".to_string()))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn spec(id: &str) -> FunctionSpec {
        FunctionSpec {
            id: id.to_string(),
            name: format!("{id}-fn"),
            code: "cat".to_string(),
            runtime: RuntimeKind::Shell,
            requirements: Requirements::default(),
        }
    }

    async fn registry_with(nodes: &[(&str, u64, u32)]) -> NodeRegistry {
        let registry = NodeRegistry::new();
        for (id, memory, cpus) in nodes {
            registry
                .register(EdgeNode {
                    id: id.to_string(),
                    address: "127.0.0.1".to_string(),
                    port: 3000,
                    resources: NodeResources {
                        memory: *memory,
                        cpus: *cpus,
                    },
                })
                .await;
        }
        registry
    }

    #[test]
    fn backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn retry_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 5,
            base_delay_ms: 250,
        });
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_deploy_marks_task_deployed() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::default());
        let coordinator = DeploymentCoordinator::new(registry, client.clone());

        let task_id = coordinator.schedule_function(spec("f1")).await.unwrap();
        let task = coordinator.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Deployed);
        assert_eq!(task.retry_count, 0);
        assert!(task.deployed_at.is_some());
        assert!(task.error.is_none());
        assert_eq!(task.target_node.id, "n1");

        let calls = client.calls_for("f1");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.task_id.as_deref(), Some(task_id.as_str()));
    }

    #[tokio::test(start_paused = true)]
    async fn schedule_returns_before_deployment_completes() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::always_failing(&["f1"]));
        let coordinator = DeploymentCoordinator::new(registry, client);

        let task_id = coordinator.schedule_function(spec("f1")).await.unwrap();
        let task = coordinator.get_task_status(&task_id).await.unwrap();
        assert!(matches!(task.status, TaskStatus::Pending | TaskStatus::Failed));
        assert_eq!(task.retry_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_three_times_with_exponential_backoff() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::always_failing(&["f1"]));
        let coordinator = DeploymentCoordinator::new(registry, client.clone());

        let task_id = coordinator.schedule_function(spec("f1")).await.unwrap();
        let task = coordinator.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Failed);
        assert_eq!(task.retry_count, 3);
        assert!(task.error.as_deref().unwrap().contains("connection refused"));

        let calls = client.calls_for("f1");
        assert_eq!(calls.len(), 4, "initial attempt plus exactly three retries");

        let expected = [2, 4, 8];
        for (i, secs) in expected.iter().enumerate() {
            let gap = calls[i + 1].0 - calls[i].0;
            assert!(gap >= Duration::from_secs(*secs), "gap {i} was {gap:?}");
            assert!(gap < Duration::from_secs(*secs) + Duration::from_millis(100));
        }

        // No fourth retry ever fires.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(client.calls_for("f1").len(), 4);
        let task = coordinator.get_task_status(&task_id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_second_retry() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::failing_first(2));
        let coordinator = DeploymentCoordinator::new(registry, client.clone());

        let task_id = coordinator.schedule_function(spec("f1")).await.unwrap();
        let task = coordinator.wait(&task_id).await.unwrap();

        assert_eq!(task.status, TaskStatus::Deployed);
        assert_eq!(task.retry_count, 2);
        assert!(task.error.is_none());
        assert_eq!(client.calls_for("f1").len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_does_not_block_others() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::always_failing(&["slow"]));
        let coordinator = DeploymentCoordinator::new(registry, client);

        let failing = coordinator.schedule_function(spec("slow")).await.unwrap();
        let healthy = coordinator.schedule_function(spec("fast")).await.unwrap();

        let done = coordinator.wait(&healthy).await.unwrap();
        assert_eq!(done.status, TaskStatus::Deployed);

        let pending = coordinator.get_task_status(&failing).await.unwrap();
        assert!(pending.retry_count < 3);

        let finished = coordinator.wait(&failing).await.unwrap();
        assert_eq!(finished.status, TaskStatus::Failed);
        assert_eq!(finished.retry_count, 3);
    }

    #[tokio::test]
    async fn no_capacity_creates_no_task() {
        let registry = registry_with(&[("n1", 256, 1)]).await;
        let client = Arc::new(ScriptedClient::default());
        let coordinator = DeploymentCoordinator::new(registry, client.clone());

        let mut big = spec("f1");
        big.requirements = Requirements {
            memory: Some(1024),
            cpus: None,
        };
        let err = coordinator.schedule_function(big).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoCapacity(_)));
        assert!(coordinator.list_tasks().await.is_empty());
        assert!(client.calls_for("f1").is_empty());
    }

    #[tokio::test]
    async fn overloaded_pool_has_no_capacity() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        registry
            .update_status(
                "n1",
                StatusUpdate {
                    current_load: Some(0.9),
                    ..Default::default()
                },
            )
            .await;
        let coordinator = DeploymentCoordinator::new(registry, Arc::new(ScriptedClient::default()));
        let err = coordinator.schedule_function(spec("f1")).await.unwrap_err();
        assert!(matches!(err, SchedulerError::NoCapacity(_)));
    }

    #[tokio::test]
    async fn unknown_task_is_none() {
        let registry = registry_with(&[]).await;
        let coordinator = DeploymentCoordinator::new(registry, Arc::new(ScriptedClient::default()));
        assert!(coordinator.get_task_status("missing").await.is_none());
        assert!(coordinator.wait("missing").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tasks_listed_in_acceptance_order_with_unique_ids() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let coordinator = DeploymentCoordinator::new(registry, Arc::new(ScriptedClient::default()));

        let a = coordinator.schedule_function(spec("a")).await.unwrap();
        let b = coordinator.schedule_function(spec("b")).await.unwrap();
        let c = coordinator.schedule_function(spec("c")).await.unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);

        let ids: Vec<String> = coordinator.list_tasks().await.into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![a, b, c]);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_deployments_release_their_handles() {
        let registry = registry_with(&[("n1", 1024, 2)]).await;
        let client = Arc::new(ScriptedClient::always_failing(&["f-0"]));
        let coordinator = DeploymentCoordinator::new(registry, client);

        for i in 0..100 {
            coordinator.schedule_function(spec(&format!("f-{i}"))).await.unwrap();
        }
        assert!(coordinator.handles.lock().await.len() > 0);

        tokio::time::sleep(Duration::from_secs(60)).await;

        let tasks = coordinator.list_tasks().await;
        assert_eq!(tasks.len(), 100);
        let deployed = tasks.iter().filter(|t| t.status == TaskStatus::Deployed).count();
        assert_eq!(deployed, 99);
        assert_eq!(coordinator.handles.lock().await.len(), 0);

        let failed = coordinator.wait(&tasks[0].id).await.unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.retry_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn places_on_least_loaded_node() {
        let registry = registry_with(&[("n1", 1024, 2), ("n2", 1024, 2)]).await;
        registry
            .update_status(
                "n1",
                StatusUpdate {
                    current_load: Some(0.5),
                    ..Default::default()
                },
            )
            .await;
        let coordinator = DeploymentCoordinator::new(registry, Arc::new(ScriptedClient::default()));

        let task_id = coordinator.schedule_function(spec("f1")).await.unwrap();
        let task = coordinator.wait(&task_id).await.unwrap();
        assert_eq!(task.target_node.id, "n2");
    }
}
