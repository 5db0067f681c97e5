//! edgeflow-scheduler — places functions and deploys them to edge nodes.
//!
//! `DeploymentCoordinator` accepts a function, asks the node registry for a
//! placement, records a `Task`, and deploys in the background. A failed
//! deployment is retried in place with exponential backoff; callers poll
//! the task for its outcome.
//!
//! # Architecture
//!
//! ```text
//! DeploymentCoordinator
//!   ├── NodeRegistry (placement view)
//!   ├── Task table + acceptance queue (RwLock, owned here)
//!   ├── Per-task background deployment (JoinHandle keyed by task id)
//!   │   └── attempt → backoff 2s/4s/8s → attempt ...
//!   └── DeployClient (HttpDeployClient in production)
//! ```

pub mod client;
pub mod coordinator;
pub mod error;
pub mod task;

pub use client::{DeployClient, DeployError, HttpDeployClient};
pub use coordinator::{DeploymentCoordinator, RetryPolicy};
pub use error::{SchedulerError, SchedulerResult};
pub use task::{Task, TaskStatus};
