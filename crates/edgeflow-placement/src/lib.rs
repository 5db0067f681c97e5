//! edgeflow-placement — node registry and placement.
//!
//! The registry tracks the small, statically known pool of edge nodes and
//! their self-reported load. Placement picks the least-loaded node that
//! satisfies a function's requirements and is below the admission
//! threshold. There is no bin-packing and no global optimization.
//!
//! # Components
//!
//! - **`registry`** — `NodeRegistry` (registration, status merge, snapshots)
//! - **`placer`** — `select_node` (filter + least-loaded, stable tie-break)

pub mod placer;
pub mod registry;

pub use placer::{ADMISSION_THRESHOLD, select_node};
pub use registry::{NodeRegistry, NodeSnapshot, NodeStatus, StatusUpdate};
