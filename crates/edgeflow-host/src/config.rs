use std::path::PathBuf;
use std::time::Duration;

use edgeflow_core::RuntimeKind;
use edgeflow_core::config::{EdgeConfig, InterpreterConfig};

/// Runtime settings for a `FunctionHost`.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Directory holding one body file per deployed function.
    pub functions_dir: PathBuf,
    /// Wall-clock budget for one out-of-process invocation.
    pub invoke_timeout: Duration,
    /// Functions unused for longer than this are evicted.
    pub idle_retention: Duration,
    /// Interval between eviction sweeps.
    pub eviction_interval: Duration,
    pub interpreters: InterpreterConfig,
}

impl HostConfig {
    pub fn from_edge_config(config: &EdgeConfig) -> Self {
        Self {
            functions_dir: config.functions_dir.clone(),
            invoke_timeout: Duration::from_secs(config.invoke_timeout_secs),
            idle_retention: Duration::from_secs(config.idle_retention_secs),
            eviction_interval: Duration::from_secs(config.eviction_interval_secs),
            interpreters: config.interpreters.clone(),
        }
    }

    /// A default configuration rooted at `functions_dir`.
    pub fn with_dir(functions_dir: impl Into<PathBuf>) -> Self {
        Self {
            functions_dir: functions_dir.into(),
            ..Self::from_edge_config(&EdgeConfig::default())
        }
    }

    /// Interpreter command for an out-of-process runtime.
    pub fn interpreter(&self, runtime: RuntimeKind) -> Option<&str> {
        match runtime {
            RuntimeKind::Node => Some(&self.interpreters.node),
            RuntimeKind::Python => Some(&self.interpreters.python),
            RuntimeKind::Shell => Some(&self.interpreters.shell),
            RuntimeKind::Wasm => None,
        }
    }

    /// Body file for function `id` of the given runtime.
    pub fn body_path(&self, id: &str, runtime: RuntimeKind) -> PathBuf {
        self.functions_dir.join(format!("{id}.{}", runtime.extension()))
    }
}
