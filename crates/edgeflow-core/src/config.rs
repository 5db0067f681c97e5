//! `edgeflow.toml` configuration parser.
//!
//! Every field has a default, so a missing section (or an empty file)
//! yields a working single-host setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::types::{EdgeNode, NodeResources};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeflowConfig {
    pub orchestrator: OrchestratorConfig,
    pub edge: EdgeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub listen: String,
    /// Bearer credential required by the orchestrator API, if set.
    pub api_token: Option<String>,
    /// Bearer credential presented to edge nodes when deploying.
    pub edge_auth_token: Option<String>,
    pub deploy_timeout_secs: u64,
    pub retry: RetryConfig,
    /// Static node pool registered at startup.
    pub nodes: Vec<StaticNode>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            api_token: None,
            edge_auth_token: None,
            deploy_timeout_secs: 30,
            retry: RetryConfig::default(),
            nodes: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn deploy_timeout(&self) -> Duration {
        Duration::from_secs(self.deploy_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// Delay before retry `k` is `base_delay_ms * 2^k`.
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticNode {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub memory: u64,
    pub cpus: u32,
}

impl StaticNode {
    pub fn to_edge_node(&self) -> EdgeNode {
        EdgeNode {
            id: self.id.clone(),
            address: self.address.clone(),
            port: self.port,
            resources: NodeResources {
                memory: self.memory,
                cpus: self.cpus,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub listen: String,
    /// Bearer credential callers must present to deploy/invoke.
    pub auth_token: Option<String>,
    pub functions_dir: PathBuf,
    pub invoke_timeout_secs: u64,
    pub idle_retention_secs: u64,
    pub eviction_interval_secs: u64,
    pub interpreters: InterpreterConfig,
    pub sandbox: SandboxSection,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:3000".to_string(),
            auth_token: None,
            functions_dir: PathBuf::from("./functions"),
            invoke_timeout_secs: 10,
            idle_retention_secs: 24 * 3600,
            eviction_interval_secs: 3600,
            interpreters: InterpreterConfig::default(),
            sandbox: SandboxSection::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    pub node: String,
    pub python: String,
    pub shell: String,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            node: "node".to_string(),
            python: "python3".to_string(),
            shell: "sh".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSection {
    pub execution_timeout_ms: u64,
    pub memory_limit_bytes: usize,
    pub cache_capacity: usize,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            execution_timeout_ms: 5000,
            memory_limit_bytes: 64 * 1024 * 1024,
            cache_capacity: 64,
        }
    }
}

impl EdgeflowConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path` if given, otherwise use defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }
}
