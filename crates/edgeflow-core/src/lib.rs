pub mod config;
pub mod types;

pub use config::{ConfigError, EdgeflowConfig};
pub use types::*;
