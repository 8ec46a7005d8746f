pub mod config;
pub mod naming;
pub mod types;

pub use config::{ConfigError, FleetConfig};
pub use naming::{NAMESPACE_TAG, container_name, is_managed_name, normalize_target};
pub use types::*;
