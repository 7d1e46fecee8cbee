pub mod client;
pub mod config;
pub mod config_store;
pub mod domains;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod normalizer;
pub mod providers;
pub mod provisioning;
pub mod relay;
pub mod render;
pub mod session;
pub mod turn_fsm;

pub type Result<T> = std::result::Result<T, error::WorkbenchError>;

/// Build version baked in by `build.rs` (package version plus git sha).
pub const BUILD_VERSION: &str = env!("WORKBENCH_BUILD_VERSION");
