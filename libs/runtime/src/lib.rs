//! Application runtime support: layered configuration loading and logging
//! initialization for binaries hosting a module tree.

pub mod config;
pub mod logging;
pub mod paths;

pub use config::{default_logging_config, AppConfig, CliArgs, LoggingConfig, Section};
pub use logging::init_logging_from_config;
