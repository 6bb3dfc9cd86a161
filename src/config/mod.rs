//! Configuration module
//!
//! Handles loading and validating configuration from TOML files, environment
//! variables and the JSON secrets file.

pub mod loader;
pub mod types;

pub use loader::{load_config, load_config_from_str, load_secrets, validate_base_url};
pub use types::*;
