//! Parsing and validation of `pack.toml` packer configuration files.
//!
//! This crate reads the packer configuration and produces a strongly-typed
//! [`PackConfig`] holding the cell-selector gain constants, BEL-selector
//! penalties, rule selection and cluster cost weights. Every field has a
//! default, so an empty file yields the stock tuning.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
