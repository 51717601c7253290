//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::{PackConfig, RULE_NAMES};
use std::path::Path;

/// File name looked up by [`load_config`].
pub const CONFIG_FILE_NAME: &str = "pack.toml";

/// Loads and validates `<dir>/pack.toml`.
pub fn load_config(dir: &Path) -> Result<PackConfig, ConfigError> {
    let content = std::fs::read_to_string(dir.join(CONFIG_FILE_NAME))?;
    load_config_from_str(&content)
}

/// Parses and validates a `pack.toml` from a string.
pub fn load_config_from_str(content: &str) -> Result<PackConfig, ConfigError> {
    let config: PackConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Checks rule names and the numeric ranges the selectors rely on.
fn validate_config(config: &PackConfig) -> Result<(), ConfigError> {
    for name in &config.rules.disabled {
        if !RULE_NAMES.contains(&name.as_str()) {
            return Err(ConfigError::UnknownRule(name.clone()));
        }
    }

    let cells = &config.cell_selector;
    if cells.pin_on_net_penalty_cutoff == 0 {
        return Err(ConfigError::ValidationError(
            "cell_selector.pin_on_net_penalty_cutoff must be positive".to_string(),
        ));
    }
    if cells.high_fanout_limit < 2 {
        return Err(ConfigError::ValidationError(
            "cell_selector.high_fanout_limit must be at least 2".to_string(),
        ));
    }
    if cells.percent_shared_pins_max <= cells.percent_shared_pins_min {
        return Err(ConfigError::ValidationError(
            "cell_selector.percent_shared_pins_max must exceed percent_shared_pins_min"
                .to_string(),
        ));
    }

    let bels = &config.bel_selector;
    if !(bels.pip_penalty > 0.0 && bels.pip_penalty <= 1.0) {
        return Err(ConfigError::ValidationError(
            "bel_selector.pip_penalty must be in (0, 1]".to_string(),
        ));
    }

    let weights = &config.packer;
    let total =
        weights.bel_utilization_factor + weights.pin_utilization_factor + weights.remaining_types_factor;
    if total <= 0.0 {
        return Err(ConfigError::ValidationError(
            "packer cost weights must not all be zero".to_string(),
        ));
    }
    Ok(())
}
