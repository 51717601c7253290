//! Error types for configuration loading and validation.

/// Errors that can occur when loading or validating a `pack.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An I/O error occurred while reading the configuration file.
    #[error("failed to read configuration: {0}")]
    IoError(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    /// A `[rules]` entry names a rule the packer does not have.
    #[error("unknown rule '{0}'")]
    UnknownRule(String),

    /// A configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_rule() {
        let err = ConfigError::UnknownRule("timing".to_string());
        assert_eq!(format!("{err}"), "unknown rule 'timing'");
    }

    #[test]
    fn display_parse_error() {
        let err = ConfigError::ParseError("expected '=' at line 3".to_string());
        assert_eq!(
            format!("{err}"),
            "failed to parse configuration: expected '=' at line 3"
        );
    }

    #[test]
    fn display_validation_error() {
        let err = ConfigError::ValidationError("pip_penalty must be in (0, 1]".to_string());
        assert_eq!(
            format!("{err}"),
            "validation error: pip_penalty must be in (0, 1]"
        );
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let display = format!("{}", ConfigError::IoError(io_err));
        assert!(display.starts_with("failed to read configuration:"));
    }
}
