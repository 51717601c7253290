//! Common result and error types for the packing engine.

/// The standard result type for fallible internal operations.
///
/// `Ok` contains the result value (which may describe an incomplete packing).
/// `Err` indicates a broken invariant inside the packer (a bug), not a
/// user-facing problem. A design that cannot be packed is reported through
/// the diagnostic sink and the operation still returns `Ok`.
pub type PackResult<T> = Result<T, InternalError>;

/// An internal packer error indicating a bug or corrupt input tables.
///
/// Raised for checkpoint depth mismatches between components, missing BEL
/// cost-table entries and selectors that disagree with the orchestrator.
#[derive(Debug, thiserror::Error)]
#[error("internal packer error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("checkpoint depth mismatch");
        assert_eq!(
            format!("{err}"),
            "internal packer error: checkpoint depth mismatch"
        );
    }

    #[test]
    fn err_path() {
        let r: PackResult<i32> = Err(InternalError::new("no cost for LUT6"));
        let err = r.err().unwrap();
        assert_eq!(err.message, "no cost for LUT6");
    }

    #[test]
    fn from_string() {
        let err: InternalError = format!("cell {} has no seed bucket", 3).into();
        assert_eq!(err.message, "cell 3 has no seed bucket");
    }
}
