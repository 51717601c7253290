//! Structured diagnostic messages about cells, clusters and device data.

use crate::code::DiagnosticCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured diagnostic message.
///
/// The `subject` names the design object the message is about (a cell,
/// a cluster, a library cell type) so renderers can point at it; packing has
/// no source text to underline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity level of this diagnostic.
    pub severity: Severity,
    /// The code identifying the kind of diagnostic.
    pub code: DiagnosticCode,
    /// The main diagnostic message.
    pub message: String,
    /// The design object this diagnostic concerns, if any.
    pub subject: Option<String>,
    /// Explanatory footnotes.
    pub notes: Vec<String>,
    /// Actionable suggestions.
    pub help: Vec<String>,
}

impl Diagnostic {
    fn with_severity(severity: Severity, code: DiagnosticCode, message: String) -> Self {
        Self {
            severity,
            code,
            message,
            subject: None,
            notes: Vec::new(),
            help: Vec::new(),
        }
    }

    /// Creates a new error diagnostic.
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Error, code, message.into())
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Warning, code, message.into())
    }

    /// Creates a new informational note.
    pub fn note(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::with_severity(Severity::Note, code, message.into())
    }

    /// Sets the design object this diagnostic is about.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Adds a note to this diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    /// Adds a help message to this diagnostic.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help.push(help.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::Category;

    #[test]
    fn create_error() {
        let diag = Diagnostic::error(
            DiagnosticCode::new(Category::Packing, 101),
            "no legal packing found",
        );
        assert_eq!(diag.severity, Severity::Error);
        assert_eq!(diag.message, "no legal packing found");
        assert!(diag.subject.is_none());
        assert_eq!(format!("{}", diag.code), "P101");
    }

    #[test]
    fn note_severity() {
        let diag = Diagnostic::note(DiagnosticCode::new(Category::Packing, 1), "done");
        assert_eq!(diag.severity, Severity::Note);
    }

    #[test]
    fn builder_methods() {
        let diag = Diagnostic::warning(
            DiagnosticCode::new(Category::Warning, 201),
            "cell cannot be packed",
        )
        .with_subject("u_ram/ram_a")
        .with_note("library type has no anchor in any template")
        .with_help("add the type to the cell library");
        assert_eq!(diag.subject.as_deref(), Some("u_ram/ram_a"));
        assert_eq!(diag.notes.len(), 1);
        assert_eq!(diag.help.len(), 1);
    }

    #[test]
    fn serde_roundtrip() {
        let diag = Diagnostic::error(DiagnosticCode::new(Category::Error, 5), "bad").with_subject("c0");
        let json = serde_json::to_string(&diag).unwrap();
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.subject.as_deref(), Some("c0"));
        assert_eq!(back.code, diag.code);
    }
}
