//! Diagnostic infrastructure.
//!
//! All compile-time findings flow through a [`Diagnostics`] sink; the host
//! reads them after the compile finishes. Every diagnostic carries a primary
//! span plus zero or more secondary spans with captions, an `E`/`W` code and
//! a severity. Rendering goes through codespan-reporting; a JSON projection
//! serves IDE tooling.

use codespan_reporting::diagnostic::{Diagnostic as CsDiagnostic, Label, Severity as CsSeverity};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use serde::Serialize;
use vela_parser::Span;

/// Severity of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// One labelled source location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanLabel {
    /// Index of the source unit in the compile's file table
    pub file: usize,
    #[serde(skip)]
    pub span: Span,
    pub caption: String,
}

/// A single diagnostic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Stable code, e.g. `E3004`
    pub code: &'static str,
    pub message: String,
    pub primary: SpanLabel,
    pub secondary: Vec<SpanLabel>,
    pub notes: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, file: usize, span: Span) -> Self {
        Self::new(Severity::Error, code, message, file, span)
    }

    pub fn warning(code: &'static str, message: impl Into<String>, file: usize, span: Span) -> Self {
        Self::new(Severity::Warning, code, message, file, span)
    }

    fn new(
        severity: Severity,
        code: &'static str,
        message: impl Into<String>,
        file: usize,
        span: Span,
    ) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            primary: SpanLabel {
                file,
                span,
                caption: String::new(),
            },
            secondary: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.primary.caption = caption.into();
        self
    }

    pub fn with_secondary(mut self, file: usize, span: Span, caption: impl Into<String>) -> Self {
        self.secondary.push(SpanLabel {
            file,
            span,
            caption: caption.into(),
        });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    fn to_codespan(&self) -> CsDiagnostic<usize> {
        let severity = match self.severity {
            Severity::Error => CsSeverity::Error,
            Severity::Warning => CsSeverity::Warning,
            Severity::Note => CsSeverity::Note,
        };
        let mut labels = vec![Label::primary(
            self.primary.file,
            self.primary.span.start as usize..self.primary.span.end as usize,
        )
        .with_message(self.primary.caption.clone())];
        for label in &self.secondary {
            labels.push(
                Label::secondary(
                    label.file,
                    label.span.start as usize..label.span.end as usize,
                )
                .with_message(label.caption.clone()),
            );
        }
        CsDiagnostic::new(severity)
            .with_code(self.code)
            .with_message(self.message.clone())
            .with_labels(labels)
            .with_notes(self.notes.clone())
    }
}

/// Accumulating reporter. The success contract is an empty error list with a
/// non-empty output.
#[derive(Debug, Default)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
    errors: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity == Severity::Error {
            self.errors += 1;
        }
        self.list.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.list.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Render every diagnostic to stderr with source context.
    pub fn emit_all(
        &self,
        files: &SimpleFiles<String, String>,
    ) -> Result<(), codespan_reporting::files::Error> {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = term::Config::default();
        for diagnostic in &self.list {
            term::emit(
                &mut writer.lock(),
                &config,
                files,
                &diagnostic.to_codespan(),
            )?;
        }
        Ok(())
    }

    /// JSON projection for IDE integration.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_counting() {
        let mut sink = Diagnostics::new();
        sink.report(Diagnostic::warning("W5001", "unused", 0, Span::DUMMY));
        assert!(!sink.has_errors());
        sink.report(Diagnostic::error("E2001", "duplicate", 0, Span::DUMMY));
        assert!(sink.has_errors());
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_secondary_labels() {
        let diag = Diagnostic::error("E2001", "duplicate identifier 'x'", 0, Span::new(10, 11, 1, 11))
            .with_caption("duplicate declaration")
            .with_secondary(0, Span::new(0, 1, 1, 1), "first declaration here");
        assert_eq!(diag.secondary.len(), 1);
        let cs = diag.to_codespan();
        assert_eq!(cs.labels.len(), 2);
    }

    #[test]
    fn test_json_projection() {
        let mut sink = Diagnostics::new();
        sink.report(
            Diagnostic::error("E3001", "type mismatch", 0, Span::new(1, 4, 1, 2))
                .with_note("expected uint256"),
        );
        let json = sink.to_json().unwrap();
        assert!(json.contains("E3001"));
        assert!(json.contains("error"));
        assert!(json.contains("expected uint256"));
    }
}
