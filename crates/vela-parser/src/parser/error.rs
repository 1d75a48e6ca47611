//! Parse error types.

use crate::token::{Span, Token};
use std::fmt;

/// A single parse error with its source location.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorKind {
    UnexpectedToken { expected: String, found: Token },
    UnexpectedEof { expected: String },
    /// `a[]` and friends in expression position
    MissingIndexExpression,
    /// A construct that is only legal somewhere else, e.g. `_;` outside a
    /// modifier body is caught later; this covers purely syntactic misuse.
    Unsupported { what: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::UnexpectedToken { expected, found } => {
                write!(
                    f,
                    "expected {}, found '{}' at {}",
                    expected, found, self.span
                )
            }
            ParseErrorKind::UnexpectedEof { expected } => {
                write!(f, "expected {}, found end of file at {}", expected, self.span)
            }
            ParseErrorKind::MissingIndexExpression => {
                write!(f, "index expression expected at {}", self.span)
            }
            ParseErrorKind::Unsupported { what } => {
                write!(f, "{} is not supported at {}", what, self.span)
            }
        }
    }
}

impl std::error::Error for ParseError {}
