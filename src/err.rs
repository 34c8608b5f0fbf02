//! Error interface and diagnostics.
//!
//! Every error type in this crate implements [`Error`], which extends
//! [`std::error::Error`] with an optional source span and an optional help message.
//!
//! Errors which should not abort a run (most of them) are converted into
//! [`Diagnostic`]s and attached to the syntax node they concern.

use std::borrow::Cow;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

pub use crate::asm::{AsmErr, AsmErrKind, AsmFatal};
pub use crate::eval::{EvalErr, EvalErrKind};
pub use crate::link::LinkErr;
pub use crate::parse::lex::LexErr;
pub use crate::parse::{ParseErr, ParseErrKind};

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The range where this error occurs in source.
    ///
    /// If this is not known, this can be set to `None`.
    fn span(&self) -> Option<ErrSpan> {
        None
    }

    /// A clarifying message to help aid someone in how to fix the message.
    ///
    /// If there is none to add, this can be set to `None`.
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}

/// The possible source ranges for an error.
///
/// This can be:
/// - one contiguous span,
/// - two contiguous spans, or
/// - three or more contiguous spans
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ErrSpan {
    /// One contiguous span.
    One(Range<usize>),
    /// Two contiguous spans.
    Two([Range<usize>; 2]),
    /// Three or more contiguous spans.
    ///
    /// This should always have at least 3 elements.
    Many(Vec<Range<usize>>),
}
impl ErrSpan {
    /// Gets the first span.
    ///
    /// This returns `None` for an empty [`ErrSpan::Many`].
    pub fn first(&self) -> Option<Range<usize>> {
        match self {
            ErrSpan::One(r) => Some(r.clone()),
            ErrSpan::Two([r, _]) => Some(r.clone()),
            ErrSpan::Many(r) => r.first().cloned(),
        }
    }

    /// Gets an iterator over all of the spans.
    pub fn iter(&self) -> impl Iterator<Item = &Range<usize>> {
        let slice: &[Range<usize>] = match self {
            ErrSpan::One(r) => std::slice::from_ref(r),
            ErrSpan::Two(r) => r,
            ErrSpan::Many(r) => r,
        };
        slice.iter()
    }
}
impl From<Range<usize>> for ErrSpan {
    fn from(value: Range<usize>) -> Self {
        ErrSpan::One(value)
    }
}
impl<const N: usize> From<[Range<usize>; N]> for ErrSpan {
    fn from(value: [Range<usize>; N]) -> Self {
        match value.as_slice() {
            [r] => ErrSpan::One(r.clone()),
            [r0, r1] => ErrSpan::Two([r0.clone(), r1.clone()]),
            _ => ErrSpan::Many(value.to_vec()),
        }
    }
}
impl From<Vec<Range<usize>>> for ErrSpan {
    fn from(value: Vec<Range<usize>>) -> Self {
        match <[_; 1]>::try_from(value) {
            Ok([r]) => ErrSpan::One(r),
            Err(value) => match <[_; 2]>::try_from(value) {
                Ok(r) => ErrSpan::Two(r),
                Err(value) => ErrSpan::Many(value),
            },
        }
    }
}

/// How serious a diagnostic is.
///
/// Any [`Severity::Error`] diagnostic causes the phase that produced it to fail.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Severity {
    #[allow(missing_docs)]
    Warning,
    #[allow(missing_docs)]
    Error,
}
impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// The kind of syntax node a diagnostic is attached to.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum NodeRef {
    /// A token or token sequence (lexical and syntax errors).
    Syntax,
    /// A label declaration.
    Label,
    /// An expression (or subexpression).
    Expr,
    /// A directive.
    Directive,
    /// An `.include` directive.
    Include,
    /// An instruction.
    Instruction,
    /// Not attached to any node (e.g., a section layout failure).
    Detached,
}

/// A positioned message produced during a run.
///
/// Diagnostics are the shared currency between the core and downstream tools:
/// they carry the file and byte span of the offending node and require no
/// further interpretation.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Diagnostic {
    /// How serious this is.
    pub severity: Severity,
    /// The main message.
    pub message: String,
    /// An optional suggestion.
    pub help: Option<String>,
    /// The file the node lives in (if attached to a node).
    pub file: Option<Arc<Path>>,
    /// The byte span of the node in its file.
    pub span: Option<Range<usize>>,
    /// The kind of node this is attached to.
    pub node: NodeRef,
}
impl Diagnostic {
    /// Creates a diagnostic from any error of this crate.
    pub fn from_err<E: Error + ?Sized>(err: &E, severity: Severity, file: Option<&Arc<Path>>, node: NodeRef) -> Self {
        Diagnostic {
            severity,
            message: err.to_string(),
            help: err.help().map(Cow::into_owned),
            file: file.cloned(),
            span: err.span().and_then(|s| s.first()),
            node,
        }
    }

    /// Creates an error diagnostic from a message.
    pub fn error(message: impl Into<String>, file: Option<&Arc<Path>>, span: Option<Range<usize>>, node: NodeRef) -> Self {
        Diagnostic { severity: Severity::Error, message: message.into(), help: None, file: file.cloned(), span, node }
    }

    /// Creates a warning diagnostic from a message.
    pub fn warning(message: impl Into<String>, file: Option<&Arc<Path>>, span: Option<Range<usize>>, node: NodeRef) -> Self {
        Diagnostic { severity: Severity::Warning, message: message.into(), help: None, file: file.cloned(), span, node }
    }

    /// Whether this diagnostic is an error.
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(file) = &self.file {
            write!(f, "{}", file.display())?;
            if let Some(span) = &self.span {
                write!(f, "[{}..{}]", span.start, span.end)?;
            }
            f.write_str(": ")?;
        }
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(help) = &self.help {
            write!(f, " (help: {help})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrSpan;

    #[test]
    fn test_err_span_from_vec() {
        assert_eq!(ErrSpan::from(vec![0..1]), ErrSpan::One(0..1));
        assert_eq!(ErrSpan::from(vec![0..1, 2..3]), ErrSpan::Two([0..1, 2..3]));
        assert_eq!(ErrSpan::from(vec![0..1, 2..3, 4..5]), ErrSpan::Many(vec![0..1, 2..3, 4..5]));
        assert_eq!(ErrSpan::from([5..6, 0..1]).first(), Some(5..6));
        assert_eq!(ErrSpan::from([1..2, 3..4, 5..6]).iter().count(), 3);
    }
}
