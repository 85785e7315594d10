//! Error types and diagnostic reporting

use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use thiserror::Error;

use super::Span;

/// Fatal translation error. None of these are recoverable: the whole
/// run aborts on the first one, and no partial output is valid.
#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("malformed input at {span:?}: {message}")]
    MalformedInput { message: String, span: Span },

    #[error("unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String, span: Span },

    #[error("unresolved branch target '{label}'")]
    UnresolvedBranchTarget { label: String, span: Span },

    #[error("redefinition of '{name}'")]
    Redefinition { name: String, span: Span },

    #[error("structural violation: {message}")]
    Structural { message: String, span: Span },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TranslateError {
    pub fn malformed(message: impl Into<String>, span: Span) -> Self {
        Self::MalformedInput {
            message: message.into(),
            span,
        }
    }

    pub fn unresolved(name: impl Into<String>, span: Span) -> Self {
        Self::UnresolvedSymbol {
            name: name.into(),
            span,
        }
    }

    pub fn bad_target(label: impl Into<String>, span: Span) -> Self {
        Self::UnresolvedBranchTarget {
            label: label.into(),
            span,
        }
    }

    pub fn redefined(name: impl Into<String>, span: Span) -> Self {
        Self::Redefinition {
            name: name.into(),
            span,
        }
    }

    pub fn structural(message: impl Into<String>, span: Span) -> Self {
        Self::Structural {
            message: message.into(),
            span,
        }
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;

/// Diagnostic reporter for pretty error output
pub struct DiagnosticReporter {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
}

impl DiagnosticReporter {
    pub fn new() -> Self {
        Self {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(ColorChoice::Auto),
            config: term::Config::default(),
        }
    }

    pub fn add_file(&mut self, name: impl Into<String>, source: impl Into<String>) -> usize {
        self.files.add(name.into(), source.into())
    }

    pub fn report_error(&self, file_id: usize, error: &TranslateError) {
        let diagnostic = match error {
            TranslateError::MalformedInput { message, span } => Diagnostic::error()
                .with_message("malformed quadruple")
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end).with_message(message),
                ]),

            TranslateError::UnresolvedSymbol { name, span } => Diagnostic::error()
                .with_message(format!("unresolved symbol '{name}'"))
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end)
                        .with_message("no visible binding for this operand"),
                ]),

            TranslateError::UnresolvedBranchTarget { label, span } => Diagnostic::error()
                .with_message(format!("unresolved branch target '{label}'"))
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end)
                        .with_message("no block carries this label"),
                ]),

            TranslateError::Redefinition { name, span } => Diagnostic::error()
                .with_message(format!("redefinition of '{name}'"))
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end)
                        .with_message("already declared at global scope"),
                ]),

            TranslateError::Structural { message, span } => Diagnostic::error()
                .with_message("structural violation")
                .with_labels(vec![
                    Label::primary(file_id, span.start..span.end).with_message(message),
                ]),

            TranslateError::Io(err) => {
                Diagnostic::error().with_message(format!("IO error: {err}"))
            }
        };

        let _ = term::emit(&mut self.writer.lock(), &self.config, &self.files, &diagnostic);
    }
}

impl Default for DiagnosticReporter {
    fn default() -> Self {
        Self::new()
    }
}
