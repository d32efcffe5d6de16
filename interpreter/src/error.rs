use std::ops::Range;

use codespan_reporting::diagnostic::{Diagnostic, Label};
use outline::parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    #[error("cannot assign to read-only name '{0}'")]
    ReadOnly(String),
    #[error("cannot read '{field}' of {target}")]
    InvalidMember { field: String, target: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("{name}: {message}")]
    Helper { name: String, message: String },
    #[error("stack overflow")]
    StackOverflow,
    #[error("{0}")]
    Custom(String),
}

impl RuntimeError {
    pub fn helper(name: &str, message: impl Into<String>) -> Self {
        RuntimeError::Helper {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// A runtime error enriched with source location information.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DiagnosticError {
    pub error: RuntimeError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
}

impl DiagnosticError {
    pub fn at(error: RuntimeError, span: Range<usize>, source_id: usize) -> Self {
        DiagnosticError {
            error,
            span: Some(span),
            source_id,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let diagnostic = Diagnostic::error().with_message(self.error.to_string());
        match &self.span {
            Some(span) => diagnostic.with_labels(vec![Label::primary(
                self.source_id,
                span.clone(),
            )]),
            None => diagnostic,
        }
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
        }
    }
}

/// A failed render, naming the template it came from.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template '{template}' failed to compile: {source}")]
    Compile {
        template: String,
        #[source]
        source: ParseError,
    },
    #[error("template '{template}' failed: {source}")]
    Execution {
        template: String,
        #[source]
        source: DiagnosticError,
    },
}

impl RenderError {
    pub fn template(&self) -> &str {
        match self {
            RenderError::Compile { template, .. } => template,
            RenderError::Execution { template, .. } => template,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        let diagnostic = match self {
            RenderError::Compile { source, .. } => source.to_diagnostic(),
            RenderError::Execution { source, .. } => source.to_diagnostic(),
        };
        diagnostic.with_notes(vec![format!("while rendering template '{}'", self.template())])
    }
}

pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl InvokeError {
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        InvokeError::NotFound {
            kind,
            name: name.into(),
        }
    }
}
