// ABOUTME: Error types for view rendering operations
// ABOUTME: Defines load, dispatch and directive failures raised by the template engine

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Template not found: {}", path.display())]
    TemplateNotFound { path: PathBuf },

    #[error("Directive evaluation failed for `{directive}`: {message}")]
    DirectiveEvaluation { directive: String, message: String },

    #[error("Unsupported template engine: {0}")]
    UnsupportedEngine(String),

    #[error("Invalid render context: {0}")]
    InvalidContext(String),

    #[error("Backend render error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl TemplateError {
    pub(crate) fn directive(directive: impl Into<String>, message: impl Into<String>) -> Self {
        TemplateError::DirectiveEvaluation {
            directive: directive.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;
