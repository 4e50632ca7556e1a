//! Error taxonomy shared by every layer of the engine.
//!
//! Each variant carries the [`Origin`] of the failure: the full pathname of
//! the node or scope where it was raised. Rendering prefixes the message with
//! `"<pathname>: "`, except for the root scope whose pathname is empty.

use std::fmt;
use thiserror::Error;

/// Pathname of the node or scope an error originated from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin(pub String);

impl Origin {
    pub fn root() -> Self {
        Self(String::new())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Origin {
    fn from(path: &str) -> Self {
        Self(path.to_string())
    }
}

impl From<String> for Origin {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            Ok(())
        } else {
            write!(f, "{}: ", self.0)
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    #[error("{origin}syntax error in '{text}' at offset {offset}: {message}")]
    ExpressionSyntax { origin: Origin, text: String, offset: usize, message: String },

    #[error("{origin}cannot resolve '{name}' in this scope or its parent")]
    NameResolution { origin: Origin, name: String },

    #[error("{origin}scope reference is no longer attached to the hierarchy")]
    DetachedScope { origin: Origin },

    #[error("{origin}expression '{text}' cannot be evaluated without a scope")]
    ScopeRequired { origin: Origin, text: String },

    #[error("{origin}dependency cycle detected at '{node}'")]
    CyclicDependency { origin: Origin, node: String },

    #[error("{origin}{message}")]
    Execution { origin: Origin, message: String },

    #[error("{origin}Max iterations exceeded without convergence.")]
    Convergence { origin: Origin },

    #[error("{origin}{message}")]
    Connection { origin: Origin, message: String },

    #[error("{origin}{message}")]
    Structure { origin: Origin, message: String },

    #[error("{origin}{message}")]
    Type { origin: Origin, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlowError {
    pub fn execution(origin: impl Into<Origin>, message: impl Into<String>) -> Self {
        FlowError::Execution { origin: origin.into(), message: message.into() }
    }

    pub fn structure(origin: impl Into<Origin>, message: impl Into<String>) -> Self {
        FlowError::Structure { origin: origin.into(), message: message.into() }
    }

    pub fn connection(origin: impl Into<Origin>, message: impl Into<String>) -> Self {
        FlowError::Connection { origin: origin.into(), message: message.into() }
    }

    pub fn type_error(origin: impl Into<Origin>, message: impl Into<String>) -> Self {
        FlowError::Type { origin: origin.into(), message: message.into() }
    }

    pub fn detached(origin: impl Into<Origin>) -> Self {
        FlowError::DetachedScope { origin: origin.into() }
    }

    /// The pathname this error was raised at, if it carries one.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            FlowError::ExpressionSyntax { origin, .. }
            | FlowError::NameResolution { origin, .. }
            | FlowError::DetachedScope { origin }
            | FlowError::ScopeRequired { origin, .. }
            | FlowError::CyclicDependency { origin, .. }
            | FlowError::Execution { origin, .. }
            | FlowError::Convergence { origin }
            | FlowError::Connection { origin, .. }
            | FlowError::Structure { origin, .. }
            | FlowError::Type { origin, .. } => Some(origin),
            FlowError::Config(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FlowError>;
