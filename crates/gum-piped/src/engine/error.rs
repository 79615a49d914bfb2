//! Errors reported by the graphics collaborators.
//!
//! Messages are carried verbatim; the dispatch layer forwards them to clients
//! unchanged, so they should read as user-facing text.

use thiserror::Error;

/// Evaluation of graphics-description source failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluateError {
    /// The source could not be parsed or raised an error while evaluating.
    #[error("{message}")]
    Syntax {
        /// Evaluator message.
        message: String,
    },
    /// The source ran to completion without producing a value.
    #[error("{message}")]
    NoReturn {
        /// Evaluator message.
        message: String,
    },
    /// The source produced a value that is not a graphics element.
    #[error("{message}")]
    NoElement {
        /// Evaluator message.
        message: String,
    },
}

impl EvaluateError {
    /// Creates a syntax/evaluation failure.
    pub fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax {
            message: message.into(),
        }
    }

    /// Creates a missing-return failure.
    pub fn no_return(message: impl Into<String>) -> Self {
        Self::NoReturn {
            message: message.into(),
        }
    }

    /// Creates a not-an-element failure.
    pub fn no_element(message: impl Into<String>) -> Self {
        Self::NoElement {
            message: message.into(),
        }
    }
}

/// An element could not be serialised to markup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SerializeError {
    message: String,
}

impl SerializeError {
    /// Creates a serialisation failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Markup could not be encoded to raster bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct EncodeError {
    message: String,
}

impl EncodeError {
    /// Creates an encoding failure.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
