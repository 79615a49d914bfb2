//! Error types for request decoding and task dispatch.
//!
//! [`TaskError`] is the only error a client ever sees. It pairs an
//! [`ErrorKind`] naming the pipeline stage that failed with the message that
//! stage produced, and serialises directly as the failure payload of a
//! response. [`PipelineError`] covers faults of the loop itself (reading the
//! input stream, writing responses), which end the loop instead of being
//! answered.

use std::io;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;

use crate::engine::{EncodeError, EvaluateError, SerializeError};

/// Pipeline stage at which a failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    /// Turning the input line into a request.
    Decode,
    /// Evaluating the graphics-description source.
    Evaluate,
    /// Serialising the evaluated element to markup.
    Generate,
    /// Encoding markup to raster bytes.
    Render,
    /// Resolving the task handler or running it outside a known stage.
    Dispatch,
}

/// Wire-level failure classification.
///
/// Variants are listed in pipeline order. The wire names are part of the
/// protocol and must not change.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
pub enum ErrorKind {
    /// The request carried no code payload.
    #[serde(rename = "NOCODE")]
    #[strum(serialize = "NOCODE")]
    MissingCode,
    /// Evaluating the source failed.
    #[serde(rename = "PARSE")]
    #[strum(serialize = "PARSE")]
    Parse,
    /// The source produced no value.
    #[serde(rename = "NORETURN")]
    #[strum(serialize = "NORETURN")]
    NoReturn,
    /// The source produced a value that is not an element.
    #[serde(rename = "NOELEMENT")]
    #[strum(serialize = "NOELEMENT")]
    NoElement,
    /// The element could not be serialised to markup.
    #[serde(rename = "GENERATE")]
    #[strum(serialize = "GENERATE")]
    Generate,
    /// The markup could not be encoded to raster bytes.
    #[serde(rename = "RENDER")]
    #[strum(serialize = "RENDER")]
    Render,
    /// Unknown task, malformed request or unclassified failure.
    #[serde(rename = "UNKNOWN")]
    #[strum(serialize = "UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    /// Stage that raises this kind.
    #[must_use]
    pub const fn stage(self) -> Stage {
        match self {
            Self::MissingCode => Stage::Decode,
            Self::Parse | Self::NoReturn | Self::NoElement => Stage::Evaluate,
            Self::Generate => Stage::Generate,
            Self::Render => Stage::Render,
            Self::Unknown => Stage::Dispatch,
        }
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        self.into()
    }
}

/// Classified failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct TaskError {
    #[serde(rename = "error")]
    kind: ErrorKind,
    message: String,
}

impl TaskError {
    /// Creates an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The request carried no code payload.
    pub fn missing_code() -> Self {
        Self::new(ErrorKind::MissingCode, "request has no code to evaluate")
    }

    /// The request line is not a well-formed request.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// The request line exceeds the configured limit.
    pub fn request_too_large(size: usize, max_size: usize) -> Self {
        Self::malformed(format!(
            "request too large: {size} bytes exceeds {max_size} byte limit"
        ))
    }

    /// No handler is registered for the requested task.
    pub fn unknown_task(task: &str) -> Self {
        Self::new(ErrorKind::Unknown, format!("unknown task: '{task}'"))
    }

    /// A failure outside any recognised stage.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// Tags an evaluator failure, keeping its message verbatim.
    pub fn from_evaluate(error: EvaluateError) -> Self {
        let kind = match &error {
            EvaluateError::Syntax { .. } => ErrorKind::Parse,
            EvaluateError::NoReturn { .. } => ErrorKind::NoReturn,
            EvaluateError::NoElement { .. } => ErrorKind::NoElement,
        };
        Self::new(kind, error.to_string())
    }

    /// Tags a markup serialisation failure.
    pub fn from_serialize(error: &SerializeError) -> Self {
        Self::new(ErrorKind::Generate, error.to_string())
    }

    /// Tags a raster encoding failure.
    pub fn from_encode(error: &EncodeError) -> Self {
        Self::new(ErrorKind::Render, error.to_string())
    }

    /// Failure classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_str()
    }
}

/// Faults of the dispatch loop itself.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Reading requests from the input stream failed.
    #[error("failed to read request stream: {0}")]
    Input(#[source] io::Error),

    /// Writing a response to the output stream failed.
    #[error("failed to write response: {0}")]
    Output(#[source] io::Error),

    /// A response could not be serialised.
    #[error("failed to serialise response: {0}")]
    SerializeResponse(#[from] serde_json::Error),

    /// A pipeline thread could not be started.
    #[error("failed to spawn {thread} thread: {source}")]
    Spawn {
        /// Role of the thread.
        thread: &'static str,
        /// Underlying spawn failure.
        #[source]
        source: io::Error,
    },

    /// A pipeline thread panicked.
    #[error("{thread} thread panicked")]
    ThreadPanic {
        /// Role of the thread that panicked.
        thread: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ErrorKind::MissingCode, "NOCODE", Stage::Decode)]
    #[case(ErrorKind::Parse, "PARSE", Stage::Evaluate)]
    #[case(ErrorKind::NoReturn, "NORETURN", Stage::Evaluate)]
    #[case(ErrorKind::NoElement, "NOELEMENT", Stage::Evaluate)]
    #[case(ErrorKind::Generate, "GENERATE", Stage::Generate)]
    #[case(ErrorKind::Render, "RENDER", Stage::Render)]
    #[case(ErrorKind::Unknown, "UNKNOWN", Stage::Dispatch)]
    fn kinds_carry_wire_names_and_stages(
        #[case] kind: ErrorKind,
        #[case] wire: &str,
        #[case] stage: Stage,
    ) {
        assert_eq!(kind.as_str(), wire);
        assert_eq!(kind.to_string(), wire);
        assert_eq!(wire.parse::<ErrorKind>().expect("wire name parses"), kind);
        assert_eq!(kind.stage(), stage);
        let json = serde_json::to_string(&kind).expect("serialise kind");
        assert_eq!(json, format!("\"{wire}\""));
    }

    #[test]
    fn task_error_serialises_as_failure_payload() {
        let error = TaskError::new(ErrorKind::Parse, "unexpected token");
        let json = serde_json::to_value(&error).expect("serialise");
        assert_eq!(
            json,
            serde_json::json!({"error": "PARSE", "message": "unexpected token"})
        );
        let back: TaskError = serde_json::from_value(json).expect("deserialise");
        assert_eq!(back, error);
    }

    #[test]
    fn evaluate_failures_keep_message_verbatim() {
        let error = TaskError::from_evaluate(EvaluateError::syntax("x is not defined"));
        assert_eq!(error.kind(), ErrorKind::Parse);
        assert_eq!(error.message(), "x is not defined");
    }

    #[rstest]
    #[case(EvaluateError::no_return("nothing returned"), ErrorKind::NoReturn)]
    #[case(EvaluateError::no_element("returned 42"), ErrorKind::NoElement)]
    fn evaluate_refinements_map_to_their_kinds(
        #[case] source: EvaluateError,
        #[case] expected: ErrorKind,
    ) {
        assert_eq!(TaskError::from_evaluate(source).kind(), expected);
    }

    #[test]
    fn stage_boundaries_tag_generate_and_render() {
        let generate = TaskError::from_serialize(&SerializeError::new("bad attribute"));
        let render = TaskError::from_encode(&EncodeError::new("unsupported size"));
        assert_eq!(generate.kind(), ErrorKind::Generate);
        assert_eq!(render.kind(), ErrorKind::Render);
        assert_eq!(render.message(), "unsupported size");
    }

    #[test]
    fn unknown_task_names_the_task() {
        let error = TaskError::unknown_task("rotate");
        assert_eq!(error.kind(), ErrorKind::Unknown);
        assert!(error.message().contains("rotate"));
    }
}
