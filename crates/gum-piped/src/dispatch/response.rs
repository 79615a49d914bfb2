//! Response serialisation for the dispatch loop.
//!
//! Every request produces exactly one [`Response`], written as a single JSONL
//! line by [`ResponseWriter`]:
//!
//! ```json
//! {"ok":true,"result":"<svg ...>"}
//! {"ok":false,"result":{"error":"NOCODE","message":"request has no code to evaluate"}}
//! ```

use std::io::Write;

use serde::{Deserialize, Serialize};

use super::errors::{PipelineError, TaskError};

/// Payload carried in the `result` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Task output: markup for `evaluate`, base64 image bytes for `render`.
    Success(String),
    /// Classified failure.
    Failure(TaskError),
}

/// Response line sent for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the task succeeded.
    pub ok: bool,
    /// Task output or failure details.
    pub result: ResponsePayload,
}

impl Response {
    /// Successful response carrying `result`.
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            ok: true,
            result: ResponsePayload::Success(result.into()),
        }
    }

    /// Failed response carrying `error`.
    pub fn failure(error: TaskError) -> Self {
        Self {
            ok: false,
            result: ResponsePayload::Failure(error),
        }
    }

    /// Builds the response for a task outcome.
    pub fn from_outcome(outcome: Result<String, TaskError>) -> Self {
        match outcome {
            Ok(result) => Self::success(result),
            Err(error) => Self::failure(error),
        }
    }

    /// Returns the failure, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        match &self.result {
            ResponsePayload::Failure(error) => Some(error),
            ResponsePayload::Success(_) => None,
        }
    }
}

/// Writer that frames responses as JSONL.
///
/// Each response is followed by a newline and an explicit flush so a client
/// reading line by line sees it as soon as it is written.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes one response line and flushes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation, writing or flushing fails.
    pub fn write_response(&mut self, response: &Response) -> Result<(), PipelineError> {
        let mut line = serde_json::to_vec(response)?;
        line.push(b'\n');
        self.writer
            .write_all(&line)
            .and_then(|()| self.writer.flush())
            .map_err(PipelineError::Output)
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
