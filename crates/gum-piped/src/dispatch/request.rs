//! Request decoding for the dispatch loop.
//!
//! This module turns one JSONL request line into a typed [`Request`]. The
//! decoder only checks structure: the line must be a JSON object carrying a
//! non-empty `code` string, and any supplied options must have the right
//! type. The task name is passed through untouched; whether it names a known
//! task is decided by the registry.

use gum_pipe_config::RenderDefaults;
use serde::Deserialize;
use serde_json::Value;

use super::errors::TaskError;

/// Options controlling evaluation and rasterisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Output size in pixels along the larger side.
    pub size: u32,
    /// Theme identifier passed to the evaluator.
    pub theme: String,
    /// Background colour for raster output.
    pub background: String,
}

impl From<RenderDefaults> for RenderOptions {
    fn from(defaults: RenderDefaults) -> Self {
        Self {
            size: defaults.size,
            theme: defaults.theme,
            background: defaults.background,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderDefaults::default().into()
    }
}

/// Decoded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    task: String,
    code: String,
    options: RenderOptions,
}

/// Fields accepted on the wire. Unrecognised fields are ignored.
#[derive(Debug, Deserialize)]
struct RequestFields {
    #[serde(default)]
    task: Option<String>,
    code: String,
    #[serde(default)]
    size: Option<u32>,
    #[serde(default)]
    theme: Option<String>,
    #[serde(default)]
    background: Option<String>,
}

impl Request {
    /// Creates a request directly.
    pub fn new(task: impl Into<String>, code: impl Into<String>, options: RenderOptions) -> Self {
        Self {
            task: task.into(),
            code: code.into(),
            options,
        }
    }

    /// Decodes a JSONL line, filling omitted options from `defaults`.
    ///
    /// Trailing whitespace (including the newline delimiter) is trimmed
    /// before parsing.
    ///
    /// # Errors
    ///
    /// Returns a missing-code error when the object has no usable `code`
    /// field, whatever else it contains. Any other structural problem (empty
    /// line, invalid JSON, a non-object value, mistyped fields, a zero size)
    /// is reported with the unknown kind.
    pub fn decode(line: &[u8], defaults: &RenderDefaults) -> Result<Self, TaskError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(TaskError::malformed("empty request line"));
        }

        let value: Value = serde_json::from_slice(trimmed)
            .map_err(|error| TaskError::malformed(format!("malformed JSON request: {error}")))?;
        let Value::Object(object) = value else {
            return Err(TaskError::malformed("request must be a JSON object"));
        };

        match object.get("code") {
            None | Some(Value::Null) => return Err(TaskError::missing_code()),
            Some(Value::String(code)) if code.is_empty() => return Err(TaskError::missing_code()),
            Some(_) => {}
        }

        let fields: RequestFields = serde_json::from_value(Value::Object(object))
            .map_err(|error| TaskError::malformed(format!("invalid request field: {error}")))?;

        let size = fields.size.unwrap_or(defaults.size);
        if size == 0 {
            return Err(TaskError::malformed("size must be a positive integer"));
        }

        Ok(Self {
            task: fields.task.unwrap_or_default(),
            code: fields.code,
            options: RenderOptions {
                size,
                theme: fields.theme.unwrap_or_else(|| defaults.theme.clone()),
                background: fields
                    .background
                    .unwrap_or_else(|| defaults.background.clone()),
            },
        })
    }

    /// Requested task name, as sent.
    #[must_use]
    pub fn task(&self) -> &str {
        self.task.as_str()
    }

    /// Graphics-description source.
    #[must_use]
    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    /// Resolved options.
    #[must_use]
    pub const fn options(&self) -> &RenderOptions {
        &self.options
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or_default()
}
