//! JSONL request dispatch for the pipe server.
//!
//! This module implements the loop that reads requests from an input stream,
//! routes each to a task handler and writes one response per request back in
//! arrival order. Requests run concurrently on a worker pool; the order of
//! responses never depends on which request finishes first.
//!
//! ## Protocol
//!
//! Each input line is one JSON object:
//!
//! ```json
//! {"task":"render","code":"<svg ...>","size":400,"background":"black"}
//! ```
//!
//! `size`, `theme` and `background` are optional and fall back to the
//! configured defaults. Each response is one JSON object on its own line:
//!
//! ```json
//! {"ok":true,"result":"iVBORw0KGgo..."}
//! {"ok":false,"result":{"error":"PARSE","message":"invalid SVG source: ..."}}
//! ```
//!
//! ## Failure kinds
//!
//! Failures are tagged with the first stage that failed: `NOCODE` while
//! decoding, `PARSE` (refined to `NORETURN` or `NOELEMENT` where the
//! evaluator can tell) while evaluating, `GENERATE` while serialising,
//! `RENDER` while rasterising. Unknown tasks, malformed lines and anything
//! unclassified are `UNKNOWN`.

mod errors;
mod pipeline;
mod registry;
mod request;
mod response;
mod sequencer;

pub use self::errors::{ErrorKind, PipelineError, Stage, TaskError};
pub use self::pipeline::{Pipeline, PipelineSummary};
pub use self::registry::{EvaluateTask, RenderTask, TaskHandler, TaskName, TaskRegistry};
pub use self::request::{RenderOptions, Request};
pub use self::response::{Response, ResponsePayload, ResponseWriter};
pub use self::sequencer::Sequencer;

/// Tracing target for dispatch operations.
pub(crate) const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");
