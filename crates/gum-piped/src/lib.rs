//! Line-oriented JSON server that evaluates and renders gum graphics.
//!
//! The server reads one JSON request per line from standard input and writes
//! one JSON response per line to standard output, in the same order. Each
//! request names a task: `evaluate` turns graphics-description source into
//! SVG markup, `render` additionally rasterises that markup to a PNG and
//! returns it base64-encoded. Failures never stop the loop; they are
//! answered with a kind naming the stage that failed.
//!
//! The crate is organised in three layers:
//!
//! - [`engine`] holds the graphics collaborators behind the [`Evaluator`],
//!   [`Element`] and [`RasterEncoder`] traits.
//! - [`dispatch`] decodes requests, routes them through the
//!   [`TaskRegistry`] and runs the ordered worker pipeline.
//! - The bootstrap functions wire configuration, telemetry and health
//!   reporting around the pipeline.
//!
//! Logs are written to standard error only, so standard output carries
//! nothing but response lines.
//!
//! [`Evaluator`]: engine::Evaluator
//! [`Element`]: engine::Element
//! [`RasterEncoder`]: engine::RasterEncoder
//! [`TaskRegistry`]: dispatch::TaskRegistry

mod bootstrap;
pub mod dispatch;
pub mod engine;
mod health;
mod telemetry;

pub use bootstrap::{ServeError, build_registry, serve, serve_with};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
