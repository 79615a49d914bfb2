//! Structured health reporting for server lifecycle events.

use gum_pipe_config::Config;

use crate::bootstrap::ServeError;
use crate::dispatch::PipelineSummary;

/// Tracing target for lifecycle events.
const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked once configuration and telemetry are ready.
    fn serve_starting(&self, config: &Config);

    /// Invoked after the input stream has been fully served.
    fn serve_finished(&self, summary: &PipelineSummary);

    /// Invoked when serving stops with an error.
    fn serve_failed(&self, error: &ServeError);
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn serve_starting(&self, config: &Config) {
        let evaluator = config
            .evaluator()
            .map_or_else(|| "builtin-svg".to_owned(), |path| path.display().to_string());
        tracing::info!(
            target: HEALTH_TARGET,
            event = "serve_starting",
            workers = config.workers,
            evaluator = %evaluator,
            default_size = config.default_size,
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "serving requests from stdin"
        );
    }

    fn serve_finished(&self, summary: &PipelineSummary) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "serve_finished",
            requests = summary.requests,
            failures = summary.failures,
            "input exhausted; shutting down"
        );
    }

    fn serve_failed(&self, error: &ServeError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "serve_failed",
            error = %error,
            "serving stopped"
        );
    }
}
