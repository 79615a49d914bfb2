//! Server bootstrap: collaborator wiring and the serve entry points.

use std::io::{self, BufRead, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use gum_pipe_config::Config;

use crate::dispatch::{Pipeline, PipelineError, PipelineSummary, TaskRegistry};
use crate::engine::{Evaluator, ProcessEvaluator, ResvgEncoder, SvgEvaluator, system_fonts};
use crate::health::{HealthReporter, StructuredHealthReporter};
use crate::telemetry::{self, TelemetryError};

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServeError {
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The request loop stopped with an error.
    #[error("request loop failed: {source}")]
    Pipeline {
        /// Underlying loop error.
        #[source]
        source: PipelineError,
    },
}

/// Builds the task registry for `config`.
///
/// An external evaluator is used when one is configured, otherwise the
/// built-in SVG evaluator. The system font database is loaded once and
/// shared with the raster encoder.
#[must_use]
pub fn build_registry(config: &Config) -> TaskRegistry {
    let fonts = system_fonts();
    let evaluator: Arc<dyn Evaluator> = match config.evaluator() {
        Some(program) => Arc::new(ProcessEvaluator::new(
            program,
            config.evaluator_args.clone(),
            Duration::from_secs(config.evaluator_timeout_secs),
        )),
        None => Arc::new(SvgEvaluator::with_fonts(Arc::clone(&fonts))),
    };
    TaskRegistry::new(evaluator, Arc::new(ResvgEncoder::with_fonts(fonts)))
}

/// Initialises telemetry and serves standard input until end of stream.
///
/// # Errors
///
/// Returns [`ServeError`] if telemetry cannot be installed or the request
/// loop fails.
pub fn serve(config: &Config) -> Result<PipelineSummary, ServeError> {
    telemetry::initialise(config).map_err(|source| ServeError::Telemetry { source })?;
    let reporter = StructuredHealthReporter::new();
    serve_with(
        config,
        &reporter,
        BufReader::new(io::stdin()),
        io::stdout().lock(),
    )
}

/// Serves `input` to `output` using collaborators built from `config`.
///
/// # Errors
///
/// Returns [`ServeError::Pipeline`] when the request loop fails.
pub fn serve_with<R, W>(
    config: &Config,
    reporter: &dyn HealthReporter,
    input: R,
    output: W,
) -> Result<PipelineSummary, ServeError>
where
    R: BufRead + Send + 'static,
    W: Write,
{
    reporter.serve_starting(config);
    let pipeline = Pipeline::new(build_registry(config), config);
    match pipeline.run(input, output) {
        Ok(summary) => {
            reporter.serve_finished(&summary);
            Ok(summary)
        }
        Err(source) => {
            let error = ServeError::Pipeline { source };
            reporter.serve_failed(&error);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<String>>,
    }

    impl RecordingReporter {
        fn record(&self, event: String) {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event);
        }

        fn events(&self) -> Vec<String> {
            self.events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    impl HealthReporter for RecordingReporter {
        fn serve_starting(&self, config: &Config) {
            self.record(format!("starting:{}", config.workers));
        }

        fn serve_finished(&self, summary: &PipelineSummary) {
            self.record(format!("finished:{}:{}", summary.requests, summary.failures));
        }

        fn serve_failed(&self, _error: &ServeError) {
            self.record("failed".to_owned());
        }
    }

    fn config() -> Config {
        Config {
            workers: 2,
            ..Config::default()
        }
    }

    #[test]
    fn serves_with_builtin_evaluator() {
        let reporter = RecordingReporter::default();
        let input = concat!(
            r#"{"task":"evaluate","code":"<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"10\" height=\"10\"><rect width=\"10\" height=\"10\"/></svg>"}"#,
            "\n",
            r#"{"task":"evaluate"}"#,
            "\n"
        );
        let mut output = Vec::new();
        let summary = serve_with(
            &config(),
            &reporter,
            Cursor::new(input.as_bytes().to_vec()),
            &mut output,
        )
        .expect("serve");

        assert_eq!(summary.requests, 2);
        assert_eq!(summary.failures, 1);
        assert_eq!(reporter.events(), ["starting:2", "finished:2:1"]);
        let text = String::from_utf8(output).expect("utf8");
        assert!(text.starts_with(r#"{"ok":true,"result":"<svg"#), "output: {text}");
    }

    #[cfg(unix)]
    #[test]
    fn configured_evaluator_replaces_builtin() {
        let config = Config {
            evaluator: Some("/bin/sh".into()),
            evaluator_args: vec![
                "-c".to_owned(),
                r#"cat >/dev/null; printf '%s\n' '{"ok":false,"error":"no_return","message":"nothing returned"}'"#
                    .to_owned(),
            ],
            ..config()
        };
        let reporter = RecordingReporter::default();
        let mut output = Vec::new();
        serve_with(
            &config,
            &reporter,
            Cursor::new(br#"{"task":"evaluate","code":"x"}"#.to_vec()),
            &mut output,
        )
        .expect("serve");

        let line: serde_json::Value =
            serde_json::from_slice(output.trim_ascii_end()).expect("json");
        assert_eq!(line["result"]["error"], "NORETURN");
        assert_eq!(line["result"]["message"], "nothing returned");
    }
}
