//! Shared configuration for the gum pipe server.
//!
//! Settings are resolved from command-line flags first, then from
//! `GUM_PIPE_*` environment variables, then from the compiled-in defaults in
//! [`defaults`]. The resolved [`Config`] carries the request defaults applied
//! by the decoder, the worker pool size, the evaluator selection, and the
//! telemetry options.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use clap::Parser;
use thiserror::Error;

mod defaults;
mod logging;

pub use defaults::{
    DEFAULT_BACKGROUND, DEFAULT_EVALUATOR_TIMEOUT_SECS, DEFAULT_LOG_FILTER,
    DEFAULT_MAX_REQUEST_BYTES, DEFAULT_SIZE, DEFAULT_THEME, default_log_filter,
    default_log_format, default_workers,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Resolved runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(
    name = "gum-piped",
    version,
    about = "Line-oriented JSON server that evaluates and renders gum graphics"
)]
pub struct Config {
    /// Number of worker threads executing requests concurrently.
    #[arg(long, env = "GUM_PIPE_WORKERS", default_value_t = default_workers())]
    pub workers: usize,

    /// Largest accepted request line in bytes.
    #[arg(long, env = "GUM_PIPE_MAX_REQUEST_BYTES", default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,

    /// Raster size used when a request omits `size`.
    #[arg(long, env = "GUM_PIPE_DEFAULT_SIZE", default_value_t = DEFAULT_SIZE)]
    pub default_size: u32,

    /// Theme used when a request omits `theme`.
    #[arg(long, env = "GUM_PIPE_DEFAULT_THEME", default_value = DEFAULT_THEME)]
    pub default_theme: String,

    /// Background colour used when a request omits `background`.
    #[arg(long, env = "GUM_PIPE_DEFAULT_BACKGROUND", default_value = DEFAULT_BACKGROUND)]
    pub default_background: String,

    /// External evaluator command. The built-in SVG evaluator is used when unset.
    #[arg(long, env = "GUM_PIPE_EVALUATOR", value_name = "PROGRAM")]
    pub evaluator: Option<PathBuf>,

    /// Extra argument passed to the external evaluator (repeatable).
    #[arg(long = "evaluator-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub evaluator_args: Vec<String>,

    /// Seconds an external evaluator may run before it is killed.
    #[arg(
        long,
        env = "GUM_PIPE_EVALUATOR_TIMEOUT_SECS",
        default_value_t = DEFAULT_EVALUATOR_TIMEOUT_SECS
    )]
    pub evaluator_timeout_secs: u64,

    /// Tracing filter expression.
    #[arg(long, env = "GUM_PIPE_LOG_FILTER", default_value = DEFAULT_LOG_FILTER)]
    pub log_filter: String,

    /// Log output format (`json` or `compact`).
    #[arg(long, env = "GUM_PIPE_LOG_FORMAT", default_value_t = default_log_format())]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            default_size: DEFAULT_SIZE,
            default_theme: DEFAULT_THEME.to_owned(),
            default_background: DEFAULT_BACKGROUND.to_owned(),
            evaluator: None,
            evaluator_args: Vec::new(),
            evaluator_timeout_secs: DEFAULT_EVALUATOR_TIMEOUT_SECS,
            log_filter: default_log_filter().to_owned(),
            log_format: default_log_format(),
        }
    }
}

/// Request option values applied when a request omits them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderDefaults {
    /// Raster size in pixels along the larger side.
    pub size: u32,
    /// Theme identifier.
    pub theme: String,
    /// Background colour.
    pub background: String,
}

impl Default for RenderDefaults {
    fn default() -> Self {
        Self {
            size: DEFAULT_SIZE,
            theme: DEFAULT_THEME.to_owned(),
            background: DEFAULT_BACKGROUND.to_owned(),
        }
    }
}

/// Errors raised while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line or environment input could not be parsed.
    #[error(transparent)]
    Parse(#[from] clap::Error),
    /// A value parsed but is outside its permitted range.
    #[error("invalid value for {field}: {message}")]
    Invalid {
        /// Offending setting.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for unparseable input (including
    /// `--help` and `--version` requests) and [`ConfigError::Invalid`] when a
    /// value fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(std::env::args_os())
    }

    /// Loads configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name.
    ///
    /// # Errors
    ///
    /// See [`Config::load`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let config = Self::try_parse_from(args)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that the parser cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "at least one worker is required"));
        }
        if self.max_request_bytes == 0 {
            return Err(ConfigError::invalid(
                "max-request-bytes",
                "the request limit must be positive",
            ));
        }
        if self.default_size == 0 {
            return Err(ConfigError::invalid("default-size", "the size must be positive"));
        }
        if self.evaluator_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "evaluator-timeout-secs",
                "the timeout must be positive",
            ));
        }
        Ok(())
    }

    /// Option values applied to requests that omit them.
    #[must_use]
    pub fn render_defaults(&self) -> RenderDefaults {
        RenderDefaults {
            size: self.default_size,
            theme: self.default_theme.clone(),
            background: self.default_background.clone(),
        }
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_str()
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// External evaluator program, when one is configured.
    #[must_use]
    pub fn evaluator(&self) -> Option<&Path> {
        self.evaluator.as_deref()
    }
}
