use std::num::NonZeroUsize;
use std::thread;

/// Raster size, in pixels along the larger side, used when a request omits one.
pub const DEFAULT_SIZE: u32 = 750;

/// Theme identifier passed to the evaluator when a request omits one.
pub const DEFAULT_THEME: &str = "light";

/// Background colour used for raster output when a request omits one.
pub const DEFAULT_BACKGROUND: &str = "white";

/// Largest request line accepted, in bytes.
pub const DEFAULT_MAX_REQUEST_BYTES: usize = 1024 * 1024;

/// Seconds an external evaluator may run before it is killed.
pub const DEFAULT_EVALUATOR_TIMEOUT_SECS: u64 = 30;

/// Default log filter expression used by the binary.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binary.
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binary.
pub fn default_log_format() -> crate::logging::LogFormat {
    crate::logging::LogFormat::Json
}

/// Number of request workers, one per available core.
pub fn default_workers() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}
