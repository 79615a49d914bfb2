//! Precedence between flags, environment variables and defaults.

use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::rstest;

use gum_pipe_config::{Config, ConfigError, DEFAULT_SIZE, LogFormat};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialises environment access and restores the previous value on drop.
struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = lock_env();
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` on edition 2024; the mutex keeps
        // tests in this binary from racing each other.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

fn lock_env() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn load(args: &[&str]) -> Result<Config, ConfigError> {
    let mut argv = vec!["gum-piped"];
    argv.extend_from_slice(args);
    Config::load_from_iter(argv)
}

#[test]
fn defaults_apply_without_flags_or_environment() {
    let _guard = lock_env();
    let config = load(&[]).expect("defaults load");
    assert_eq!(config.default_size, DEFAULT_SIZE);
    assert_eq!(config.default_theme, "light");
    assert_eq!(config.default_background, "white");
    assert!(config.evaluator().is_none());
}

#[test]
fn environment_overrides_defaults() {
    let _env = EnvOverride::set_var("GUM_PIPE_DEFAULT_SIZE", OsStr::new("512"));
    let config = load(&[]).expect("environment load");
    assert_eq!(config.default_size, 512);
}

#[test]
fn flags_override_environment() {
    let _env = EnvOverride::set_var("GUM_PIPE_DEFAULT_THEME", OsStr::new("dark"));
    let config = load(&["--default-theme", "sepia"]).expect("flag load");
    assert_eq!(config.default_theme, "sepia");
}

#[rstest]
#[case("json", LogFormat::Json)]
#[case("compact", LogFormat::Compact)]
fn log_format_flag_parses(#[case] raw: &str, #[case] expected: LogFormat) {
    let _guard = lock_env();
    let config = load(&["--log-format", raw]).expect("log format load");
    assert_eq!(config.log_format(), expected);
}

#[test]
fn evaluator_arguments_accumulate() {
    let _guard = lock_env();
    let config = load(&[
        "--evaluator",
        "node",
        "--evaluator-arg",
        "eval.js",
        "--evaluator-arg",
        "--strict",
    ])
    .expect("evaluator load");
    assert_eq!(
        config.evaluator().map(|path| path.to_string_lossy().into_owned()),
        Some("node".to_owned())
    );
    assert_eq!(config.evaluator_args, vec!["eval.js", "--strict"]);
}

#[test]
fn zero_workers_fail_validation() {
    let _guard = lock_env();
    let error = load(&["--workers", "0"]).expect_err("zero workers rejected");
    assert!(matches!(error, ConfigError::Invalid { field: "workers", .. }));
}

#[test]
fn malformed_size_fails_parsing() {
    let _guard = lock_env();
    let error = load(&["--default-size", "large"]).expect_err("non-numeric size rejected");
    assert!(matches!(error, ConfigError::Parse(_)));
}
