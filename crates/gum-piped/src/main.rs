//! Command-line entry point for the gum pipe server.

use std::io::{self, Write};
use std::process::ExitCode;

use clap::CommandFactory;
use clap::error::ErrorKind;
use gum_pipe_config::{Config, ConfigError};

fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(ConfigError::Parse(error)) => error.exit(),
        Err(error @ ConfigError::Invalid { .. }) => Config::command()
            .error(ErrorKind::ValueValidation, error)
            .exit(),
    };

    match gum_piped::serve(&config) {
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            drop(writeln!(io::stderr(), "gum-piped: {error}"));
            ExitCode::FAILURE
        }
    }
}
