//! Adverse-event report pipeline CLI.

use std::io::{self, IsTerminal};

use clap::Parser;

use aer_cli::cli::Cli;
use aer_cli::logging::init_logging;

mod commands;
mod summary;

use crate::commands::run_command;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = cli.log_config(io::stderr().is_terminal());
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match run_command(&cli.command, &cli.pipeline) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}
