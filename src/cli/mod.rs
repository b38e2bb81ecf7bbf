// CLI module
// Command-line interface, argument parsing and offline subcommands

mod args;
pub mod commands;

pub use args::{CliArgs, Command, InitArgs, ReportArgs, ServeArgs};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// If parsing fails (invalid arguments, missing subcommand, or `--help`),
/// clap displays an error message or help text and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
