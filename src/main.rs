//! Ledger Server CLI
//!
//! # Usage
//!
//! ```bash
//! cargo run -- init --data-dir data --admin-username admin --admin-password adminpass
//! cargo run -- serve --data-dir data --bind 127.0.0.1:7878
//! cargo run -- serve --worker-threads 8 --password-cost 10
//! cargo run -- report --data-dir data > accounts.csv
//! ```
//!
//! Logs go to stderr, filtered by `RUST_LOG` or else `--log-level`.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (stores not readable, address in use, store already initialized, etc.)

use ledger_server::cli::{self, commands, Command};
use ledger_server::server;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    let args = cli::parse_args();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match &args.command {
        Command::Serve(serve) => server::run_server(serve.to_server_config()),
        Command::Init(init) => commands::run_init(init).map(|_| ()),
        Command::Report(report) => commands::run_report(report, &mut std::io::stdout()),
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
