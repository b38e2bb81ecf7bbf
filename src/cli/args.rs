use crate::config::{ServerConfig, DEFAULT_BIND_ADDR, DEFAULT_DATA_DIR};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Multi-client ledger server over fixed-layout record stores
#[derive(Parser, Debug)]
#[command(name = "ledger-server")]
#[command(about = "Multi-client ledger server over fixed-layout record stores", long_about = None)]
pub struct CliArgs {
    /// Log filter used when RUST_LOG is not set
    #[arg(
        long = "log-level",
        value_name = "FILTER",
        default_value = "info",
        global = true,
        help = "Log filter when RUST_LOG is unset (e.g. 'debug' or 'ledger_server=trace')"
    )]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept client connections and serve sessions
    Serve(ServeArgs),
    /// Create the stores and the first administrator
    Init(InitArgs),
    /// Print the accounts store as CSV
    Report(ReportArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(
        long = "bind",
        value_name = "ADDR",
        default_value = DEFAULT_BIND_ADDR,
        help = "Address to listen on"
    )]
    pub bind: String,

    #[arg(
        long = "data-dir",
        value_name = "DIR",
        default_value = DEFAULT_DATA_DIR,
        help = "Directory holding users.dat, accounts.dat and loans.dat"
    )]
    pub data_dir: PathBuf,

    #[arg(
        long = "worker-threads",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub worker_threads: Option<usize>,

    #[arg(
        long = "password-cost",
        value_name = "COST",
        help = "bcrypt cost for new passwords (default: 12, range: 4-31)"
    )]
    pub password_cost: Option<u32>,

    #[arg(
        long = "max-frame-bytes",
        value_name = "BYTES",
        help = "Largest accepted request frame (default: 65536)"
    )]
    pub max_frame_bytes: Option<usize>,
}

#[derive(Args, Debug)]
pub struct InitArgs {
    #[arg(long = "data-dir", value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,

    #[arg(long = "admin-username", value_name = "NAME")]
    pub admin_username: String,

    #[arg(long = "admin-password", value_name = "PASSWORD")]
    pub admin_password: String,

    #[arg(long = "password-cost", value_name = "COST")]
    pub password_cost: Option<u32>,
}

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[arg(long = "data-dir", value_name = "DIR", default_value = DEFAULT_DATA_DIR)]
    pub data_dir: PathBuf,
}

impl ServeArgs {
    /// Create a ServerConfig from CLI arguments
    ///
    /// Omitted options take their defaults; invalid values are replaced by
    /// the default with a logged warning.
    pub fn to_server_config(&self) -> ServerConfig {
        let default = ServerConfig::default();
        ServerConfig::new(
            self.bind.clone(),
            self.data_dir.clone(),
            self.worker_threads.unwrap_or(default.worker_threads),
            self.password_cost.unwrap_or(default.password_cost),
            self.max_frame_bytes.unwrap_or(default.max_frame_bytes),
        )
    }
}
