//! Offline subcommands
//!
//! `init` and `report` work on the store files directly, without a server.

use super::args::{InitArgs, ReportArgs};
use crate::config::password_cost_or_default;
use crate::core::BankEngine;
use crate::io::write_accounts_csv;
use crate::types::{LedgerError, User};
use std::io::Write;
use tracing::info;

/// Create the data directory and its first administrator
///
/// The emptiness check only excludes concurrent callers inside this
/// process. Record locks live in memory, so two `init` processes (or an
/// `init` next to a running server) on the same data directory are not
/// coordinated and may both write an administrator.
///
/// # Errors
///
/// - `InvalidAction` if the users store already holds users
pub fn run_init(args: &InitArgs) -> Result<User, LedgerError> {
    let cost = password_cost_or_default(args.password_cost.unwrap_or(bcrypt::DEFAULT_COST));
    let engine = BankEngine::open(&args.data_dir, cost)?;
    let admin = engine
        .directory()
        .bootstrap_administrator(&args.admin_username, &args.admin_password)?;
    engine.sync()?;
    info!(user = admin.id, data_dir = %args.data_dir.display(), "administrator created");
    Ok(admin)
}

/// Write the accounts report of a data directory
pub fn run_report(args: &ReportArgs, output: &mut dyn Write) -> Result<(), LedgerError> {
    let engine = BankEngine::open(&args.data_dir, bcrypt::DEFAULT_COST)?;
    let users = engine.users_snapshot()?;
    let accounts = engine.accounts_snapshot()?;
    write_accounts_csv(&users, &accounts, output)
}
