//! Operator report of the account store
//!
//! Writes one CSV row per account, joined with its owner in the users store:
//! `id, username, role, status, balance`. Rows are sorted by identifier.
//! Balances are printed with two decimal places.
//!
//! All functions are pure (no store access) for easy testing.

use crate::types::{Account, AccountStatus, LedgerError, User};
use std::collections::HashMap;
use std::io::Write;
use tracing::warn;

/// Write the accounts report as CSV
///
/// An account without a matching user is still reported, with empty owner
/// columns, and logged as a misalignment.
///
/// # Arguments
///
/// * `users` - Users store snapshot
/// * `accounts` - Accounts store snapshot
/// * `output` - Writer receiving the CSV
pub fn write_accounts_csv(
    users: &[User],
    accounts: &[Account],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let csv_error = |e: csv::Error| LedgerError::IoError {
        message: format!("Failed to write report: {}", e),
    };

    if users.len() != accounts.len() {
        warn!(
            users = users.len(),
            accounts = accounts.len(),
            "user and account stores are misaligned"
        );
    }
    let owners: HashMap<_, _> = users.iter().map(|u| (u.id, u)).collect();

    let mut writer = csv::Writer::from_writer(output);
    writer
        .write_record(["id", "username", "role", "status", "balance"])
        .map_err(csv_error)?;

    let mut sorted = accounts.to_vec();
    sorted.sort_by_key(|account| account.id);

    for account in sorted {
        let (username, role) = match owners.get(&account.id) {
            Some(user) => (user.username.clone(), user.role.to_string()),
            None => {
                warn!(account = account.id, "account has no owner");
                (String::new(), String::new())
            }
        };
        let status = match account.status {
            AccountStatus::Active => "active",
            AccountStatus::Deactivated => "deactivated",
        };
        writer
            .write_record(&[
                account.id.to_string(),
                username,
                role,
                status.to_string(),
                format!("{:.2}", account.balance),
            ])
            .map_err(csv_error)?;
    }

    writer.flush()?;
    Ok(())
}
