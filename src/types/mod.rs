//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account records and their status
//! - `user`: Users, roles and profiles
//! - `transaction`: Balance history entries
//! - `loan`: Loan applications and their status machine
//! - `feedback`: Customer feedback notes
//! - `error`: Error taxonomy for the ledger

pub mod account;
pub mod error;
pub mod feedback;
pub mod loan;
pub mod transaction;
pub mod user;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use account::{Account, AccountStatus};
pub use error::{ErrorKind, LedgerError};
pub use feedback::Feedback;
pub use loan::{Loan, LoanStatus};
pub use transaction::{Transaction, TransactionKind};
pub use user::{Profile, Role, User, UserSummary};

/// Record identifier
///
/// 1-based position of a record in its store. 0 never addresses a record.
pub type RecordId = u32;

/// The durable stores
///
/// The declaration order is the global lock order between stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    Users,
    Accounts,
    Transactions,
    Loans,
    Feedback,
}

impl StoreKind {
    /// File name of the store inside the data directory
    pub fn file_name(self) -> &'static str {
        match self {
            StoreKind::Users => "users.dat",
            StoreKind::Accounts => "accounts.dat",
            StoreKind::Transactions => "transactions.dat",
            StoreKind::Loans => "loans.dat",
            StoreKind::Feedback => "feedback.dat",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StoreKind::Users => "user",
            StoreKind::Accounts => "account",
            StoreKind::Transactions => "transaction",
            StoreKind::Loans => "loan",
            StoreKind::Feedback => "feedback",
        };
        f.write_str(name)
    }
}
