//! Bank engine
//!
//! This module provides the `BankEngine`, which opens the record stores of
//! a data directory and wires them to one shared lock manager and the
//! operation sets built on top:
//!
//! ```text
//! BankEngine
//!     ├── RecordLockManager (shared by every operation)
//!     ├── Ledger      (accounts + transactions)
//!     ├── Directory   (users + accounts)
//!     ├── LoanLedger  (loans)
//!     └── FeedbackLog (feedback)
//! ```
//!
//! # Thread Safety
//!
//! `BankEngine` is `Send + Sync` and cheap to clone: every component holds
//! `Arc`s to the same stores and lock table. Sessions share one engine.

use super::directory::Directory;
use super::feedback::FeedbackLog;
use super::ledger::Ledger;
use super::loans::LoanLedger;
use super::lock_manager::RecordLockManager;
use crate::store::RecordStore;
use crate::types::{Account, Feedback, LedgerError, Loan, Transaction, User};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Stores, lock table and operations of one data directory
#[derive(Debug, Clone)]
pub struct BankEngine {
    data_dir: PathBuf,
    users: Arc<RecordStore<User>>,
    accounts: Arc<RecordStore<Account>>,
    transactions: Arc<RecordStore<Transaction>>,
    loans: Arc<RecordStore<Loan>>,
    notes: Arc<RecordStore<Feedback>>,
    ledger: Ledger,
    directory: Directory,
    loan_ledger: LoanLedger,
    feedback: FeedbackLog,
}

impl BankEngine {
    /// Open (creating if needed) the stores under `data_dir`
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory holding one `.dat` file per store
    /// * `password_cost` - bcrypt cost for passwords set through this engine
    ///
    /// # Errors
    ///
    /// Returns `IoError` if the directory or a store file cannot be opened.
    pub fn open(data_dir: impl AsRef<Path>, password_cost: u32) -> Result<Self, LedgerError> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir).map_err(|e| LedgerError::IoError {
            message: format!("cannot create {}: {}", data_dir.display(), e),
        })?;

        let users = Arc::new(RecordStore::open_in(&data_dir)?);
        let accounts = Arc::new(RecordStore::open_in(&data_dir)?);
        let transactions = Arc::new(RecordStore::open_in(&data_dir)?);
        let loans = Arc::new(RecordStore::open_in(&data_dir)?);
        let notes = Arc::new(RecordStore::open_in(&data_dir)?);
        let locks = Arc::new(RecordLockManager::new());

        let engine = BankEngine {
            ledger: Ledger::new(
                Arc::clone(&accounts),
                Arc::clone(&transactions),
                Arc::clone(&locks),
            ),
            directory: Directory::new(
                Arc::clone(&users),
                Arc::clone(&accounts),
                Arc::clone(&locks),
                password_cost,
            ),
            loan_ledger: LoanLedger::new(Arc::clone(&loans), Arc::clone(&locks)),
            feedback: FeedbackLog::new(Arc::clone(&notes), locks),
            data_dir,
            users,
            accounts,
            transactions,
            loans,
            notes,
        };

        if let Err(e) = engine.check_alignment() {
            warn!(error = %e, "user and account stores are misaligned; new users will be refused");
        }
        let users = engine.users.count()?;
        let loans = engine.loans.count()?;
        info!(data_dir = %engine.data_dir.display(), users, loans, "stores opened");
        Ok(engine)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn loans(&self) -> &LoanLedger {
        &self.loan_ledger
    }

    pub fn feedback(&self) -> &FeedbackLog {
        &self.feedback
    }

    /// Verify that the users and accounts stores share their next identifier
    pub fn check_alignment(&self) -> Result<(), LedgerError> {
        let users = self.users.next_id()?;
        let accounts = self.accounts.next_id()?;
        if users != accounts {
            return Err(LedgerError::StoreMisaligned { users, accounts });
        }
        Ok(())
    }

    /// Unlocked snapshot of every account, in identifier order
    pub fn accounts_snapshot(&self) -> Result<Vec<Account>, LedgerError> {
        self.accounts.scan()
    }

    /// Unlocked snapshot of every user, in identifier order
    pub fn users_snapshot(&self) -> Result<Vec<User>, LedgerError> {
        self.users.scan()
    }

    /// Flush all stores to disk
    pub fn sync(&self) -> Result<(), LedgerError> {
        self.users.sync()?;
        self.accounts.sync()?;
        self.transactions.sync()?;
        self.loans.sync()?;
        self.notes.sync()
    }
}
