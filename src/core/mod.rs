//! Core business logic module
//!
//! This module contains the ledger's operation layer:
//! - `lock_manager` - Per-record shared/exclusive locks with a global order
//! - `ledger` - Balance operations (deposit, withdraw, transfer) and their history
//! - `directory` - User creation, profiles and authentication
//! - `loans` - Loan applications and their lifecycle
//! - `feedback` - Customer feedback notes
//! - `engine` - Wiring of stores, lock table and operations

pub mod directory;
pub mod engine;
pub mod feedback;
pub mod ledger;
pub mod loans;
pub mod lock_manager;

pub use directory::Directory;
pub use engine::BankEngine;
pub use feedback::FeedbackLog;
pub use ledger::{Ledger, TransferReceipt};
pub use loans::{AssignedLoans, LoanLedger};
pub use lock_manager::{LockKey, LockMode, LockSet, RecordGuard, RecordLockManager, Slot};
