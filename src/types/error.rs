//! Error types for the ledger server
//!
//! This module defines all error types that can occur while serving a
//! session. Errors are designed to be descriptive: their `Display` text is
//! what a client sees in the response message.
//!
//! # Error Categories
//!
//! - **Lookup Errors**: record absent, store out of alignment
//! - **Authorization Errors**: bad credentials, wrong role, loan owned by someone else
//! - **Ledger Errors**: invalid amount, insufficient funds, same account, deactivated account
//! - **Loan Errors**: invalid action, forbidden status transition
//! - **Storage Errors**: I/O, corrupt records, lock table failures, partial multi-store writes
//!
//! Every variant maps onto a coarse [`ErrorKind`] that travels on the wire.

use super::{LoanStatus, RecordId, Role, StoreKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Unauthorized,
    InvalidAmount,
    InsufficientFunds,
    SameAccount,
    WrongRole,
    InvalidAction,
    Conflict,
    IoError,
    PartialFailure,
    Protocol,
}

/// Main error type for the ledger
///
/// This enum represents all possible errors that can occur while executing
/// an operation. Each variant includes relevant context to help diagnose
/// and resolve the issue.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Record absent from its store
    #[error("{store} {id} not found")]
    NotFound {
        /// Store that was searched
        store: StoreKind,
        /// Identifier that was requested
        id: RecordId,
    },

    /// Login failed or the session may not run the command
    ///
    /// Deliberately vague for logins so that unknown users, bad passwords
    /// and deactivated accounts are indistinguishable.
    #[error("Unauthorized: {reason}")]
    Unauthorized {
        /// Why the request was refused
        reason: String,
    },

    /// Amount is zero or negative
    #[error("Invalid amount {amount}: amounts must be positive")]
    InvalidAmount {
        /// The rejected amount
        amount: Decimal,
    },

    /// Withdrawal or transfer exceeds the balance
    #[error("Insufficient funds in account {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        /// Debited account
        account: RecordId,
        /// Balance at the time of the check
        balance: Decimal,
        /// Requested amount
        requested: Decimal,
    },

    /// Transfer source and target are the same account
    #[error("Cannot transfer from account {account} to itself")]
    SameAccount {
        /// The account named twice
        account: RecordId,
    },

    /// Target user does not have the role the operation requires
    #[error("User {user} is a {actual}, expected a {expected}")]
    WrongRole {
        /// Target user
        user: RecordId,
        /// Role the operation requires
        expected: Role,
        /// Role actually stored
        actual: Role,
    },

    /// Requested action is not valid in this context
    #[error("Invalid action: {action}")]
    InvalidAction {
        /// Description of the rejected action
        action: String,
    },

    /// Loan status change that would move backwards or leave a terminal state
    #[error("Loan {loan} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Loan identifier
        loan: RecordId,
        /// Current status
        from: LoanStatus,
        /// Requested status
        to: LoanStatus,
    },

    /// Loan is assigned to a different employee
    #[error("Loan {loan} is assigned to employee {assignee}")]
    LoanAssignedElsewhere {
        /// Loan identifier
        loan: RecordId,
        /// Employee currently assigned
        assignee: RecordId,
    },

    /// Account is deactivated and cannot take part in balance operations
    #[error("Account {account} is deactivated")]
    AccountDeactivated {
        /// Deactivated account
        account: RecordId,
    },

    /// Username already exists in the users store
    #[error("Username '{username}' is already taken")]
    UsernameTaken {
        /// The duplicate username
        username: String,
    },

    /// Text does not fit its fixed-width record field
    #[error("Field '{field}' exceeds {max} bytes")]
    FieldTooLong {
        /// Field name
        field: String,
        /// Field capacity in bytes
        max: usize,
    },

    /// Balance arithmetic would overflow
    #[error("Arithmetic overflow in {operation} for account {account}")]
    ArithmeticOverflow {
        /// Operation that would overflow
        operation: String,
        /// Account identifier
        account: RecordId,
    },

    /// Appended record does not carry the next free identifier
    #[error("Stale identifier for {store} store: expected {expected}, got {actual}")]
    StaleIdentifier {
        /// Store being appended to
        store: StoreKind,
        /// Next free identifier
        expected: RecordId,
        /// Identifier carried by the record
        actual: RecordId,
    },

    /// Users and accounts stores no longer share their next identifier
    #[error("Users store expects id {users} but accounts store expects id {accounts}")]
    StoreMisaligned {
        /// Next id of the users store
        users: RecordId,
        /// Next id of the accounts store
        accounts: RecordId,
    },

    /// A multi-store write only partly succeeded
    ///
    /// Nothing is rolled back; operators reconcile the stores manually.
    #[error("Partial failure: {store} {id} was written but {detail}")]
    PartialFailure {
        /// Store whose record was written
        store: StoreKind,
        /// Identifier of the record that was written
        id: RecordId,
        /// What did not get written
        detail: String,
    },

    /// Record bytes do not decode
    #[error("Corrupt {store} record {id}: {reason}")]
    CorruptRecord {
        /// Store holding the record
        store: StoreKind,
        /// Record identifier
        id: RecordId,
        /// What failed to decode
        reason: String,
    },

    /// Record lock could not be obtained for a reason other than contention
    #[error("Lock on {store} record {id} is unavailable")]
    LockUnavailable {
        /// Store of the record
        store: StoreKind,
        /// Record identifier, 0 for the append cursor
        id: RecordId,
    },

    /// Password hashing or verification failed
    #[error("Password hashing failed: {message}")]
    PasswordHash {
        /// Description from the hashing library
        message: String,
    },

    /// I/O error while reading or writing a store or the network
    #[error("I/O error: {message}")]
    IoError {
        /// Description of the I/O error
        message: String,
    },

    /// Frame could not be decoded as a request
    #[error("Malformed request: {message}")]
    Protocol {
        /// Description of the decoding failure
        message: String,
    },
}

// Conversion from io::Error to LedgerError
impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

// Conversion from serde_json::Error to LedgerError
impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::Protocol {
            message: error.to_string(),
        }
    }
}

impl From<bcrypt::BcryptError> for LedgerError {
    fn from(error: bcrypt::BcryptError) -> Self {
        LedgerError::PasswordHash {
            message: error.to_string(),
        }
    }
}

// Helper functions for creating common errors

impl LedgerError {
    /// Classify the error for the wire
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::NotFound { .. } => ErrorKind::NotFound,
            LedgerError::Unauthorized { .. } | LedgerError::LoanAssignedElsewhere { .. } => {
                ErrorKind::Unauthorized
            }
            LedgerError::InvalidAmount { .. } | LedgerError::ArithmeticOverflow { .. } => {
                ErrorKind::InvalidAmount
            }
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::SameAccount { .. } => ErrorKind::SameAccount,
            LedgerError::WrongRole { .. } => ErrorKind::WrongRole,
            LedgerError::InvalidAction { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::AccountDeactivated { .. }
            | LedgerError::FieldTooLong { .. } => ErrorKind::InvalidAction,
            LedgerError::UsernameTaken { .. } | LedgerError::StaleIdentifier { .. } => {
                ErrorKind::Conflict
            }
            LedgerError::PartialFailure { .. } => ErrorKind::PartialFailure,
            LedgerError::StoreMisaligned { .. }
            | LedgerError::CorruptRecord { .. }
            | LedgerError::LockUnavailable { .. }
            | LedgerError::PasswordHash { .. }
            | LedgerError::IoError { .. } => ErrorKind::IoError,
            LedgerError::Protocol { .. } => ErrorKind::Protocol,
        }
    }

    /// Create a NotFound error
    pub fn not_found(store: StoreKind, id: RecordId) -> Self {
        LedgerError::NotFound { store, id }
    }

    /// Create an Unauthorized error
    pub fn unauthorized(reason: &str) -> Self {
        LedgerError::Unauthorized {
            reason: reason.to_string(),
        }
    }

    /// Create an InvalidAmount error
    pub fn invalid_amount(amount: Decimal) -> Self {
        LedgerError::InvalidAmount { amount }
    }

    /// Create an InsufficientFunds error
    pub fn insufficient_funds(account: RecordId, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account,
            balance,
            requested,
        }
    }

    /// Create a SameAccount error
    pub fn same_account(account: RecordId) -> Self {
        LedgerError::SameAccount { account }
    }

    /// Create a WrongRole error
    pub fn wrong_role(user: RecordId, expected: Role, actual: Role) -> Self {
        LedgerError::WrongRole {
            user,
            expected,
            actual,
        }
    }

    /// Create an InvalidAction error
    pub fn invalid_action(action: &str) -> Self {
        LedgerError::InvalidAction {
            action: action.to_string(),
        }
    }

    /// Create an InvalidTransition error
    pub fn invalid_transition(loan: RecordId, from: LoanStatus, to: LoanStatus) -> Self {
        LedgerError::InvalidTransition { loan, from, to }
    }

    /// Create an AccountDeactivated error
    pub fn account_deactivated(account: RecordId) -> Self {
        LedgerError::AccountDeactivated { account }
    }

    /// Create a FieldTooLong error
    pub fn field_too_long(field: &str, max: usize) -> Self {
        LedgerError::FieldTooLong {
            field: field.to_string(),
            max,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, account: RecordId) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            account,
        }
    }

    /// Create a CorruptRecord error
    pub fn corrupt_record(store: StoreKind, id: RecordId, reason: &str) -> Self {
        LedgerError::CorruptRecord {
            store,
            id,
            reason: reason.to_string(),
        }
    }

    /// Create a PartialFailure error
    pub fn partial_failure(store: StoreKind, id: RecordId, detail: &str) -> Self {
        LedgerError::PartialFailure {
            store,
            id,
            detail: detail.to_string(),
        }
    }
}
