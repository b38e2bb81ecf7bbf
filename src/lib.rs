//! Ledger Server Library
//! # Overview
//!
//! This library implements a multi-client financial ledger server. Sessions
//! authenticate as one of four roles and run balance operations and record
//! maintenance against durable fixed-layout record stores shared by every
//! session.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (User, Account, Transaction, Loan, Feedback, errors)
//! - [`store`] - Fixed-size record files addressed by identifier
//! - [`core`] - Business logic components:
//!   - [`core::lock_manager`] - Per-record shared/exclusive locks with a global order
//!   - [`core::ledger`] - Deposit, withdraw, view balance, transfer and history
//!   - [`core::directory`] - Customer and staff creation, profiles, logins
//!   - [`core::loans`] - Loan applications and their lifecycle
//!   - [`core::feedback`] - Customer feedback notes
//!   - [`core::engine`] - Wiring of stores, lock table and operations
//! - [`session`] - Login state and request dispatch for one connection
//! - [`io`] - Wire protocol and the operator CSV report
//! - [`server`] - Connection acceptance, session tasks and a framed client
//! - [`config`] / [`cli`] - Server configuration and command-line parsing
//!
//! # Roles
//!
//! - **Customer**: view balance, deposit, withdraw, transfer, apply for and check a loan,
//!   view own transactions, leave feedback
//! - **Employee**: add and modify customers, process loans, view assigned loans,
//!   view a customer's transactions
//! - **Manager**: activate/deactivate accounts, assign loans to employees, review feedback
//! - **Administrator**: add employees and managers
//!
//! Every authenticated user may change their own password.
//!
//! # Concurrency
//!
//! Every store mutation runs under record locks from a shared
//! [`core::RecordLockManager`]. Transfers lock both accounts in ascending
//! identifier order, which rules out deadlock between opposite transfers.

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod server;
pub mod session;
pub mod store;
pub mod types;

pub use config::ServerConfig;
pub use core::{BankEngine, Directory, FeedbackLog, Ledger, LoanLedger, RecordLockManager};
pub use io::{Request, Response};
pub use server::LedgerClient;
pub use session::SessionDispatcher;
pub use store::{Record, RecordStore};
pub use types::{
    Account, AccountStatus, ErrorKind, Feedback, LedgerError, Loan, LoanStatus, Profile, RecordId,
    Role, Transaction, TransactionKind, User,
};
