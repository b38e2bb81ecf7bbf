//! I/O module
//!
//! Handles the client wire protocol and operator output.
//!
//! # Components
//!
//! - `wire` - Request/response types and the length-prefixed frame codec
//! - `report` - CSV report of the account store

pub mod report;
pub mod wire;

pub use report::write_accounts_csv;
pub use wire::{CommandCode, Payload, Request, Response};
