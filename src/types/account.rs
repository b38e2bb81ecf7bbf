//! Account-related types for the ledger server
//!
//! This module defines the Account structure stored positionally in the
//! accounts file, one record per user identifier.

use super::RecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Whether an account may take part in balance operations and logins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Usable account
    Active,

    /// Frozen account, or the placeholder record reserved for a staff user
    ///
    /// Deactivated customers cannot log in and deactivated accounts cannot
    /// be credited or debited.
    Deactivated,
}

impl AccountStatus {
    /// Stable on-disk tag
    pub fn tag(self) -> u8 {
        match self {
            AccountStatus::Deactivated => 0,
            AccountStatus::Active => 1,
        }
    }

    /// Decode an on-disk tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(AccountStatus::Deactivated),
            1 => Some(AccountStatus::Active),
            _ => None,
        }
    }
}

/// Customer bank account
///
/// Shares its identifier with the owning [`super::User`]: the record at
/// position `i` of the accounts file always carries `id == i + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Identifier, equal to the owning user's identifier
    pub id: RecordId,

    /// Current balance
    ///
    /// Never driven negative by withdraw or transfer; the store itself does
    /// not enforce this.
    pub balance: Decimal,

    /// Active or deactivated
    pub status: AccountStatus,
}

impl Account {
    /// Create a new active account with a zero balance
    pub fn new(id: RecordId) -> Self {
        Account {
            id,
            balance: Decimal::ZERO,
            status: AccountStatus::Active,
        }
    }

    /// Create the deactivated placeholder reserved for a staff user
    pub fn placeholder(id: RecordId) -> Self {
        Account {
            id,
            balance: Decimal::ZERO,
            status: AccountStatus::Deactivated,
        }
    }

    /// Whether the account is active
    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }
}
