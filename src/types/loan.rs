//! Loan application types
//!
//! Loans are append-only records with a small forward-only status machine:
//!
//! ```text
//! Applied ──► Processed ──► Approved
//!    │                 └──► Rejected
//!    └──────────────► Approved | Rejected
//! ```

use super::RecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a loan application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Applied,
    Processed,
    Approved,
    Rejected,
}

impl LoanStatus {
    /// Stable on-disk tag
    pub fn tag(self) -> u8 {
        match self {
            LoanStatus::Applied => 1,
            LoanStatus::Processed => 2,
            LoanStatus::Approved => 3,
            LoanStatus::Rejected => 4,
        }
    }

    /// Decode an on-disk tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(LoanStatus::Applied),
            2 => Some(LoanStatus::Processed),
            3 => Some(LoanStatus::Approved),
            4 => Some(LoanStatus::Rejected),
            _ => None,
        }
    }

    /// Approved and Rejected never change again
    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Rejected)
    }

    /// Whether an employee may move a loan from `self` to `next`
    ///
    /// Transitions only go forward; re-entering the current status is not a
    /// transition.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        match (self, next) {
            (LoanStatus::Applied, LoanStatus::Processed) => true,
            (LoanStatus::Applied | LoanStatus::Processed, LoanStatus::Approved) => true,
            (LoanStatus::Applied | LoanStatus::Processed, LoanStatus::Rejected) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoanStatus::Applied => "applied",
            LoanStatus::Processed => "processed",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// Loan application record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    /// Identifier, `1 + position` in the loans file
    pub id: RecordId,

    /// Applying customer
    pub customer: RecordId,

    /// Requested principal
    pub amount: Decimal,

    pub tenure_months: u32,

    pub status: LoanStatus,

    /// Employee handling the loan, 0 while unassigned
    pub assignee: RecordId,
}

impl Loan {
    /// Create a fresh, unassigned application
    pub fn new(id: RecordId, customer: RecordId, amount: Decimal, tenure_months: u32) -> Self {
        Loan {
            id,
            customer,
            amount,
            tenure_months,
            status: LoanStatus::Applied,
            assignee: 0,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assignee != 0
    }
}
