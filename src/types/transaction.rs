//! Balance history types
//!
//! Every applied deposit, withdrawal and transfer leaves an append-only
//! entry in the transactions store. A transfer leaves two entries, one per
//! side, each pointing at the other account.

use super::RecordId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What happened to the account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deposit,
    Withdraw,
    TransferOut,
    TransferIn,
}

impl TransactionKind {
    /// Stable on-disk tag
    pub fn tag(self) -> u8 {
        match self {
            TransactionKind::Deposit => 1,
            TransactionKind::Withdraw => 2,
            TransactionKind::TransferOut => 3,
            TransactionKind::TransferIn => 4,
        }
    }

    /// Decode an on-disk tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(TransactionKind::Deposit),
            2 => Some(TransactionKind::Withdraw),
            3 => Some(TransactionKind::TransferOut),
            4 => Some(TransactionKind::TransferIn),
            _ => None,
        }
    }

    /// Whether the entry moved money out of the account
    pub fn is_debit(self) -> bool {
        matches!(self, TransactionKind::Withdraw | TransactionKind::TransferOut)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::TransferIn => "transfer_in",
        };
        f.write_str(name)
    }
}

/// One applied balance change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Identifier, `1 + position` in the transactions file
    pub id: RecordId,

    /// Account whose balance changed
    pub account: RecordId,

    pub kind: TransactionKind,

    /// Always positive; the kind carries the direction
    pub amount: Decimal,

    /// Other side of a transfer, 0 for deposits and withdrawals
    pub counterparty: RecordId,
}

impl Transaction {
    /// Signed effect on the account balance
    pub fn signed_amount(&self) -> Decimal {
        if self.kind.is_debit() {
            -self.amount
        } else {
            self.amount
        }
    }
}
