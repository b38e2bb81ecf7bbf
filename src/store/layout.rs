//! Fixed-width binary layouts for every record type
//!
//! This module centralizes all on-disk format concerns:
//! - `FieldWriter` / `FieldReader` cursors over a record-sized buffer
//! - the [`Record`] implementations for `User`, `Account`, `Transaction`,
//!   `Loan` and `Feedback`
//!
//! All integers are little-endian, decimals use `rust_decimal`'s 16-byte
//! serialized form and strings are UTF-8 padded with zero bytes.
//!
//! ```text
//! User    | id:4 | role:1 | username:50 | password_hash:64 | name:50 | age:4 | address:100 |  273
//! Account | id:4 | balance:16 | status:1 |                                                    21
//! Transaction | id:4 | account:4 | kind:1 | amount:16 | counterparty:4 |                    29
//! Loan    | id:4 | customer:4 | amount:16 | tenure:4 | status:1 | assignee:4 |              33
//! Feedback | id:4 | customer:4 | message:200 |                                             208
//! ```

use super::Record;
use crate::types::{
    Account, AccountStatus, Feedback, LedgerError, Loan, LoanStatus, Profile, RecordId, Role,
    StoreKind, Transaction, TransactionKind, User,
};
use rust_decimal::Decimal;

pub const USERNAME_LEN: usize = 50;
pub const PASSWORD_HASH_LEN: usize = 64;
pub const NAME_LEN: usize = 50;
pub const ADDRESS_LEN: usize = 100;
pub const FEEDBACK_LEN: usize = 200;

const DECIMAL_LEN: usize = 16;

/// Sequential writer over a zeroed record buffer
pub(crate) struct FieldWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        FieldWriter { buf, pos: 0 }
    }

    fn put_bytes(&mut self, bytes: &[u8], width: usize) -> Result<(), LedgerError> {
        let end = self.pos + width;
        let slot = self.buf.get_mut(self.pos..end).ok_or_else(|| LedgerError::IoError {
            message: format!("record buffer too small for field ending at byte {}", end),
        })?;
        slot.fill(0);
        if let Some(head) = slot.get_mut(..bytes.len()) {
            head.copy_from_slice(bytes);
        }
        self.pos = end;
        Ok(())
    }

    pub(crate) fn put_u8(&mut self, value: u8) -> Result<(), LedgerError> {
        self.put_bytes(&[value], 1)
    }

    pub(crate) fn put_u32(&mut self, value: u32) -> Result<(), LedgerError> {
        self.put_bytes(&value.to_le_bytes(), 4)
    }

    pub(crate) fn put_decimal(&mut self, value: Decimal) -> Result<(), LedgerError> {
        self.put_bytes(&value.serialize(), DECIMAL_LEN)
    }

    /// Write a zero-padded string, rejecting values wider than the field
    pub(crate) fn put_str(
        &mut self,
        field: &str,
        value: &str,
        width: usize,
    ) -> Result<(), LedgerError> {
        if value.len() > width || value.as_bytes().contains(&0) {
            return Err(LedgerError::field_too_long(field, width));
        }
        self.put_bytes(value.as_bytes(), width)
    }
}

/// Sequential reader over a record buffer
///
/// Errors are plain descriptions; the store attaches the record identity.
pub(crate) struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf, pos: 0 }
    }

    fn take(&mut self, width: usize) -> Result<&'a [u8], String> {
        let end = self.pos + width;
        let bytes = self
            .buf
            .get(self.pos..end)
            .ok_or_else(|| format!("record truncated at byte {}", self.pos))?;
        self.pos = end;
        Ok(bytes)
    }

    pub(crate) fn get_u8(&mut self) -> Result<u8, String> {
        let bytes = self.take(1)?;
        bytes.first().copied().ok_or_else(|| "empty field".to_string())
    }

    pub(crate) fn get_u32(&mut self) -> Result<u32, String> {
        let bytes: [u8; 4] = self
            .take(4)?
            .try_into()
            .map_err(|_| "bad u32 field".to_string())?;
        Ok(u32::from_le_bytes(bytes))
    }

    pub(crate) fn get_decimal(&mut self) -> Result<Decimal, String> {
        let bytes: [u8; DECIMAL_LEN] = self
            .take(DECIMAL_LEN)?
            .try_into()
            .map_err(|_| "bad decimal field".to_string())?;
        Ok(Decimal::deserialize(bytes))
    }

    pub(crate) fn get_str(&mut self, field: &str, width: usize) -> Result<String, String> {
        let bytes = self.take(width)?;
        let len = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        let text = bytes.get(..len).unwrap_or_default();
        String::from_utf8(text.to_vec()).map_err(|_| format!("{} is not valid UTF-8", field))
    }
}

impl Record for User {
    const KIND: StoreKind = StoreKind::Users;
    const SIZE: usize = 4 + 1 + USERNAME_LEN + PASSWORD_HASH_LEN + NAME_LEN + 4 + ADDRESS_LEN;

    fn id(&self) -> RecordId {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError> {
        let mut w = FieldWriter::new(buf);
        w.put_u32(self.id)?;
        w.put_u8(self.role.tag())?;
        w.put_str("username", &self.username, USERNAME_LEN)?;
        w.put_str("password_hash", &self.password_hash, PASSWORD_HASH_LEN)?;
        w.put_str("name", &self.profile.name, NAME_LEN)?;
        w.put_u32(self.profile.age)?;
        w.put_str("address", &self.profile.address, ADDRESS_LEN)
    }

    fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = FieldReader::new(buf);
        let id = r.get_u32()?;
        let tag = r.get_u8()?;
        let role = Role::from_tag(tag).ok_or_else(|| format!("bad role tag {}", tag))?;
        let username = r.get_str("username", USERNAME_LEN)?;
        let password_hash = r.get_str("password_hash", PASSWORD_HASH_LEN)?;
        let name = r.get_str("name", NAME_LEN)?;
        let age = r.get_u32()?;
        let address = r.get_str("address", ADDRESS_LEN)?;
        Ok(User {
            id,
            role,
            username,
            password_hash,
            profile: Profile { name, age, address },
        })
    }
}

impl Record for Account {
    const KIND: StoreKind = StoreKind::Accounts;
    const SIZE: usize = 4 + DECIMAL_LEN + 1;

    fn id(&self) -> RecordId {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError> {
        let mut w = FieldWriter::new(buf);
        w.put_u32(self.id)?;
        w.put_decimal(self.balance)?;
        w.put_u8(self.status.tag())
    }

    fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = FieldReader::new(buf);
        let id = r.get_u32()?;
        let balance = r.get_decimal()?;
        let tag = r.get_u8()?;
        let status =
            AccountStatus::from_tag(tag).ok_or_else(|| format!("bad status tag {}", tag))?;
        Ok(Account {
            id,
            balance,
            status,
        })
    }
}

impl Record for Loan {
    const KIND: StoreKind = StoreKind::Loans;
    const SIZE: usize = 4 + 4 + DECIMAL_LEN + 4 + 1 + 4;

    fn id(&self) -> RecordId {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError> {
        let mut w = FieldWriter::new(buf);
        w.put_u32(self.id)?;
        w.put_u32(self.customer)?;
        w.put_decimal(self.amount)?;
        w.put_u32(self.tenure_months)?;
        w.put_u8(self.status.tag())?;
        w.put_u32(self.assignee)
    }

    fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = FieldReader::new(buf);
        let id = r.get_u32()?;
        let customer = r.get_u32()?;
        let amount = r.get_decimal()?;
        let tenure_months = r.get_u32()?;
        let tag = r.get_u8()?;
        let status = LoanStatus::from_tag(tag).ok_or_else(|| format!("bad status tag {}", tag))?;
        let assignee = r.get_u32()?;
        Ok(Loan {
            id,
            customer,
            amount,
            tenure_months,
            status,
            assignee,
        })
    }
}

impl Record for Transaction {
    const KIND: StoreKind = StoreKind::Transactions;
    const SIZE: usize = 4 + 4 + 1 + DECIMAL_LEN + 4;

    fn id(&self) -> RecordId {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError> {
        let mut w = FieldWriter::new(buf);
        w.put_u32(self.id)?;
        w.put_u32(self.account)?;
        w.put_u8(self.kind.tag())?;
        w.put_decimal(self.amount)?;
        w.put_u32(self.counterparty)
    }

    fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = FieldReader::new(buf);
        let id = r.get_u32()?;
        let account = r.get_u32()?;
        let tag = r.get_u8()?;
        let kind =
            TransactionKind::from_tag(tag).ok_or_else(|| format!("bad kind tag {}", tag))?;
        let amount = r.get_decimal()?;
        let counterparty = r.get_u32()?;
        Ok(Transaction {
            id,
            account,
            kind,
            amount,
            counterparty,
        })
    }
}

impl Record for Feedback {
    const KIND: StoreKind = StoreKind::Feedback;
    const SIZE: usize = 4 + 4 + FEEDBACK_LEN;

    fn id(&self) -> RecordId {
        self.id
    }

    fn encode(&self, buf: &mut [u8]) -> Result<(), LedgerError> {
        let mut w = FieldWriter::new(buf);
        w.put_u32(self.id)?;
        w.put_u32(self.customer)?;
        w.put_str("message", &self.message, FEEDBACK_LEN)
    }

    fn decode(buf: &[u8]) -> Result<Self, String> {
        let mut r = FieldReader::new(buf);
        Ok(Feedback {
            id: r.get_u32()?,
            customer: r.get_u32()?,
            message: r.get_str("message", FEEDBACK_LEN)?,
        })
    }
}
