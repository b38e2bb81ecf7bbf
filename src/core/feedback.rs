//! Customer feedback log
//!
//! Customers append notes; managers read them all back. Appends hold the
//! `Feedback.Tail` lock and reviews are unlocked scans.

use super::lock_manager::{LockKey, LockMode, RecordLockManager};
use crate::store::RecordStore;
use crate::types::{Feedback, LedgerError, RecordId, StoreKind};
use std::sync::Arc;
use tracing::info;

/// Append-only feedback notes
#[derive(Debug, Clone)]
pub struct FeedbackLog {
    notes: Arc<RecordStore<Feedback>>,
    locks: Arc<RecordLockManager>,
}

impl FeedbackLog {
    pub fn new(notes: Arc<RecordStore<Feedback>>, locks: Arc<RecordLockManager>) -> Self {
        Self { notes, locks }
    }

    /// Store a note from `customer`
    ///
    /// # Errors
    ///
    /// - `InvalidAction` if the message is blank
    /// - `FieldTooLong` if the message does not fit its record field
    pub fn add(&self, customer: RecordId, message: &str) -> Result<Feedback, LedgerError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(LedgerError::invalid_action("feedback must not be empty"));
        }

        let _tail = self
            .locks
            .acquire(LockKey::tail(StoreKind::Feedback), LockMode::Exclusive)?;
        let note = Feedback {
            id: self.notes.next_id()?,
            customer,
            message: message.to_string(),
        };
        self.notes.append(&note)?;

        info!(feedback = note.id, customer, "feedback added");
        Ok(note)
    }

    /// Every note, oldest first
    pub fn review(&self) -> Result<Vec<Feedback>, LedgerError> {
        self.notes.scan()
    }
}
