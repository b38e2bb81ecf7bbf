//! Customer feedback notes
//!
//! Customers leave free-text notes that managers review. Notes are
//! append-only and never edited.

use super::RecordId;
use serde::{Deserialize, Serialize};

/// One feedback note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Identifier, `1 + position` in the feedback file
    pub id: RecordId,

    /// Customer who wrote the note
    pub customer: RecordId,

    pub message: String,
}
