//! Wire protocol between clients and the server
//!
//! Every message is one frame: a 4-byte big-endian length prefix followed by
//! a JSON document. Requests are tagged by `command`, response payloads by
//! `kind`:
//!
//! ```text
//! → {"command":"deposit","amount":"250.00"}
//! ← {"command":"deposit","success":true,"message":"Deposit successful",
//!    "payload":{"kind":"account","account":{"id":3,"balance":"1250.00","status":"active"}}}
//! ```
//!
//! A frame that does not decode into a known request becomes
//! [`Request::Unknown`] or a `protocol` failure; it never ends the session.

use crate::core::AssignedLoans;
use crate::types::{
    Account, AccountStatus, ErrorKind, Feedback, LedgerError, Loan, LoanStatus, RecordId, Role,
    Transaction, UserSummary,
};
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio_util::codec::LengthDelimitedCodec;

/// Default upper bound on a single frame
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Command sent by a client
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Request {
    Login {
        username: String,
        password: String,
        role: Role,
    },
    ViewBalance,
    Deposit {
        amount: Decimal,
    },
    Withdraw {
        amount: Decimal,
    },
    Transfer {
        target: RecordId,
        amount: Decimal,
    },
    AddCustomer {
        username: String,
        password: String,
    },
    ModifyCustomer {
        target: RecordId,
        name: String,
        age: u32,
        address: String,
    },
    ApplyLoan {
        amount: Decimal,
        tenure_months: u32,
    },
    ViewLoanStatus,
    ProcessLoan {
        loan: RecordId,
        status: LoanStatus,
    },
    ViewAssignedLoans,
    SetAccountStatus {
        account: RecordId,
        status: AccountStatus,
    },
    AssignLoan {
        loan: RecordId,
        employee: RecordId,
    },
    AddEmployee {
        username: String,
        password: String,
        role: Role,
    },
    ChangePassword {
        current: String,
        new: String,
    },
    ViewTransactions,
    ViewCustomerTransactions {
        account: RecordId,
    },
    AddFeedback {
        message: String,
    },
    ReviewFeedback,
    Logout,
    #[serde(other)]
    Unknown,
}

impl Request {
    pub fn code(&self) -> CommandCode {
        match self {
            Request::Login { .. } => CommandCode::Login,
            Request::ViewBalance => CommandCode::ViewBalance,
            Request::Deposit { .. } => CommandCode::Deposit,
            Request::Withdraw { .. } => CommandCode::Withdraw,
            Request::Transfer { .. } => CommandCode::Transfer,
            Request::AddCustomer { .. } => CommandCode::AddCustomer,
            Request::ModifyCustomer { .. } => CommandCode::ModifyCustomer,
            Request::ApplyLoan { .. } => CommandCode::ApplyLoan,
            Request::ViewLoanStatus => CommandCode::ViewLoanStatus,
            Request::ProcessLoan { .. } => CommandCode::ProcessLoan,
            Request::ViewAssignedLoans => CommandCode::ViewAssignedLoans,
            Request::SetAccountStatus { .. } => CommandCode::SetAccountStatus,
            Request::AssignLoan { .. } => CommandCode::AssignLoan,
            Request::AddEmployee { .. } => CommandCode::AddEmployee,
            Request::ChangePassword { .. } => CommandCode::ChangePassword,
            Request::ViewTransactions => CommandCode::ViewTransactions,
            Request::ViewCustomerTransactions { .. } => CommandCode::ViewCustomerTransactions,
            Request::AddFeedback { .. } => CommandCode::AddFeedback,
            Request::ReviewFeedback => CommandCode::ReviewFeedback,
            Request::Logout => CommandCode::Logout,
            Request::Unknown => CommandCode::Unknown,
        }
    }
}

// Requests carry passwords, so only the command is printed.
impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("command", &self.code())
            .finish_non_exhaustive()
    }
}

/// Command identifier echoed in every response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandCode {
    Login,
    ViewBalance,
    Deposit,
    Withdraw,
    Transfer,
    AddCustomer,
    ModifyCustomer,
    ApplyLoan,
    ViewLoanStatus,
    ProcessLoan,
    ViewAssignedLoans,
    SetAccountStatus,
    AssignLoan,
    AddEmployee,
    ChangePassword,
    ViewTransactions,
    ViewCustomerTransactions,
    AddFeedback,
    ReviewFeedback,
    Logout,
    Unknown,
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Same spelling as on the wire.
        let name = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();
        f.write_str(&name)
    }
}

/// Typed result data attached to a response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    Empty,
    Session { user_id: RecordId, role: Role },
    Account { account: Account },
    Transfer { source: Account, target: Account },
    User { user: UserSummary },
    Loan { loan: Loan },
    AssignedLoans { assigned: u32, pending: u32 },
    Transactions {
        account: RecordId,
        transactions: Vec<Transaction>,
    },
    Feedback { feedback: Feedback },
    FeedbackList { notes: Vec<Feedback> },
}

impl From<AssignedLoans> for Payload {
    fn from(summary: AssignedLoans) -> Self {
        Payload::AssignedLoans {
            assigned: summary.assigned,
            pending: summary.pending,
        }
    }
}

/// Server answer to exactly one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub command: CommandCode,
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    pub payload: Payload,
}

impl Response {
    /// Successful response
    pub fn ok(command: CommandCode, message: impl Into<String>, payload: Payload) -> Self {
        Response {
            command,
            success: true,
            message: message.into(),
            error: None,
            payload,
        }
    }

    /// Failed response carrying the error's kind and text
    pub fn failure(command: CommandCode, error: &LedgerError) -> Self {
        Response {
            command,
            success: false,
            message: error.to_string(),
            error: Some(error.kind()),
            payload: Payload::Empty,
        }
    }
}

/// Length-prefixed frame codec used by both ends
pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .big_endian()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

pub fn decode_request(frame: &[u8]) -> Result<Request, LedgerError> {
    Ok(serde_json::from_slice(frame)?)
}

pub fn encode_request(request: &Request) -> Result<Bytes, LedgerError> {
    Ok(Bytes::from(serde_json::to_vec(request)?))
}

pub fn decode_response(frame: &[u8]) -> Result<Response, LedgerError> {
    Ok(serde_json::from_slice(frame)?)
}

pub fn encode_response(response: &Response) -> Result<Bytes, LedgerError> {
    Ok(Bytes::from(serde_json::to_vec(response)?))
}
