//! Per-connection session state
//!
//! A session starts `Anonymous`, becomes `Authenticated` on a successful
//! login and returns to `Anonymous` on logout. It is owned by the task
//! serving one connection and never shared.
//!
//! # Authorization
//!
//! | Command | Allowed when |
//! |---|---|
//! | `login`, `logout` | always |
//! | `view_balance`, `deposit`, `withdraw`, `transfer`, `apply_loan`, `view_loan_status`, `view_transactions`, `add_feedback` | customer |
//! | `add_customer`, `modify_customer`, `process_loan`, `view_assigned_loans`, `view_customer_transactions` | employee |
//! | `set_account_status`, `assign_loan`, `review_feedback` | manager |
//! | `add_employee` | administrator |
//! | `change_password` | any authenticated user |
//! | `unknown` | never |

pub mod dispatcher;

pub use dispatcher::SessionDispatcher;

use crate::io::wire::CommandCode;
use crate::types::{LedgerError, RecordId, Role};

/// Login state of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated { user_id: RecordId, role: Role },
}

impl SessionState {
    pub fn user_id(&self) -> Option<RecordId> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated { user_id, .. } => Some(*user_id),
        }
    }

    pub fn role(&self) -> Option<Role> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticated { role, .. } => Some(*role),
        }
    }
}

/// Who may run a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any session, logged in or not
    Anyone,

    /// Any logged-in session
    Authenticated,

    /// Sessions logged in with exactly this role
    Role(Role),

    /// No session
    Nobody,
}

impl Access {
    /// Access rule of a command
    pub fn for_command(command: CommandCode) -> Self {
        match command {
            CommandCode::Login | CommandCode::Logout => Access::Anyone,
            CommandCode::ViewBalance
            | CommandCode::Deposit
            | CommandCode::Withdraw
            | CommandCode::Transfer
            | CommandCode::ApplyLoan
            | CommandCode::ViewLoanStatus
            | CommandCode::ViewTransactions
            | CommandCode::AddFeedback => Access::Role(Role::Customer),
            CommandCode::AddCustomer
            | CommandCode::ModifyCustomer
            | CommandCode::ProcessLoan
            | CommandCode::ViewAssignedLoans
            | CommandCode::ViewCustomerTransactions => Access::Role(Role::Employee),
            CommandCode::SetAccountStatus
            | CommandCode::AssignLoan
            | CommandCode::ReviewFeedback => Access::Role(Role::Manager),
            CommandCode::AddEmployee => Access::Role(Role::Administrator),
            CommandCode::ChangePassword => Access::Authenticated,
            CommandCode::Unknown => Access::Nobody,
        }
    }

    /// Check a session against this rule
    ///
    /// # Returns
    ///
    /// The session's user identifier when one is logged in.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if the session may not run the command
    pub fn check(self, state: &SessionState) -> Result<Option<RecordId>, LedgerError> {
        match (self, state) {
            (Access::Anyone, _) => Ok(state.user_id()),
            (Access::Nobody, _) => Err(LedgerError::unauthorized("unknown command")),
            (_, SessionState::Anonymous) => Err(LedgerError::unauthorized("login required")),
            (Access::Authenticated, SessionState::Authenticated { user_id, .. }) => {
                Ok(Some(*user_id))
            }
            (Access::Role(required), SessionState::Authenticated { user_id, role }) => {
                if *role == required {
                    Ok(Some(*user_id))
                } else {
                    Err(LedgerError::unauthorized(&format!(
                        "command requires a {} session",
                        required
                    )))
                }
            }
        }
    }
}
