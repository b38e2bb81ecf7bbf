//! Request dispatcher for one session
//!
//! The `SessionDispatcher` turns each request into exactly one response:
//!
//! 1. check the command against the session's login state and role
//! 2. run the matching engine operation, scoped to the session's own user
//!    for customer commands
//! 3. turn the result or error into a `Response`
//!
//! A refused or unknown command never reaches the engine. Errors never end
//! the session; only the transport can do that.
//!
//! # Thread Safety
//!
//! Operations block on record locks and file I/O, so `handle` must run on a
//! blocking thread. The dispatcher is moved into the blocking task and
//! handed back with the response.

use super::{Access, SessionState};
use crate::core::BankEngine;
use crate::io::wire::{CommandCode, Payload, Request, Response};
use crate::types::{ErrorKind, LedgerError, Profile, RecordId, Role};
use tracing::{debug, error, info, warn};

/// Executes requests on behalf of one connection
#[derive(Debug)]
pub struct SessionDispatcher {
    engine: BankEngine,
    state: SessionState,
}

impl SessionDispatcher {
    pub fn new(engine: BankEngine) -> Self {
        Self {
            engine,
            state: SessionState::Anonymous,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Handle one request and produce its response
    pub fn handle(&mut self, request: Request) -> Response {
        let command = request.code();
        let result = Access::for_command(command)
            .check(&self.state)
            .and_then(|user| self.execute(request, user));

        match result {
            Ok(response) => response,
            Err(e) => {
                let user = self.state.user_id();
                let role = self.state.role();
                match e.kind() {
                    ErrorKind::IoError | ErrorKind::PartialFailure => {
                        error!(%command, ?user, ?role, error = %e, "operation failed")
                    }
                    ErrorKind::Unauthorized => {
                        warn!(%command, ?user, ?role, error = %e, "request refused")
                    }
                    _ => debug!(%command, ?user, ?role, error = %e, "request rejected"),
                }
                Response::failure(command, &e)
            }
        }
    }

    fn execute(
        &mut self,
        request: Request,
        user: Option<RecordId>,
    ) -> Result<Response, LedgerError> {
        let command = request.code();
        // Access::check only lets authenticated sessions through for these.
        let me = || user.ok_or_else(|| LedgerError::unauthorized("login required"));

        let engine = &self.engine;
        let response = match request {
            Request::Login {
                username,
                password,
                role,
            } => {
                self.state = SessionState::Anonymous;
                let user = engine.directory().authenticate(&username, &password, role)?;
                self.state = SessionState::Authenticated {
                    user_id: user.id,
                    role,
                };
                Response::ok(
                    command,
                    format!("Logged in as {}", role),
                    Payload::Session {
                        user_id: user.id,
                        role,
                    },
                )
            }
            Request::Logout => {
                let message = match self.state {
                    SessionState::Anonymous => "Not logged in",
                    SessionState::Authenticated { user_id, .. } => {
                        info!(user = user_id, "logout");
                        "Logged out"
                    }
                };
                self.state = SessionState::Anonymous;
                Response::ok(command, message, Payload::Empty)
            }
            Request::ViewBalance => {
                let account = engine.ledger().view_balance(me()?)?;
                Response::ok(command, "Balance retrieved", Payload::Account { account })
            }
            Request::Deposit { amount } => {
                let account = engine.ledger().deposit(me()?, amount)?;
                Response::ok(command, "Deposit successful", Payload::Account { account })
            }
            Request::Withdraw { amount } => {
                let account = engine.ledger().withdraw(me()?, amount)?;
                Response::ok(command, "Withdrawal successful", Payload::Account { account })
            }
            Request::Transfer { target, amount } => {
                let receipt = engine.ledger().transfer(me()?, target, amount)?;
                Response::ok(
                    command,
                    "Transfer successful",
                    Payload::Transfer {
                        source: receipt.source,
                        target: receipt.target,
                    },
                )
            }
            Request::AddCustomer { username, password } => {
                let user = engine.directory().add_customer(&username, &password)?;
                Response::ok(
                    command,
                    format!("Customer created with id {}", user.id),
                    Payload::User {
                        user: user.summary(),
                    },
                )
            }
            Request::ModifyCustomer {
                target,
                name,
                age,
                address,
            } => {
                let profile = Profile { name, age, address };
                let user = engine.directory().modify_customer(target, profile)?;
                Response::ok(
                    command,
                    "Customer updated",
                    Payload::User {
                        user: user.summary(),
                    },
                )
            }
            Request::ApplyLoan {
                amount,
                tenure_months,
            } => {
                let loan = engine.loans().apply(me()?, amount, tenure_months)?;
                Response::ok(
                    command,
                    format!("Loan application {} submitted", loan.id),
                    Payload::Loan { loan },
                )
            }
            Request::ViewLoanStatus => {
                let loan = engine.loans().status_for(me()?)?;
                Response::ok(
                    command,
                    format!("Loan {} is {}", loan.id, loan.status),
                    Payload::Loan { loan },
                )
            }
            Request::ProcessLoan { loan, status } => {
                let loan = engine.loans().process(me()?, loan, status)?;
                Response::ok(
                    command,
                    format!("Loan {} is now {}", loan.id, loan.status),
                    Payload::Loan { loan },
                )
            }
            Request::ViewAssignedLoans => {
                let summary = engine.loans().assigned_summary(me()?)?;
                Response::ok(command, "Loan summary retrieved", summary.into())
            }
            Request::SetAccountStatus { account, status } => {
                let owner = engine.directory().user(account)?;
                if owner.role != Role::Customer {
                    return Err(LedgerError::wrong_role(account, Role::Customer, owner.role));
                }
                let account = engine.ledger().set_status(account, status)?;
                Response::ok(command, "Account status updated", Payload::Account { account })
            }
            Request::AssignLoan { loan, employee } => {
                let assignee = engine.directory().user(employee)?;
                if assignee.role != Role::Employee {
                    return Err(LedgerError::wrong_role(
                        employee,
                        Role::Employee,
                        assignee.role,
                    ));
                }
                let loan = engine.loans().assign(loan, employee)?;
                Response::ok(
                    command,
                    format!("Loan {} assigned to employee {}", loan.id, employee),
                    Payload::Loan { loan },
                )
            }
            Request::AddEmployee {
                username,
                password,
                role,
            } => {
                let user = engine.directory().add_staff(role, &username, &password)?;
                Response::ok(
                    command,
                    format!("{} created with id {}", role, user.id),
                    Payload::User {
                        user: user.summary(),
                    },
                )
            }
            Request::ChangePassword { current, new } => {
                engine.directory().change_password(me()?, &current, &new)?;
                Response::ok(command, "Password changed", Payload::Empty)
            }
            Request::ViewTransactions => {
                let account = me()?;
                let transactions = engine.ledger().view_transactions(account)?;
                Response::ok(
                    command,
                    format!("{} transactions", transactions.len()),
                    Payload::Transactions {
                        account,
                        transactions,
                    },
                )
            }
            Request::ViewCustomerTransactions { account } => {
                let owner = engine.directory().user(account)?;
                if owner.role.is_staff() {
                    return Err(LedgerError::wrong_role(account, Role::Customer, owner.role));
                }
                let transactions = engine.ledger().view_transactions(account)?;
                Response::ok(
                    command,
                    format!("{} transactions", transactions.len()),
                    Payload::Transactions {
                        account,
                        transactions,
                    },
                )
            }
            Request::AddFeedback { message } => {
                let feedback = engine.feedback().add(me()?, &message)?;
                Response::ok(command, "Feedback recorded", Payload::Feedback { feedback })
            }
            Request::ReviewFeedback => {
                let notes = engine.feedback().review()?;
                Response::ok(
                    command,
                    format!("{} feedback notes", notes.len()),
                    Payload::FeedbackList { notes },
                )
            }
            Request::Unknown => return Err(LedgerError::invalid_action("unknown command")),
        };
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountStatus, LoanStatus, TransactionKind};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    /// Seeded bank: admin 1, emp1 2, custA 3 (1000.00), custB 4 (500.00), mgr 5.
    fn seeded() -> (TempDir, BankEngine) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let engine = BankEngine::open(dir.path(), 4).unwrap();
        let directory = engine.directory();
        directory.bootstrap_administrator("admin", "adminpass").unwrap();
        directory.add_staff(Role::Employee, "emp1", "emppass").unwrap();
        directory.add_customer("custA", "custApass").unwrap();
        directory.add_customer("custB", "custBpass").unwrap();
        directory.add_staff(Role::Manager, "mgr", "mgrpass").unwrap();
        engine.ledger().deposit(3, Decimal::new(100000, 2)).unwrap();
        engine.ledger().deposit(4, Decimal::new(50000, 2)).unwrap();
        (dir, engine)
    }

    fn login(engine: &BankEngine, username: &str, password: &str, role: Role) -> SessionDispatcher {
        let mut session = SessionDispatcher::new(engine.clone());
        let response = session.handle(Request::Login {
            username: username.to_string(),
            password: password.to_string(),
            role,
        });
        assert!(response.success, "{}", response.message);
        session
    }

    fn balance_of(response: &Response) -> Decimal {
        match &response.payload {
            Payload::Account { account } => account.balance,
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_login_sets_session() {
        let (_dir, engine) = seeded();
        let session = login(&engine, "custA", "custApass", Role::Customer);
        assert_eq!(
            session.state(),
            SessionState::Authenticated {
                user_id: 3,
                role: Role::Customer
            }
        );
    }

    #[test]
    fn test_failed_login_leaves_session_anonymous() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "custA", "custApass", Role::Customer);

        let response = session.handle(Request::Login {
            username: "custB".to_string(),
            password: "wrong".to_string(),
            role: Role::Customer,
        });
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorKind::Unauthorized));
        assert_eq!(session.state(), SessionState::Anonymous);
    }

    #[test]
    fn test_anonymous_commands_are_refused() {
        let (_dir, engine) = seeded();
        let mut session = SessionDispatcher::new(engine.clone());

        let response = session.handle(Request::Deposit {
            amount: Decimal::ONE,
        });
        assert!(!response.success);
        assert_eq!(response.command, CommandCode::Deposit);
        assert_eq!(response.error, Some(ErrorKind::Unauthorized));
        assert_eq!(
            engine.ledger().view_balance(3).unwrap().balance,
            Decimal::new(100000, 2)
        );
    }

    #[test]
    fn test_anonymous_logout_succeeds() {
        let (_dir, engine) = seeded();
        let mut session = SessionDispatcher::new(engine);
        let response = session.handle(Request::Logout);
        assert!(response.success);
        assert_eq!(response.message, "Not logged in");
    }

    #[test]
    fn test_unknown_command_is_refused_even_for_administrator() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "admin", "adminpass", Role::Administrator);
        let response = session.handle(Request::Unknown);
        assert!(!response.success);
        assert_eq!(response.command, CommandCode::Unknown);
    }

    #[test]
    fn test_customer_scenario() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "custA", "custApass", Role::Customer);

        let response = session.handle(Request::Withdraw {
            amount: Decimal::new(1500, 0),
        });
        assert_eq!(response.error, Some(ErrorKind::InsufficientFunds));

        let response = session.handle(Request::Withdraw {
            amount: Decimal::new(400, 0),
        });
        assert_eq!(balance_of(&response), Decimal::new(60000, 2));

        let response = session.handle(Request::Transfer {
            target: 4,
            amount: Decimal::new(600, 0),
        });
        match response.payload {
            Payload::Transfer { source, target } => {
                assert_eq!(source.balance, Decimal::ZERO);
                assert_eq!(target.balance, Decimal::new(110000, 2));
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let response = session.handle(Request::ViewBalance);
        assert_eq!(balance_of(&response), Decimal::ZERO);
    }

    #[test]
    fn test_customer_commands_act_on_own_account() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "custB", "custBpass", Role::Customer);

        let response = session.handle(Request::Deposit {
            amount: Decimal::new(5, 0),
        });
        assert!(response.success);
        assert_eq!(
            engine.ledger().view_balance(3).unwrap().balance,
            Decimal::new(100000, 2)
        );
        assert_eq!(
            engine.ledger().view_balance(4).unwrap().balance,
            Decimal::new(50500, 2)
        );
    }

    #[test]
    fn test_transfer_to_self_reports_same_account() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "custA", "custApass", Role::Customer);
        let response = session.handle(Request::Transfer {
            target: 3,
            amount: Decimal::ONE,
        });
        assert_eq!(response.error, Some(ErrorKind::SameAccount));
    }

    #[test]
    fn test_employee_creates_and_modifies_customer() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "emp1", "emppass", Role::Employee);

        let response = session.handle(Request::AddCustomer {
            username: "custC".to_string(),
            password: "custCpass".to_string(),
        });
        let id = match response.payload {
            Payload::User { user } => user.id,
            other => panic!("unexpected payload {:?}", other),
        };
        assert_eq!(id, 6);

        let response = session.handle(Request::ModifyCustomer {
            target: id,
            name: "Customer C".to_string(),
            age: 33,
            address: "Address C".to_string(),
        });
        assert!(response.success);

        let response = session.handle(Request::ModifyCustomer {
            target: 2,
            name: "Not a customer".to_string(),
            age: 1,
            address: String::new(),
        });
        assert_eq!(response.error, Some(ErrorKind::WrongRole));

        let response = session.handle(Request::AddCustomer {
            username: "custC".to_string(),
            password: "again".to_string(),
        });
        assert_eq!(response.error, Some(ErrorKind::Conflict));
    }

    #[test]
    fn test_loan_lifecycle_across_roles() {
        let (_dir, engine) = seeded();
        let mut customer = login(&engine, "custA", "custApass", Role::Customer);
        let mut employee = login(&engine, "emp1", "emppass", Role::Employee);
        let mut manager = login(&engine, "mgr", "mgrpass", Role::Manager);

        let response = customer.handle(Request::ApplyLoan {
            amount: Decimal::new(5000, 0),
            tenure_months: 12,
        });
        assert!(response.success);

        let response = manager.handle(Request::AssignLoan {
            loan: 1,
            employee: 2,
        });
        assert!(response.success, "{}", response.message);

        let response = manager.handle(Request::AssignLoan {
            loan: 1,
            employee: 3,
        });
        assert_eq!(response.error, Some(ErrorKind::WrongRole));

        let response = employee.handle(Request::ViewAssignedLoans);
        assert_eq!(
            response.payload,
            Payload::AssignedLoans {
                assigned: 1,
                pending: 1
            }
        );

        let response = employee.handle(Request::ProcessLoan {
            loan: 1,
            status: LoanStatus::Approved,
        });
        assert!(response.success);

        let response = employee.handle(Request::ProcessLoan {
            loan: 1,
            status: LoanStatus::Rejected,
        });
        assert_eq!(response.error, Some(ErrorKind::InvalidAction));

        let response = customer.handle(Request::ViewLoanStatus);
        match response.payload {
            Payload::Loan { loan } => assert_eq!(loan.status, LoanStatus::Approved),
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_manager_deactivation_blocks_customer_login() {
        let (_dir, engine) = seeded();
        let mut manager = login(&engine, "mgr", "mgrpass", Role::Manager);

        let response = manager.handle(Request::SetAccountStatus {
            account: 4,
            status: AccountStatus::Deactivated,
        });
        assert!(response.success);

        let response = manager.handle(Request::SetAccountStatus {
            account: 2,
            status: AccountStatus::Active,
        });
        assert_eq!(response.error, Some(ErrorKind::WrongRole));

        let mut session = SessionDispatcher::new(engine.clone());
        let response = session.handle(Request::Login {
            username: "custB".to_string(),
            password: "custBpass".to_string(),
            role: Role::Customer,
        });
        assert_eq!(response.error, Some(ErrorKind::Unauthorized));
    }

    #[test]
    fn test_administrator_adds_staff() {
        let (_dir, engine) = seeded();
        let mut admin = login(&engine, "admin", "adminpass", Role::Administrator);

        let response = admin.handle(Request::AddEmployee {
            username: "emp2".to_string(),
            password: "emp2pass".to_string(),
            role: Role::Employee,
        });
        assert!(response.success);

        let response = admin.handle(Request::AddEmployee {
            username: "root2".to_string(),
            password: "pw".to_string(),
            role: Role::Administrator,
        });
        assert_eq!(response.error, Some(ErrorKind::InvalidAction));

        login(&engine, "emp2", "emp2pass", Role::Employee);
    }

    #[test]
    fn test_change_password_then_relogin() {
        let (_dir, engine) = seeded();
        let mut session = login(&engine, "emp1", "emppass", Role::Employee);

        let response = session.handle(Request::ChangePassword {
            current: "emppass".to_string(),
            new: "newpass".to_string(),
        });
        assert!(response.success);

        let response = session.handle(Request::Logout);
        assert_eq!(response.message, "Logged out");
        login(&engine, "emp1", "newpass", Role::Employee);
    }

    #[test]
    fn test_transaction_history_for_customer_and_employee() {
        let (_dir, engine) = seeded();
        let mut customer = login(&engine, "custA", "custApass", Role::Customer);
        let response = customer.handle(Request::Transfer {
            target: 4,
            amount: Decimal::new(600, 0),
        });
        assert!(response.success);

        let response = customer.handle(Request::ViewTransactions);
        match response.payload {
            Payload::Transactions {
                account,
                transactions,
            } => {
                assert_eq!(account, 3);
                let kinds: Vec<_> = transactions.iter().map(|t| t.kind).collect();
                assert_eq!(
                    kinds,
                    vec![TransactionKind::Deposit, TransactionKind::TransferOut]
                );
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let mut employee = login(&engine, "emp1", "emppass", Role::Employee);
        let response = employee.handle(Request::ViewCustomerTransactions { account: 4 });
        match response.payload {
            Payload::Transactions { transactions, .. } => {
                assert_eq!(transactions.len(), 2);
                assert_eq!(transactions[1].kind, TransactionKind::TransferIn);
                assert_eq!(transactions[1].counterparty, 3);
            }
            other => panic!("unexpected payload {:?}", other),
        }

        let response = employee.handle(Request::ViewCustomerTransactions { account: 5 });
        assert_eq!(response.error, Some(ErrorKind::WrongRole));
        let response = employee.handle(Request::ViewCustomerTransactions { account: 99 });
        assert_eq!(response.error, Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_feedback_reaches_manager() {
        let (_dir, engine) = seeded();
        let mut customer = login(&engine, "custB", "custBpass", Role::Customer);
        let response = customer.handle(Request::AddFeedback {
            message: "Friendly staff".to_string(),
        });
        assert!(response.success);

        let response = customer.handle(Request::AddFeedback {
            message: "  ".to_string(),
        });
        assert_eq!(response.error, Some(ErrorKind::InvalidAction));

        let mut manager = login(&engine, "mgr", "mgrpass", Role::Manager);
        let response = manager.handle(Request::ReviewFeedback);
        match response.payload {
            Payload::FeedbackList { notes } => {
                assert_eq!(notes.len(), 1);
                assert_eq!(notes[0].customer, 4);
                assert_eq!(notes[0].message, "Friendly staff");
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
