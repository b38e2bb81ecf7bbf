//! Loan application ledger
//!
//! Loans are appended by customers and moved through their status machine
//! by employees. Appends hold the `Loans.Tail` lock; status changes hold an
//! exclusive lock on the loan record. Lookups are unlocked scans: records
//! are only ever replaced whole, so a scan never observes a torn loan.

use super::lock_manager::{LockKey, LockMode, RecordLockManager};
use crate::store::RecordStore;
use crate::types::{LedgerError, Loan, LoanStatus, RecordId, StoreKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Workload overview for one employee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedLoans {
    /// Loans currently assigned to the employee
    pub assigned: u32,

    /// Loans in the store still waiting in `Applied`
    pub pending: u32,
}

/// Loan operations on the shared loans store
#[derive(Debug, Clone)]
pub struct LoanLedger {
    loans: Arc<RecordStore<Loan>>,
    locks: Arc<RecordLockManager>,
}

impl LoanLedger {
    pub fn new(loans: Arc<RecordStore<Loan>>, locks: Arc<RecordLockManager>) -> Self {
        Self { loans, locks }
    }

    /// File a new loan application
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `InvalidAction` if `tenure_months` is zero
    pub fn apply(
        &self,
        customer: RecordId,
        amount: Decimal,
        tenure_months: u32,
    ) -> Result<Loan, LedgerError> {
        if amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_amount(amount));
        }
        if tenure_months == 0 {
            return Err(LedgerError::invalid_action("loan tenure must be at least one month"));
        }

        let _tail = self
            .locks
            .acquire(LockKey::tail(StoreKind::Loans), LockMode::Exclusive)?;
        let loan = Loan::new(self.loans.next_id()?, customer, amount, tenure_months);
        self.loans.append(&loan)?;

        info!(loan = loan.id, customer, %amount, tenure_months, "loan applied");
        Ok(loan)
    }

    /// Oldest loan filed by `customer`
    ///
    /// # Errors
    ///
    /// - `NotFound` (keyed by the customer identifier) if the customer never applied
    pub fn status_for(&self, customer: RecordId) -> Result<Loan, LedgerError> {
        self.loans
            .scan()?
            .into_iter()
            .find(|loan| loan.customer == customer)
            .ok_or_else(|| LedgerError::not_found(StoreKind::Loans, customer))
    }

    /// Move a loan to a new status on behalf of an employee
    ///
    /// An unassigned loan is claimed by the employee that processes it.
    ///
    /// # Errors
    ///
    /// - `InvalidAction` if `status` is `Applied`
    /// - `NotFound` if the loan does not exist
    /// - `LoanAssignedElsewhere` if another employee owns the loan
    /// - `InvalidTransition` if the move is not forward, or the loan is decided
    pub fn process(
        &self,
        employee: RecordId,
        loan_id: RecordId,
        status: LoanStatus,
    ) -> Result<Loan, LedgerError> {
        if status == LoanStatus::Applied {
            return Err(LedgerError::invalid_action("loans cannot be moved back to applied"));
        }

        let _guard = self
            .locks
            .lock_record(StoreKind::Loans, loan_id, LockMode::Exclusive)?;
        let mut loan = self.loans.read(loan_id)?;

        if loan.is_assigned() && loan.assignee != employee {
            debug!(loan = loan_id, employee, assignee = loan.assignee, "loan owned by another employee");
            return Err(LedgerError::LoanAssignedElsewhere {
                loan: loan_id,
                assignee: loan.assignee,
            });
        }
        if !loan.status.can_transition_to(status) {
            return Err(LedgerError::invalid_transition(loan_id, loan.status, status));
        }

        loan.status = status;
        loan.assignee = employee;
        self.loans.write(&loan)?;

        info!(loan = loan_id, employee, %status, "loan processed");
        Ok(loan)
    }

    /// Count the employee's loans and the loans still waiting
    pub fn assigned_summary(&self, employee: RecordId) -> Result<AssignedLoans, LedgerError> {
        let mut summary = AssignedLoans {
            assigned: 0,
            pending: 0,
        };
        for loan in self.loans.scan()? {
            if loan.assignee == employee {
                summary.assigned += 1;
            }
            if loan.status == LoanStatus::Applied {
                summary.pending += 1;
            }
        }
        Ok(summary)
    }

    /// Hand a loan to an employee
    ///
    /// Reassignment is allowed until the loan is approved or rejected.
    pub fn assign(&self, loan_id: RecordId, employee: RecordId) -> Result<Loan, LedgerError> {
        let _guard = self
            .locks
            .lock_record(StoreKind::Loans, loan_id, LockMode::Exclusive)?;
        let mut loan = self.loans.read(loan_id)?;

        if loan.status.is_terminal() {
            return Err(LedgerError::invalid_action(&format!(
                "loan {} is already {}",
                loan_id, loan.status
            )));
        }
        loan.assignee = employee;
        self.loans.write(&loan)?;

        info!(loan = loan_id, employee, "loan assigned");
        Ok(loan)
    }
}
