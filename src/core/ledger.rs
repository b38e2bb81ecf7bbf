//! Balance operations over the accounts store
//!
//! This module provides the `Ledger`, which runs every balance-affecting
//! operation as an acquire → read → modify → write → release cycle:
//!
//! - `view_balance`: shared lock on one account
//! - `deposit` / `withdraw` / `set_status`: exclusive lock on one account
//! - `transfer`: exclusive locks on two accounts, taken in ascending order
//!
//! Locks are guards, so they are released on every return path, including
//! rejected withdrawals and I/O errors.
//!
//! # History
//!
//! Every applied deposit, withdrawal and transfer appends to the
//! transactions store before its account locks are released. The
//! `Transactions.Tail` key sorts after every account key, so it is taken
//! last, and only once the balance has been written. A balance written
//! without its history entry is reported as `PartialFailure`.

use super::lock_manager::{LockKey, LockMode, RecordLockManager};
use crate::store::RecordStore;
use crate::types::{
    Account, AccountStatus, LedgerError, RecordId, StoreKind, Transaction, TransactionKind,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Both sides of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct TransferReceipt {
    pub source: Account,
    pub target: Account,
}

/// Balance operations on the shared accounts store
#[derive(Debug, Clone)]
pub struct Ledger {
    accounts: Arc<RecordStore<Account>>,
    transactions: Arc<RecordStore<Transaction>>,
    locks: Arc<RecordLockManager>,
}

/// History entry still waiting for its identifier
struct Entry {
    account: RecordId,
    kind: TransactionKind,
    counterparty: RecordId,
}

fn require_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(amount));
    }
    Ok(())
}

fn require_active(account: &Account) -> Result<(), LedgerError> {
    if !account.is_active() {
        return Err(LedgerError::account_deactivated(account.id));
    }
    Ok(())
}

impl Ledger {
    pub fn new(
        accounts: Arc<RecordStore<Account>>,
        transactions: Arc<RecordStore<Transaction>>,
        locks: Arc<RecordLockManager>,
    ) -> Self {
        Self {
            accounts,
            transactions,
            locks,
        }
    }

    fn append_entries(&self, entries: &[Entry], amount: Decimal) -> Result<(), LedgerError> {
        let _tail = self
            .locks
            .acquire(LockKey::tail(StoreKind::Transactions), LockMode::Exclusive)?;
        for entry in entries {
            self.transactions.append(&Transaction {
                id: self.transactions.next_id()?,
                account: entry.account,
                kind: entry.kind,
                amount,
                counterparty: entry.counterparty,
            })?;
        }
        Ok(())
    }

    /// Record history for a balance change that is already written
    ///
    /// Must be called with the affected account locks still held.
    fn record_history(&self, entries: &[Entry], amount: Decimal) -> Result<(), LedgerError> {
        self.append_entries(entries, amount).map_err(|e| {
            let account = entries.first().map_or(0, |entry| entry.account);
            error!(account, error = %e, "balance written without its history entry");
            LedgerError::partial_failure(
                StoreKind::Accounts,
                account,
                &format!("history append failed: {}", e),
            )
        })
    }

    /// Read an account under a shared lock
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account does not exist
    pub fn view_balance(&self, id: RecordId) -> Result<Account, LedgerError> {
        let _guard = self
            .locks
            .lock_record(StoreKind::Accounts, id, LockMode::Shared)?;
        self.accounts.read(id)
    }

    /// Credit an account
    ///
    /// # Returns
    ///
    /// The account as written, with its new balance.
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `NotFound` if the account does not exist
    /// - `AccountDeactivated` if the account is deactivated
    /// - `ArithmeticOverflow` if the balance would overflow
    /// - `PartialFailure` if the balance was written but its history was not
    pub fn deposit(&self, id: RecordId, amount: Decimal) -> Result<Account, LedgerError> {
        require_positive(amount)?;
        let _guard = self
            .locks
            .lock_record(StoreKind::Accounts, id, LockMode::Exclusive)?;

        let mut account = self.accounts.read(id)?;
        require_active(&account)?;
        account.balance = account
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("deposit", id))?;
        self.accounts.write(&account)?;
        self.record_history(
            &[Entry {
                account: id,
                kind: TransactionKind::Deposit,
                counterparty: 0,
            }],
            amount,
        )?;

        info!(account = id, %amount, balance = %account.balance, "deposit applied");
        Ok(account)
    }

    /// Debit an account
    ///
    /// # Errors
    ///
    /// - `InvalidAmount` if `amount` is not positive
    /// - `NotFound` if the account does not exist
    /// - `AccountDeactivated` if the account is deactivated
    /// - `InsufficientFunds` if the balance is below `amount`; nothing is written
    /// - `PartialFailure` if the balance was written but its history was not
    pub fn withdraw(&self, id: RecordId, amount: Decimal) -> Result<Account, LedgerError> {
        require_positive(amount)?;
        let _guard = self
            .locks
            .lock_record(StoreKind::Accounts, id, LockMode::Exclusive)?;

        let mut account = self.accounts.read(id)?;
        require_active(&account)?;
        if account.balance < amount {
            debug!(account = id, %amount, balance = %account.balance, "withdrawal rejected");
            return Err(LedgerError::insufficient_funds(id, account.balance, amount));
        }
        account.balance -= amount;
        self.accounts.write(&account)?;
        self.record_history(
            &[Entry {
                account: id,
                kind: TransactionKind::Withdraw,
                counterparty: 0,
            }],
            amount,
        )?;

        info!(account = id, %amount, balance = %account.balance, "withdrawal applied");
        Ok(account)
    }

    /// Move funds between two accounts atomically
    ///
    /// Both accounts stay exclusively locked from the first read to the last
    /// history append, so no other operation observes the debit without the
    /// credit. The locks are taken lower identifier first regardless of
    /// direction.
    ///
    /// # Errors
    ///
    /// - `SameAccount` if `source == target`
    /// - `InvalidAmount` if `amount` is not positive
    /// - `NotFound` if either account does not exist
    /// - `AccountDeactivated` if either account is deactivated
    /// - `InsufficientFunds` if the source balance is below `amount`; nothing is written
    /// - `PartialFailure` if the balances were written but their history was not
    pub fn transfer(
        &self,
        source: RecordId,
        target: RecordId,
        amount: Decimal,
    ) -> Result<TransferReceipt, LedgerError> {
        if source == target {
            return Err(LedgerError::same_account(source));
        }
        require_positive(amount)?;
        let _locks = self.locks.acquire_ordered(
            &[
                LockKey::record(StoreKind::Accounts, source),
                LockKey::record(StoreKind::Accounts, target),
            ],
            LockMode::Exclusive,
        )?;

        let mut from = self.accounts.read(source)?;
        let mut to = self.accounts.read(target)?;
        require_active(&from)?;
        require_active(&to)?;
        if from.balance < amount {
            debug!(source, target, %amount, balance = %from.balance, "transfer rejected");
            return Err(LedgerError::insufficient_funds(source, from.balance, amount));
        }

        from.balance -= amount;
        to.balance = to
            .balance
            .checked_add(amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("transfer", target))?;
        self.accounts.write(&from)?;
        self.accounts.write(&to)?;
        self.record_history(
            &[
                Entry {
                    account: source,
                    kind: TransactionKind::TransferOut,
                    counterparty: target,
                },
                Entry {
                    account: target,
                    kind: TransactionKind::TransferIn,
                    counterparty: source,
                },
            ],
            amount,
        )?;

        info!(source, target, %amount, "transfer applied");
        Ok(TransferReceipt {
            source: from,
            target: to,
        })
    }

    /// Activate or deactivate an account
    ///
    /// Balance is left untouched and no history is recorded.
    pub fn set_status(&self, id: RecordId, status: AccountStatus) -> Result<Account, LedgerError> {
        let _guard = self
            .locks
            .lock_record(StoreKind::Accounts, id, LockMode::Exclusive)?;

        let mut account = self.accounts.read(id)?;
        account.status = status;
        self.accounts.write(&account)?;

        info!(account = id, ?status, "account status changed");
        Ok(account)
    }

    /// History of one account, oldest first
    ///
    /// The scan is unlocked: entries are appended whole and never rewritten.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the account does not exist
    pub fn view_transactions(&self, id: RecordId) -> Result<Vec<Transaction>, LedgerError> {
        self.view_balance(id)?;
        Ok(self
            .transactions
            .scan()?
            .into_iter()
            .filter(|entry| entry.account == id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use tempfile::TempDir;

    fn seed_accounts(store: &RecordStore<Account>) {
        store.append(&Account::placeholder(1)).unwrap();
        store.append(&Account::placeholder(2)).unwrap();
        for (id, cents) in [(3, 100000), (4, 50000)] {
            let mut account = Account::new(id);
            account.balance = Decimal::new(cents, 2);
            store.append(&account).unwrap();
        }
    }

    /// Accounts 1..=4: two deactivated staff placeholders, then
    /// account 3 with 1000.00 and account 4 with 500.00.
    fn seeded_ledger() -> (TempDir, Ledger) {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store: RecordStore<Account> = RecordStore::open_in(dir.path()).unwrap();
        seed_accounts(&store);
        let ledger = Ledger::new(
            Arc::new(store),
            Arc::new(RecordStore::open_in(dir.path()).unwrap()),
            Arc::new(RecordLockManager::new()),
        );
        (dir, ledger)
    }

    fn balance(ledger: &Ledger, id: RecordId) -> Decimal {
        ledger.view_balance(id).unwrap().balance
    }

    #[test]
    fn test_view_balance() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));
    }

    #[test]
    fn test_view_balance_of_missing_account() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.view_balance(99).unwrap_err(),
            LedgerError::not_found(StoreKind::Accounts, 99)
        );
    }

    #[test]
    fn test_deposit_increases_balance() {
        let (_dir, ledger) = seeded_ledger();
        let account = ledger.deposit(4, Decimal::new(2550, 2)).unwrap();
        assert_eq!(account.balance, Decimal::new(52550, 2));
        assert_eq!(balance(&ledger, 4), Decimal::new(52550, 2));
    }

    #[test]
    fn test_deposit_rejects_non_positive_amounts() {
        let (_dir, ledger) = seeded_ledger();
        for amount in [Decimal::ZERO, Decimal::new(-500, 2)] {
            assert_eq!(
                ledger.deposit(3, amount).unwrap_err(),
                LedgerError::invalid_amount(amount)
            );
        }
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));
    }

    #[test]
    fn test_deposit_into_deactivated_account_is_rejected() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.deposit(1, Decimal::ONE).unwrap_err(),
            LedgerError::account_deactivated(1)
        );
    }

    #[test]
    fn test_deposit_then_withdraw_round_trips() {
        let (_dir, ledger) = seeded_ledger();
        let before = balance(&ledger, 3);
        ledger.deposit(3, Decimal::new(12345, 2)).unwrap();
        ledger.withdraw(3, Decimal::new(12345, 2)).unwrap();
        assert_eq!(balance(&ledger, 3), before);
    }

    #[test]
    fn test_withdraw_with_insufficient_funds_leaves_balance() {
        let (_dir, ledger) = seeded_ledger();

        let err = ledger.withdraw(3, Decimal::new(1500, 0)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::insufficient_funds(3, Decimal::new(100000, 2), Decimal::new(1500, 0))
        );
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));

        // The lock was released on the error path.
        ledger.withdraw(3, Decimal::new(400, 0)).unwrap();
        assert_eq!(balance(&ledger, 3), Decimal::new(60000, 2));
    }

    #[test]
    fn test_withdraw_entire_balance() {
        let (_dir, ledger) = seeded_ledger();
        let account = ledger.withdraw(4, Decimal::new(50000, 2)).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn test_reference_scenario() {
        let (_dir, ledger) = seeded_ledger();

        assert!(ledger.withdraw(3, Decimal::new(1500, 0)).is_err());
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));

        ledger.withdraw(3, Decimal::new(400, 0)).unwrap();
        assert_eq!(balance(&ledger, 3), Decimal::new(60000, 2));

        let receipt = ledger.transfer(3, 4, Decimal::new(600, 0)).unwrap();
        assert_eq!(receipt.source.balance, Decimal::ZERO);
        assert_eq!(receipt.target.balance, Decimal::new(110000, 2));
        assert_eq!(balance(&ledger, 3), Decimal::ZERO);
        assert_eq!(balance(&ledger, 4), Decimal::new(110000, 2));
    }

    #[test]
    fn test_transfer_to_same_account_is_rejected() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.transfer(3, 3, Decimal::ONE).unwrap_err(),
            LedgerError::same_account(3)
        );
    }

    #[test]
    fn test_transfer_with_insufficient_funds_changes_nothing() {
        let (_dir, ledger) = seeded_ledger();
        let err = ledger.transfer(4, 3, Decimal::new(501, 0)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { account: 4, .. }));
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));
        assert_eq!(balance(&ledger, 4), Decimal::new(50000, 2));
    }

    #[test]
    fn test_transfer_to_missing_account_changes_nothing() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.transfer(3, 42, Decimal::ONE).unwrap_err(),
            LedgerError::not_found(StoreKind::Accounts, 42)
        );
        assert_eq!(balance(&ledger, 3), Decimal::new(100000, 2));
    }

    #[test]
    fn test_transfer_to_staff_placeholder_is_rejected() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.transfer(3, 2, Decimal::ONE).unwrap_err(),
            LedgerError::account_deactivated(2)
        );
    }

    #[test]
    fn test_set_status_blocks_later_deposits() {
        let (_dir, ledger) = seeded_ledger();
        let account = ledger.set_status(3, AccountStatus::Deactivated).unwrap();
        assert_eq!(account.balance, Decimal::new(100000, 2));
        assert!(ledger.deposit(3, Decimal::ONE).is_err());

        ledger.set_status(3, AccountStatus::Active).unwrap();
        assert!(ledger.deposit(3, Decimal::ONE).is_ok());
    }

    #[test]
    fn test_concurrent_deposits_and_withdrawals_lose_nothing() {
        let (_dir, ledger) = seeded_ledger();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        ledger.deposit(3, Decimal::new(300, 2)).unwrap();
                    }
                });
                scope.spawn(|| {
                    for _ in 0..50 {
                        ledger.withdraw(3, Decimal::new(100, 2)).unwrap();
                    }
                });
            }
        });

        // 1000.00 + 200 * 3.00 - 200 * 1.00
        assert_eq!(balance(&ledger, 3), Decimal::new(140000, 2));
    }

    #[test]
    fn test_opposite_concurrent_transfers_conserve_and_finish() {
        let (_dir, ledger) = seeded_ledger();
        let total = balance(&ledger, 3) + balance(&ledger, 4);

        thread::scope(|scope| {
            for _ in 0..3 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        let _ = ledger.transfer(3, 4, Decimal::new(700, 2));
                    }
                });
                scope.spawn(|| {
                    for _ in 0..100 {
                        let _ = ledger.transfer(4, 3, Decimal::new(1100, 2));
                    }
                });
            }
        });

        let after = balance(&ledger, 3) + balance(&ledger, 4);
        assert_eq!(after, total);
        assert!(balance(&ledger, 3) >= Decimal::ZERO);
        assert!(balance(&ledger, 4) >= Decimal::ZERO);
    }

    #[test]
    fn test_applied_operations_are_recorded_in_order() {
        let (_dir, ledger) = seeded_ledger();
        ledger.deposit(3, Decimal::new(250, 0)).unwrap();
        ledger.withdraw(3, Decimal::new(100, 0)).unwrap();
        ledger.transfer(3, 4, Decimal::new(600, 0)).unwrap();

        let history = ledger.view_transactions(3).unwrap();
        let kinds: Vec<_> = history.iter().map(|entry| entry.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TransactionKind::Deposit,
                TransactionKind::Withdraw,
                TransactionKind::TransferOut,
            ]
        );
        assert_eq!(history[2].counterparty, 4);
        assert_eq!(history[2].amount, Decimal::new(600, 0));

        let received = ledger.view_transactions(4).unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].kind, TransactionKind::TransferIn);
        assert_eq!(received[0].counterparty, 3);

        // History replays to the current balance.
        let replayed: Decimal = history.iter().map(Transaction::signed_amount).sum();
        assert_eq!(
            Decimal::new(100000, 2) + replayed,
            balance(&ledger, 3)
        );
    }

    #[test]
    fn test_rejected_operations_leave_no_history() {
        let (_dir, ledger) = seeded_ledger();
        assert!(ledger.withdraw(3, Decimal::new(1500, 0)).is_err());
        assert!(ledger.transfer(4, 3, Decimal::new(501, 0)).is_err());
        assert!(ledger.deposit(1, Decimal::ONE).is_err());

        assert!(ledger.view_transactions(3).unwrap().is_empty());
        assert!(ledger.view_transactions(4).unwrap().is_empty());
    }

    #[test]
    fn test_history_of_missing_account() {
        let (_dir, ledger) = seeded_ledger();
        assert_eq!(
            ledger.view_transactions(99).unwrap_err(),
            LedgerError::not_found(StoreKind::Accounts, 99)
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_balance_written_without_history_is_partial_failure() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store: RecordStore<Account> = RecordStore::open_in(dir.path()).unwrap();
        seed_accounts(&store);
        // Opens as an empty store; every write fails with ENOSPC.
        let ledger = Ledger::new(
            Arc::new(store),
            Arc::new(RecordStore::open("/dev/full").unwrap()),
            Arc::new(RecordLockManager::new()),
        );

        let err = ledger.deposit(3, Decimal::new(50, 0)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PartialFailure {
                store: StoreKind::Accounts,
                id: 3,
                ..
            }
        ));
        assert_eq!(err.kind(), crate::types::ErrorKind::PartialFailure);
        // Nothing is rolled back, and the account lock was released.
        assert_eq!(balance(&ledger, 3), Decimal::new(105000, 2));
    }

    #[test]
    fn test_concurrent_transfers_record_both_sides() {
        let (_dir, ledger) = seeded_ledger();

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        ledger.transfer(3, 4, Decimal::ONE).unwrap();
                    }
                });
            }
        });

        let out = ledger.view_transactions(3).unwrap();
        let incoming = ledger.view_transactions(4).unwrap();
        assert_eq!(out.len(), 100);
        assert_eq!(incoming.len(), 100);
        assert!(out.iter().all(|e| e.kind == TransactionKind::TransferOut));
    }
}
