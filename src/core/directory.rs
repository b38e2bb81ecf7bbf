//! User directory operations
//!
//! This module provides the `Directory`, which owns every operation that
//! creates users or changes their credentials and profile.
//!
//! # Design
//!
//! The users and accounts stores are positionally aligned: user `i` owns
//! account `i`. Creating a user therefore appends to both stores, and the
//! identifier allocation holds the append cursors of both stores
//! (`Users.Tail` then `Accounts.Tail`) for the whole read-count-append
//! sequence. Two concurrent creations can never compute the same
//! identifier.
//!
//! The two appends are not atomic. If the user record is written and the
//! account append then fails, the error is reported as `PartialFailure`
//! and nothing is rolled back.
//!
//! Passwords are stored as bcrypt hashes. Hashing happens before any lock
//! is taken, since it is the slowest step of user creation. A login for an
//! unknown username still runs one bcrypt verification, against a hash of
//! the same cost, so response time does not reveal which usernames exist.

use super::lock_manager::{LockKey, LockMode, RecordLockManager};
use crate::store::RecordStore;
use crate::types::{Account, LedgerError, Profile, RecordId, Role, StoreKind, User};
use std::sync::{Arc, OnceLock};
use tracing::{debug, error, info, warn};

const DUMMY_PASSWORD: &str = "no such user";

/// Operations on the users store and its aligned accounts
#[derive(Debug, Clone)]
pub struct Directory {
    users: Arc<RecordStore<User>>,
    accounts: Arc<RecordStore<Account>>,
    locks: Arc<RecordLockManager>,
    password_cost: u32,
    dummy_hash: Arc<OnceLock<String>>,
}

/// Extra condition checked while the append cursors are held
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Precondition {
    None,
    EmptyStore,
}

fn require_text(field: &str, value: &str) -> Result<(), LedgerError> {
    if value.is_empty() {
        return Err(LedgerError::invalid_action(&format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(())
}

impl Directory {
    /// Create a directory over the given stores
    ///
    /// # Arguments
    ///
    /// * `password_cost` - bcrypt cost used for new password hashes
    pub fn new(
        users: Arc<RecordStore<User>>,
        accounts: Arc<RecordStore<Account>>,
        locks: Arc<RecordLockManager>,
        password_cost: u32,
    ) -> Self {
        Self {
            users,
            accounts,
            locks,
            password_cost,
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    fn dummy_hash(&self) -> Option<&str> {
        if let Some(hash) = self.dummy_hash.get() {
            return Some(hash);
        }
        let hash = bcrypt::hash(DUMMY_PASSWORD, self.password_cost).ok()?;
        Some(self.dummy_hash.get_or_init(|| hash))
    }

    fn hash_password(&self, password: &str) -> Result<String, LedgerError> {
        require_text("password", password)?;
        Ok(bcrypt::hash(password, self.password_cost)?)
    }

    /// Allocate the next identifier in both stores and append the pair
    fn create_user(
        &self,
        role: Role,
        username: &str,
        password: &str,
        profile: Profile,
        precondition: Precondition,
    ) -> Result<User, LedgerError> {
        require_text("username", username)?;
        let password_hash = self.hash_password(password)?;

        let _tails = self.locks.acquire_ordered(
            &[
                LockKey::tail(StoreKind::Users),
                LockKey::tail(StoreKind::Accounts),
            ],
            LockMode::Exclusive,
        )?;

        if precondition == Precondition::EmptyStore && self.users.count()? != 0 {
            return Err(LedgerError::invalid_action("users store is already initialized"));
        }
        if self.users.scan()?.iter().any(|u| u.username == username) {
            debug!(username, "username already taken");
            return Err(LedgerError::UsernameTaken {
                username: username.to_string(),
            });
        }

        let id = self.users.next_id()?;
        let accounts_next = self.accounts.next_id()?;
        if id != accounts_next {
            warn!(users = id, accounts = accounts_next, "stores are misaligned");
            return Err(LedgerError::StoreMisaligned {
                users: id,
                accounts: accounts_next,
            });
        }

        let user = User {
            id,
            role,
            username: username.to_string(),
            password_hash,
            profile,
        };
        self.users.append(&user)?;

        let account = if role.is_staff() {
            Account::placeholder(id)
        } else {
            Account::new(id)
        };
        if let Err(e) = self.accounts.append(&account) {
            error!(user = id, error = %e, "user written without its account");
            return Err(LedgerError::partial_failure(
                StoreKind::Users,
                id,
                &format!("account append failed: {}", e),
            ));
        }

        info!(user = id, %role, username, "user created");
        Ok(user)
    }

    /// Create a customer with an active, empty account
    ///
    /// The customer gets the placeholder profile until an employee edits it.
    ///
    /// # Returns
    ///
    /// The stored user; its identifier is also the new account's identifier.
    ///
    /// # Errors
    ///
    /// - `UsernameTaken` if the username exists
    /// - `StoreMisaligned` if the two stores disagree on the next identifier
    /// - `PartialFailure` if the user was written but the account was not
    pub fn add_customer(&self, username: &str, password: &str) -> Result<User, LedgerError> {
        self.create_user(
            Role::Customer,
            username,
            password,
            Profile::placeholder(),
            Precondition::None,
        )
    }

    /// Create an employee or manager
    ///
    /// A deactivated placeholder account keeps the stores aligned.
    pub fn add_staff(&self, role: Role, username: &str, password: &str) -> Result<User, LedgerError> {
        if !matches!(role, Role::Employee | Role::Manager) {
            return Err(LedgerError::invalid_action(&format!(
                "cannot create a {} account",
                role
            )));
        }
        self.create_user(
            role,
            username,
            password,
            Profile::placeholder(),
            Precondition::None,
        )
    }

    /// Create the first administrator of an empty users store
    ///
    /// Emptiness is checked under the same append-cursor locks that create
    /// the user, so concurrent callers in one process create at most one
    /// administrator.
    ///
    /// # Errors
    ///
    /// - `InvalidAction` if any user already exists
    pub fn bootstrap_administrator(
        &self,
        username: &str,
        password: &str,
    ) -> Result<User, LedgerError> {
        let profile = Profile {
            name: "Administrator".to_string(),
            age: 0,
            address: "Head Office".to_string(),
        };
        self.create_user(
            Role::Administrator,
            username,
            password,
            profile,
            Precondition::EmptyStore,
        )
    }

    /// Replace the profile of a customer
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user does not exist
    /// - `WrongRole` if the user is not a customer
    pub fn modify_customer(&self, target: RecordId, profile: Profile) -> Result<User, LedgerError> {
        let _guard = self
            .locks
            .lock_record(StoreKind::Users, target, LockMode::Exclusive)?;

        let mut user = self.users.read(target)?;
        if user.role != Role::Customer {
            return Err(LedgerError::wrong_role(target, Role::Customer, user.role));
        }
        user.profile = profile;
        self.users.write(&user)?;

        info!(user = target, "customer profile updated");
        Ok(user)
    }

    /// Check credentials for a role
    ///
    /// The first user whose username and role match and whose password
    /// verifies is returned. Customers must also own an active account.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for an unknown user, wrong password, wrong role or
    ///   deactivated customer, without saying which
    pub fn authenticate(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User, LedgerError> {
        let rejected = || LedgerError::unauthorized("invalid credentials");

        let candidates: Vec<User> = self
            .users
            .scan()?
            .into_iter()
            .filter(|u| u.username == username && u.role == role)
            .collect();
        if candidates.is_empty() {
            if let Some(hash) = self.dummy_hash() {
                let _ = bcrypt::verify(password, hash);
            }
            debug!(username, %role, "login for unknown user");
            return Err(rejected());
        }

        let user = candidates
            .into_iter()
            .find(|u| match bcrypt::verify(password, &u.password_hash) {
                Ok(matches) => matches,
                Err(e) => {
                    warn!(user = u.id, error = %e, "stored password hash is unreadable");
                    false
                }
            })
            .ok_or_else(rejected)?;

        if role == Role::Customer {
            let _guard =
                self.locks
                    .lock_record(StoreKind::Accounts, user.id, LockMode::Shared)?;
            let active = match self.accounts.read(user.id) {
                Ok(account) => account.is_active(),
                Err(LedgerError::NotFound { .. }) => false,
                Err(e) => return Err(e),
            };
            if !active {
                debug!(user = user.id, "login refused for deactivated customer");
                return Err(rejected());
            }
        }

        info!(user = user.id, %role, "login succeeded");
        Ok(user)
    }

    /// Replace a user's password after checking the current one
    ///
    /// # Errors
    ///
    /// - `Unauthorized` if `current` does not verify
    pub fn change_password(
        &self,
        user_id: RecordId,
        current: &str,
        new: &str,
    ) -> Result<(), LedgerError> {
        let new_hash = self.hash_password(new)?;
        let _guard = self
            .locks
            .lock_record(StoreKind::Users, user_id, LockMode::Exclusive)?;

        let mut user = self.users.read(user_id)?;
        if !bcrypt::verify(current, &user.password_hash)? {
            return Err(LedgerError::unauthorized("current password does not match"));
        }
        user.password_hash = new_hash;
        self.users.write(&user)?;

        info!(user = user_id, "password changed");
        Ok(())
    }

    /// Read one user under a shared lock
    pub fn user(&self, id: RecordId) -> Result<User, LedgerError> {
        let _guard = self
            .locks
            .lock_record(StoreKind::Users, id, LockMode::Shared)?;
        self.users.read(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AccountStatus;
    use rust_decimal::Decimal;
    use crate::types::ErrorKind;
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;
    use tempfile::TempDir;

    const COST: u32 = 4;

    struct Fixture {
        _dir: TempDir,
        users: Arc<RecordStore<User>>,
        accounts: Arc<RecordStore<Account>>,
        directory: Directory,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let users = Arc::new(RecordStore::open_in(dir.path()).unwrap());
        let accounts = Arc::new(RecordStore::open_in(dir.path()).unwrap());
        let directory = Directory::new(
            Arc::clone(&users),
            Arc::clone(&accounts),
            Arc::new(RecordLockManager::new()),
            COST,
        );
        Fixture {
            _dir: dir,
            users,
            accounts,
            directory,
        }
    }

    #[test]
    fn test_bootstrap_then_add_customer_assigns_next_id() {
        let f = fixture();
        let admin = f.directory.bootstrap_administrator("admin", "adminpass").unwrap();
        assert_eq!(admin.id, 1);
        assert_eq!(f.accounts.read(1).unwrap().status, AccountStatus::Deactivated);

        let customer = f.directory.add_customer("custA", "custApass").unwrap();
        assert_eq!(customer.id, 2);
        assert_eq!(customer.role, Role::Customer);
        assert_eq!(customer.profile, Profile::placeholder());

        let account = f.accounts.read(2).unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[test]
    fn test_bootstrap_refuses_non_empty_store() {
        let f = fixture();
        f.directory.add_customer("custA", "pw").unwrap();
        let err = f
            .directory
            .bootstrap_administrator("admin", "adminpass")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAction { .. }));
    }

    #[test]
    fn test_concurrent_bootstrap_creates_one_administrator() {
        for _ in 0..10 {
            let f = fixture();
            let barrier = Barrier::new(2);

            let results: Vec<_> = thread::scope(|scope| {
                let handles: Vec<_> = ["admin1", "admin2"]
                    .into_iter()
                    .map(|username| {
                        let directory = &f.directory;
                        let barrier = &barrier;
                        scope.spawn(move || {
                            barrier.wait();
                            directory.bootstrap_administrator(username, "adminpass")
                        })
                    })
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(LedgerError::InvalidAction { .. }))));
            assert_eq!(f.users.count().unwrap(), 1);
            assert_eq!(f.accounts.count().unwrap(), 1);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_user_written_without_account_is_partial_failure() {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let users = Arc::new(RecordStore::open_in(dir.path()).unwrap());
        // Opens as an empty store; every write fails with ENOSPC.
        let accounts = Arc::new(RecordStore::<Account>::open("/dev/full").unwrap());
        let directory = Directory::new(
            Arc::clone(&users),
            accounts,
            Arc::new(RecordLockManager::new()),
            COST,
        );

        let err = directory.add_customer("custA", "pw").unwrap_err();
        assert!(matches!(
            err,
            LedgerError::PartialFailure {
                store: StoreKind::Users,
                id: 1,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        // The user record is kept, not rolled back.
        assert_eq!(users.count().unwrap(), 1);

        assert_eq!(
            directory.add_customer("custB", "pw").unwrap_err(),
            LedgerError::StoreMisaligned {
                users: 2,
                accounts: 1
            }
        );
    }

    #[test]
    fn test_passwords_are_not_stored_in_plaintext() {
        let f = fixture();
        let user = f.directory.add_customer("custA", "custApass").unwrap();
        let stored = f.users.read(user.id).unwrap();
        assert_ne!(stored.password_hash, "custApass");
        assert!(bcrypt::verify("custApass", &stored.password_hash).unwrap());
    }

    #[test]
    fn test_duplicate_username_is_rejected() {
        let f = fixture();
        f.directory.add_customer("custA", "pw").unwrap();
        let err = f.directory.add_customer("custA", "other").unwrap_err();
        assert_eq!(
            err,
            LedgerError::UsernameTaken {
                username: "custA".to_string()
            }
        );
        assert_eq!(f.users.count().unwrap(), 1);
    }

    #[test]
    fn test_empty_credentials_are_rejected() {
        let f = fixture();
        assert!(f.directory.add_customer("", "pw").is_err());
        assert!(f.directory.add_customer("custA", "").is_err());
        assert_eq!(f.users.count().unwrap(), 0);
    }

    #[test]
    fn test_misaligned_stores_write_nothing() {
        let f = fixture();
        f.accounts.append(&Account::new(1)).unwrap();

        let err = f.directory.add_customer("custA", "pw").unwrap_err();
        assert_eq!(
            err,
            LedgerError::StoreMisaligned {
                users: 1,
                accounts: 2
            }
        );
        assert_eq!(f.users.count().unwrap(), 0);
    }

    #[test]
    fn test_add_staff_writes_placeholder_account() {
        let f = fixture();
        let employee = f.directory.add_staff(Role::Employee, "emp1", "emppass").unwrap();
        assert_eq!(employee.role, Role::Employee);
        assert!(!f.accounts.read(employee.id).unwrap().is_active());
    }

    #[test]
    fn test_add_staff_refuses_customer_and_administrator_roles() {
        let f = fixture();
        for role in [Role::Customer, Role::Administrator] {
            let err = f.directory.add_staff(role, "someone", "pw").unwrap_err();
            assert!(matches!(err, LedgerError::InvalidAction { .. }));
        }
    }

    #[test]
    fn test_concurrent_add_customer_gets_distinct_ids() {
        let f = fixture();

        let ids: Vec<RecordId> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let directory = &f.directory;
                    scope.spawn(move || {
                        directory
                            .add_customer(&format!("cust{}", i), "pw")
                            .unwrap()
                            .id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let distinct: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(distinct.len(), 8);
        assert_eq!(f.users.count().unwrap(), 8);
        assert_eq!(f.accounts.count().unwrap(), 8);
        for id in 1..=8 {
            assert_eq!(f.users.read(id).unwrap().id, f.accounts.read(id).unwrap().id);
        }
    }

    #[test]
    fn test_modify_customer_replaces_profile() {
        let f = fixture();
        let customer = f.directory.add_customer("custA", "pw").unwrap();
        let profile = Profile {
            name: "Customer A".to_string(),
            age: 25,
            address: "Address A".to_string(),
        };

        let updated = f.directory.modify_customer(customer.id, profile.clone()).unwrap();
        assert_eq!(updated.profile, profile);
        assert_eq!(f.users.read(customer.id).unwrap().profile, profile);
    }

    #[test]
    fn test_modify_customer_rejects_staff() {
        let f = fixture();
        let employee = f.directory.add_staff(Role::Employee, "emp1", "pw").unwrap();
        let err = f
            .directory
            .modify_customer(employee.id, Profile::placeholder())
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::wrong_role(employee.id, Role::Customer, Role::Employee)
        );
    }

    #[test]
    fn test_modify_customer_rejects_overlong_fields() {
        let f = fixture();
        let customer = f.directory.add_customer("custA", "pw").unwrap();
        let profile = Profile {
            name: "n".repeat(51),
            age: 25,
            address: String::new(),
        };
        let err = f.directory.modify_customer(customer.id, profile).unwrap_err();
        assert!(matches!(err, LedgerError::FieldTooLong { .. }));
        assert_eq!(
            f.users.read(customer.id).unwrap().profile,
            Profile::placeholder()
        );
    }

    #[test]
    fn test_authenticate_checks_password_and_role() {
        let f = fixture();
        let customer = f.directory.add_customer("custA", "custApass").unwrap();

        let user = f
            .directory
            .authenticate("custA", "custApass", Role::Customer)
            .unwrap();
        assert_eq!(user.id, customer.id);

        for (username, password, role) in [
            ("custA", "wrong", Role::Customer),
            ("custA", "custApass", Role::Employee),
            ("nobody", "custApass", Role::Customer),
        ] {
            let err = f.directory.authenticate(username, password, role).unwrap_err();
            assert_eq!(err, LedgerError::unauthorized("invalid credentials"));
        }
    }

    #[test]
    fn test_unknown_user_still_pays_for_a_verification() {
        let f = fixture();
        f.directory.add_customer("custA", "custApass").unwrap();
        assert!(f.directory.dummy_hash.get().is_none());

        let err = f
            .directory
            .authenticate("nobody", "custApass", Role::Customer)
            .unwrap_err();
        assert_eq!(err, LedgerError::unauthorized("invalid credentials"));

        let hash = f.directory.dummy_hash.get().expect("dummy hash computed");
        assert!(hash.starts_with("$2"));
        assert!(hash.contains(&format!("${:02}$", COST)));
    }

    #[test]
    fn test_deactivated_customer_cannot_log_in() {
        let f = fixture();
        let customer = f.directory.add_customer("custA", "custApass").unwrap();
        f.accounts.write(&Account::placeholder(customer.id)).unwrap();

        let err = f
            .directory
            .authenticate("custA", "custApass", Role::Customer)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));
    }

    #[test]
    fn test_staff_log_in_despite_placeholder_account() {
        let f = fixture();
        f.directory.add_staff(Role::Manager, "mgr", "mgrpass").unwrap();
        assert!(f
            .directory
            .authenticate("mgr", "mgrpass", Role::Manager)
            .is_ok());
    }

    #[test]
    fn test_change_password() {
        let f = fixture();
        let customer = f.directory.add_customer("custA", "old").unwrap();

        let err = f
            .directory
            .change_password(customer.id, "not-old", "new")
            .unwrap_err();
        assert!(matches!(err, LedgerError::Unauthorized { .. }));

        f.directory.change_password(customer.id, "old", "new").unwrap();
        assert!(f.directory.authenticate("custA", "old", Role::Customer).is_err());
        assert!(f.directory.authenticate("custA", "new", Role::Customer).is_ok());
    }

    #[test]
    fn test_user_lookup() {
        let f = fixture();
        f.directory.add_customer("custA", "pw").unwrap();
        assert_eq!(f.directory.user(1).unwrap().username, "custA");
        assert_eq!(
            f.directory.user(2).unwrap_err(),
            LedgerError::not_found(StoreKind::Users, 2)
        );
    }
}
