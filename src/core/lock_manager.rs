//! Per-record lock manager
//!
//! This module provides the `RecordLockManager`, the only path by which
//! concurrent workers may mutate a store. Locks are advisory and scoped to a
//! single record (or to a store's append cursor), so two different records
//! never contend.
//!
//! # Design
//!
//! The lock table is a `DashMap` from [`LockKey`] to a small latch (a mutex
//! around reader/writer counts plus a condition variable). Latches are
//! created on first use and kept for the lifetime of the manager.
//!
//! - `Shared` is compatible with other `Shared` holders
//! - `Exclusive` excludes every other holder
//! - acquisition blocks without timeout and makes no FIFO promise
//! - locks are not reentrant
//!
//! Release is tied to guard lifetime: dropping a [`RecordGuard`] or a
//! [`LockSet`] releases its locks on every exit path, including `?`.
//!
//! # Lock Ordering
//!
//! Locks held together are always taken in one global order. Store kind
//! orders first (users, accounts, transactions, loans, feedback), then
//! records by ascending identifier, then the append cursor.
//! [`RecordLockManager::acquire_ordered`] sorts a key set into that order
//! before acquiring it. A holder may take one more key later only if it
//! sorts after everything already held, as the ledger does with the
//! transactions cursor. This is what keeps transfers deadlock-free.

use crate::types::{LedgerError, RecordId, StoreKind};
use dashmap::DashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

/// Lockable position inside a store
///
/// Variant order matters: every record sorts before the append cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// One record, by identifier
    Record(RecordId),

    /// The store's append cursor, held while allocating a new identifier
    Tail,
}

/// Key of one lock in the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockKey {
    pub store: StoreKind,
    pub slot: Slot,
}

impl LockKey {
    /// Key for a single record
    pub fn record(store: StoreKind, id: RecordId) -> Self {
        LockKey {
            store,
            slot: Slot::Record(id),
        }
    }

    /// Key for a store's append cursor
    pub fn tail(store: StoreKind) -> Self {
        LockKey {
            store,
            slot: Slot::Tail,
        }
    }

    fn unavailable(self) -> LedgerError {
        let id = match self.slot {
            Slot::Record(id) => id,
            Slot::Tail => 0,
        };
        LedgerError::LockUnavailable {
            store: self.store,
            id,
        }
    }
}

/// Lock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug, Default)]
struct LatchState {
    readers: usize,
    writer: bool,
}

impl LatchState {
    fn admits(&self, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => !self.writer,
            LockMode::Exclusive => !self.writer && self.readers == 0,
        }
    }
}

#[derive(Debug, Default)]
struct Latch {
    state: Mutex<LatchState>,
    released: Condvar,
}

impl Latch {
    fn lock(&self, key: LockKey, mode: LockMode) -> Result<(), LedgerError> {
        let mut state = self.state.lock().map_err(|_| key.unavailable())?;
        while !state.admits(mode) {
            state = self
                .released
                .wait(state)
                .map_err(|_| key.unavailable())?;
        }
        match mode {
            LockMode::Shared => state.readers += 1,
            LockMode::Exclusive => state.writer = true,
        }
        Ok(())
    }

    fn unlock(&self, mode: LockMode) {
        // The counters stay consistent even if a holder panicked elsewhere.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match mode {
            LockMode::Shared => state.readers = state.readers.saturating_sub(1),
            LockMode::Exclusive => state.writer = false,
        }
        drop(state);
        self.released.notify_all();
    }
}

/// Held lock on one record
///
/// Dropping the guard releases the lock.
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct RecordGuard {
    key: LockKey,
    mode: LockMode,
    latch: Arc<Latch>,
}

impl RecordGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.latch.unlock(self.mode);
    }
}

/// Several locks acquired in global order
///
/// Released in reverse acquisition order when dropped.
#[derive(Debug)]
#[must_use = "the locks are released as soon as the set is dropped"]
pub struct LockSet {
    guards: Vec<RecordGuard>,
}

impl LockSet {
    /// Keys in acquisition order
    pub fn keys(&self) -> Vec<LockKey> {
        self.guards.iter().map(RecordGuard::key).collect()
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

/// Table of per-record locks shared by all workers
#[derive(Debug, Default)]
pub struct RecordLockManager {
    latches: DashMap<LockKey, Arc<Latch>>,
}

impl RecordLockManager {
    pub fn new() -> Self {
        Self {
            latches: DashMap::new(),
        }
    }

    fn latch(&self, key: LockKey) -> Arc<Latch> {
        // Clone the Arc out so the shard lock is not held while blocking.
        Arc::clone(self.latches.entry(key).or_default().value())
    }

    /// Block until `key` is granted in `mode`
    ///
    /// Must not be called for a key the caller already holds.
    pub fn acquire(&self, key: LockKey, mode: LockMode) -> Result<RecordGuard, LedgerError> {
        let latch = self.latch(key);
        latch.lock(key, mode)?;
        Ok(RecordGuard { key, mode, latch })
    }

    /// Acquire a single record lock
    pub fn lock_record(
        &self,
        store: StoreKind,
        id: RecordId,
        mode: LockMode,
    ) -> Result<RecordGuard, LedgerError> {
        self.acquire(LockKey::record(store, id), mode)
    }

    /// Acquire several locks in the global order
    ///
    /// Keys are sorted ascending and deduplicated, then acquired one by one.
    /// If an acquisition fails, the locks already taken are released before
    /// the error is returned.
    pub fn acquire_ordered(
        &self,
        keys: &[LockKey],
        mode: LockMode,
    ) -> Result<LockSet, LedgerError> {
        let mut ordered = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut set = LockSet {
            guards: Vec::with_capacity(ordered.len()),
        };
        for key in ordered {
            set.guards.push(self.acquire(key, mode)?);
        }
        Ok(set)
    }
}
