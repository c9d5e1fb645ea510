use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{LoanError, Result};
use crate::types::LoanId;

/// holder reported in lock conflicts
pub const COB_LOCK_HOLDER: &str = "COB";

/// which close-of-business path holds the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockOwner {
    /// regular partitioned batch run
    LoanCobChunkProcessing,
    /// catch-up run triggered for a single loan
    LoanInlineCobProcessing,
}

impl fmt::Display for LockOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockOwner::LoanCobChunkProcessing => write!(f, "LOAN_COB_CHUNK_PROCESSING"),
            LockOwner::LoanInlineCobProcessing => write!(f, "LOAN_INLINE_COB_PROCESSING"),
        }
    }
}

/// present only while close of business is processing the loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanLockState {
    pub loan_id: LoanId,
    pub owner: LockOwner,
    pub acquired_at: DateTime<Utc>,
}

impl LoanLockState {
    pub fn locked_by(&self) -> &'static str {
        COB_LOCK_HOLDER
    }
}

/// storage for lock records; `insert_if_absent` must be a single atomic
/// check-and-set
pub trait LoanLockStore: Send + Sync {
    /// store the record unless the loan is already locked, in which case
    /// the existing record is returned untouched
    fn insert_if_absent(&self, state: LoanLockState) -> std::result::Result<(), LoanLockState>;

    fn remove(&self, loan_id: LoanId) -> Option<LoanLockState>;

    fn get(&self, loan_id: LoanId) -> Option<LoanLockState>;

    fn locked_loans(&self) -> Vec<LoanId>;
}

/// lock records held in process memory
#[derive(Debug, Default)]
pub struct InMemoryLoanLockStore {
    locks: Mutex<HashMap<LoanId, LoanLockState>>,
}

impl InMemoryLoanLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoanLockStore for InMemoryLoanLockStore {
    fn insert_if_absent(&self, state: LoanLockState) -> std::result::Result<(), LoanLockState> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locks.get(&state.loan_id) {
            return Err(existing.clone());
        }
        locks.insert(state.loan_id, state);
        Ok(())
    }

    fn remove(&self, loan_id: LoanId) -> Option<LoanLockState> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&loan_id)
    }

    fn get(&self, loan_id: LoanId) -> Option<LoanLockState> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&loan_id)
            .cloned()
    }

    fn locked_loans(&self) -> Vec<LoanId> {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

/// non-blocking per-loan lock between close of business and interactive
/// commands. a locked loan is reported as a conflict, never waited on.
pub struct LoanBatchLock {
    store: Arc<dyn LoanLockStore>,
}

impl Clone for LoanBatchLock {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl LoanBatchLock {
    pub fn new(store: Arc<dyn LoanLockStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryLoanLockStore::new()))
    }

    /// UNLOCKED -> LOCKED; fails immediately when the loan is already locked
    pub fn try_lock(&self, loan_id: LoanId, owner: LockOwner, acquired_at: DateTime<Utc>) -> Result<()> {
        let state = LoanLockState {
            loan_id,
            owner,
            acquired_at,
        };

        match self.store.insert_if_absent(state) {
            Ok(()) => {
                debug!(%loan_id, %owner, "loan locked for close of business");
                Ok(())
            }
            Err(existing) => {
                warn!(%loan_id, held_by = %existing.owner, "loan already locked");
                Err(locked(loan_id))
            }
        }
    }

    /// lock and hand back a guard that releases on drop
    pub fn acquire(
        &self,
        loan_id: LoanId,
        owner: LockOwner,
        acquired_at: DateTime<Utc>,
    ) -> Result<CobLockGuard<'_>> {
        self.try_lock(loan_id, owner, acquired_at)?;
        Ok(CobLockGuard {
            lock: self,
            loan_id,
            released: false,
        })
    }

    /// LOCKED -> UNLOCKED; returns the released record, if any
    pub fn release(&self, loan_id: LoanId) -> Option<LoanLockState> {
        let released = self.store.remove(loan_id);
        if released.is_some() {
            debug!(%loan_id, "loan lock released");
        }
        released
    }

    pub fn is_locked(&self, loan_id: LoanId) -> bool {
        self.store.get(loan_id).is_some()
    }

    pub fn lock_state(&self, loan_id: LoanId) -> Option<LoanLockState> {
        self.store.get(loan_id)
    }

    /// gate for every mutating command
    pub fn ensure_unlocked(&self, loan_id: LoanId) -> Result<()> {
        if self.is_locked(loan_id) {
            return Err(locked(loan_id));
        }
        Ok(())
    }

    pub fn locked_loans(&self) -> Vec<LoanId> {
        self.store.locked_loans()
    }
}

impl Default for LoanBatchLock {
    fn default() -> Self {
        Self::in_memory()
    }
}

fn locked(loan_id: LoanId) -> LoanError {
    LoanError::LoanLockedByCob {
        loan_id,
        locked_by: COB_LOCK_HOLDER.to_string(),
    }
}

/// held for the duration of one loan's close of business
pub struct CobLockGuard<'a> {
    lock: &'a LoanBatchLock,
    loan_id: LoanId,
    released: bool,
}

impl CobLockGuard<'_> {
    pub fn loan_id(&self) -> LoanId {
        self.loan_id
    }

    /// release now instead of at end of scope
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.lock.release(self.loan_id);
            self.released = true;
        }
    }
}

impl Drop for CobLockGuard<'_> {
    fn drop(&mut self) {
        self.release_once();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hourglass_rs::{SafeTimeProvider, TimeSource};
    use uuid::Uuid;

    fn time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()))
    }

    #[test]
    fn test_second_lock_fails_without_touching_record() {
        let lock = LoanBatchLock::in_memory();
        let time = time();
        let loan_id = Uuid::new_v4();

        lock.try_lock(loan_id, LockOwner::LoanCobChunkProcessing, time.now()).unwrap();
        let before = lock.lock_state(loan_id).unwrap();

        time.test_control().unwrap().advance(chrono::Duration::hours(1));
        let result = lock.try_lock(loan_id, LockOwner::LoanInlineCobProcessing, time.now());

        assert_eq!(
            result,
            Err(LoanError::LoanLockedByCob {
                loan_id,
                locked_by: "COB".to_string()
            })
        );
        assert_eq!(lock.lock_state(loan_id).unwrap(), before);
        assert_eq!(before.locked_by(), "COB");
    }

    #[test]
    fn test_lock_release_lock() {
        let lock = LoanBatchLock::in_memory();
        let time = time();
        let loan_id = Uuid::new_v4();

        assert!(lock.try_lock(loan_id, LockOwner::LoanCobChunkProcessing, time.now()).is_ok());
        assert!(lock.release(loan_id).is_some());
        assert!(lock.try_lock(loan_id, LockOwner::LoanCobChunkProcessing, time.now()).is_ok());
        assert!(lock.release(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_ensure_unlocked() {
        let lock = LoanBatchLock::in_memory();
        let time = time();
        let loan_id = Uuid::new_v4();

        assert!(lock.ensure_unlocked(loan_id).is_ok());
        lock.try_lock(loan_id, LockOwner::LoanCobChunkProcessing, time.now()).unwrap();
        assert!(matches!(
            lock.ensure_unlocked(loan_id),
            Err(LoanError::LoanLockedByCob { .. })
        ));
    }

    #[test]
    fn test_guard_releases_on_every_exit() {
        let lock = LoanBatchLock::in_memory();
        let time = time();
        let loan_id = Uuid::new_v4();

        let failing = || -> Result<()> {
            let _guard = lock.acquire(loan_id, LockOwner::LoanCobChunkProcessing, time.now())?;
            assert!(lock.is_locked(loan_id));
            Err(LoanError::CobStepFailed {
                step: "APPLY_CHARGE_TO_OVERDUE_LOANS".to_string(),
                message: "boom".to_string(),
            })
        };
        assert!(failing().is_err());
        assert!(!lock.is_locked(loan_id));

        let guard = lock.acquire(loan_id, LockOwner::LoanInlineCobProcessing, time.now()).unwrap();
        assert_eq!(guard.loan_id(), loan_id);
        guard.release();
        assert!(!lock.is_locked(loan_id));
    }

    #[test]
    fn test_concurrent_try_lock_has_one_winner() {
        let lock = LoanBatchLock::in_memory();
        let now = time().now();
        let loan_id = Uuid::new_v4();

        let winners = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| scope.spawn(|| lock.try_lock(loan_id, LockOwner::LoanCobChunkProcessing, now).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or(false))
                .filter(|won| *won)
                .count()
        });

        assert_eq!(winners, 1);
        assert_eq!(lock.locked_loans(), vec![loan_id]);
    }
}
