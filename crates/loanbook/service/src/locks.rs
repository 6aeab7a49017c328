//! Per-loan serialization for mutating operations.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use loanbook_types::LoanId;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::LoanError;

/// Registry of one async mutex per loan. Mutating operations hold the
/// loan's mutex for the whole read-modify-write; reads bypass the
/// registry entirely.
///
/// Entries are dropped again when the last guard for a loan releases,
/// so the registry stays bounded by the number of loans with an
/// operation in flight.
#[derive(Default)]
pub(crate) struct LoanLocks {
    locks: Arc<DashMap<LoanId, Arc<Mutex<()>>>>,
}

/// Holds a loan's mutex for the duration of one mutating operation.
pub(crate) struct LoanGuard {
    guard: Option<OwnedMutexGuard<()>>,
    loan_id: LoanId,
    registry: Arc<DashMap<LoanId, Arc<Mutex<()>>>>,
}

impl Drop for LoanGuard {
    fn drop(&mut self) {
        // Release the mutex first, then retire the entry if nothing
        // else references it. A task that grabbed the Arc in the
        // meantime keeps the strong count above one and the entry
        // stays.
        self.guard.take();
        self.registry
            .remove_if(&self.loan_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl LoanLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Acquire the loan's mutex, waiting at most `wait`. Acquisition
    /// respects the caller's deadline like any other part of the
    /// operation.
    pub(crate) async fn acquire(
        &self,
        loan_id: &LoanId,
        wait: Duration,
    ) -> Result<LoanGuard, LoanError> {
        let lock = self
            .locks
            .entry(loan_id.clone())
            .or_default()
            .value()
            .clone();
        let guard = tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| LoanError::Timeout)?;
        Ok(LoanGuard {
            guard: Some(guard),
            loan_id: loan_id.clone(),
            registry: Arc::clone(&self.locks),
        })
    }
}
