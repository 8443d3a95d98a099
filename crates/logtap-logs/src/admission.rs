use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use logtap_types::MAX_CONCURRENT_FETCHES;

/// Bounds how many expensive fetches run at once.
///
/// Admission never waits: when every slot is taken the caller is refused
/// and is expected to shed load instead of queueing.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

/// One admitted fetch; the slot is released when this is dropped
#[derive(Debug)]
#[must_use = "the admission slot is released as soon as the permit is dropped"]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    /// Limit clamped to what a semaphore can hold
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.min(Semaphore::MAX_PERMITS);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Admit if a slot is free, without side effects otherwise
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionPermit { _permit: permit })
    }

    /// Fetches currently admitted
    pub fn active(&self) -> usize {
        self.max_concurrent() - self.permits.available_permits()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT_FETCHES)
    }
}
