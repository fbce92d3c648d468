use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Blocking counting semaphore bounding the number of chunks transformed at once.
pub(crate) struct Semaphore {
    permits: Mutex<usize>,
    cv: Condvar,
}

/// Returns its permit when dropped, so a failing chunk cannot leak one.
pub(crate) struct Permit<'a> {
    sem: &'a Semaphore,
    /// Time spent waiting for the permit (zero if none was required).
    pub(crate) waited: Duration,
}

impl Semaphore {
    pub(crate) fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits.max(1)),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        // The counter stays consistent even if a holder panicked.
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Acquire one permit, blocking until available.
    pub(crate) fn acquire(&self) -> Permit<'_> {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.lock();
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        Permit {
            sem: self,
            waited: if waited { start.elapsed() } else { Duration::ZERO },
        }
    }

    fn release(&self) {
        let mut g = self.lock();
        *g += 1;
        self.cv.notify_one();
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.sem.release();
    }
}
