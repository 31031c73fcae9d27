use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex, PoisonError, TryLockError,
};

/// A single-value mailbox between one producer and one polling consumer.
///
/// [publish](LatestSlot::publish) overwrites whatever value is held, so a
/// value nobody took yet is lost when a newer one arrives.
/// [try_take](LatestSlot::try_take) never waits: if the producer holds the
/// lock at that moment, it reports that nothing is available and the
/// consumer simply polls again later.
///
/// The lock is held only for the swap itself. A replaced value is dropped
/// after the lock is released.
#[derive(Debug)]
pub struct LatestSlot<T> {
    value: Mutex<Option<T>>,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl<T> LatestSlot<T> {
    pub fn new() -> Self {
        Self {
            value: Mutex::new(None),
            published: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Stores `value`, replacing any value not taken yet. Returns `true`
    /// when a value was replaced.
    pub fn publish(&self, value: T) -> bool {
        let replaced = {
            let mut slot = self.value.lock().unwrap_or_else(PoisonError::into_inner);
            slot.replace(value)
        };

        self.published.fetch_add(1, Ordering::Relaxed);
        let dropped = replaced.is_some();
        if dropped {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        dropped
    }

    /// Moves the held value out, leaving the slot empty.
    ///
    /// Returns `None` when the slot is empty or when the lock is busy.
    pub fn try_take(&self) -> Option<T> {
        let mut slot = match self.value.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(err)) => err.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        slot.take()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Number of values published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Number of values overwritten before anyone took them.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<T> Default for LatestSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
