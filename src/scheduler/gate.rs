//! Concurrency gate bounding how many requests are in flight

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counting gate over a fixed number of request slots
///
/// Slots are semaphore permits; a slot is returned to the gate when the
/// `Slot` guard is dropped.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_slots: usize,
}

/// One occupied slot
#[derive(Debug)]
pub struct Slot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Creates a gate with `max_slots` slots (at least one)
    pub fn new(max_slots: usize) -> Self {
        let max_slots = max_slots.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_slots)),
            max_slots,
        }
    }

    /// Whether a slot is free right now
    pub fn has_capacity(&self) -> bool {
        self.semaphore.available_permits() > 0
    }

    /// Takes a slot without waiting
    pub fn try_acquire(&self) -> Option<Slot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| Slot { _permit: permit })
    }

    /// Number of slots currently occupied
    pub fn in_flight(&self) -> usize {
        self.max_slots - self.semaphore.available_permits()
    }

    pub fn max_slots(&self) -> usize {
        self.max_slots
    }
}
