use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct Occupancy {
    current: AtomicUsize,
    high_water: AtomicUsize,
}

/// Counting semaphore bounding how many jobs sit between admission and a
/// terminal state.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    semaphore: Arc<Semaphore>,
    occupancy: Arc<Occupancy>,
    capacity: usize,
}

impl AdmissionGate {
    /// A zero capacity is raised to one so the queue always drains.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            occupancy: Arc::new(Occupancy::default()),
            capacity,
        }
    }

    /// Waits until a slot is free.
    pub async fn acquire(&self) -> Result<SlotPermit, AcquireError> {
        let permit = self.semaphore.clone().acquire_owned().await?;
        Ok(self.admit(permit))
    }

    pub fn try_acquire(&self) -> Option<SlotPermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| self.admit(permit))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn occupancy(&self) -> usize {
        self.occupancy.current.load(Ordering::Acquire)
    }

    /// Highest occupancy observed since the gate was created.
    pub fn high_water_mark(&self) -> usize {
        self.occupancy.high_water.load(Ordering::Acquire)
    }

    fn admit(&self, permit: OwnedSemaphorePermit) -> SlotPermit {
        let occupied = self.occupancy.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.occupancy.high_water.fetch_max(occupied, Ordering::AcqRel);
        SlotPermit {
            occupancy: self.occupancy.clone(),
            _permit: permit,
        }
    }
}

/// One admission slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct SlotPermit {
    occupancy: Arc<Occupancy>,
    _permit: OwnedSemaphorePermit,
}

impl SlotPermit {
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        // Runs before the semaphore permit is returned, so occupancy never
        // exceeds capacity.
        self.occupancy.current.fetch_sub(1, Ordering::AcqRel);
    }
}
