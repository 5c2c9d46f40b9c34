use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::runtime::types::RuntimeError;

/// RAII guard for an admitted task.
///
/// Counts toward `max_queue_size` from admission until dropped, whether the
/// task is still waiting for a slot or already running.
pub struct Ticket {
    admitted: Arc<AtomicUsize>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.admitted.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for Ticket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticket").finish()
    }
}

/// RAII guard that releases a concurrency slot when dropped.
///
/// Callers must hold this until the corresponding pipeline finishes.
pub struct SlotPermit {
    #[allow(dead_code)]
    permit: OwnedSemaphorePermit,
    running: Arc<AtomicUsize>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for SlotPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotPermit").finish()
    }
}

/// Bounded admission plus bounded concurrency.
///
/// Admission is checked synchronously against `max_queue_size` (queued and
/// running tasks together). Running tasks are gated by a semaphore with
/// `max_concurrency` permits; tokio's semaphore is fair, so waiting tasks get
/// a slot in the order they asked for one.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    admitted: Arc<AtomicUsize>,
    running: Arc<AtomicUsize>,
    max_queue_size: usize,
}

impl AdmissionController {
    pub fn new(max_concurrency: usize, max_queue_size: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrency)),
            admitted: Arc::new(AtomicUsize::new(0)),
            running: Arc::new(AtomicUsize::new(0)),
            max_queue_size,
        }
    }

    /// Reserve a place in the queue.
    ///
    /// Returns [`RuntimeError::QueueFull`] when queued plus in-flight tasks
    /// already reach `max_queue_size`.
    pub fn try_admit(&self) -> Result<Ticket, RuntimeError> {
        let capacity = self.max_queue_size;
        self.admitted
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < capacity).then_some(current + 1)
            })
            .map(|_| Ticket {
                admitted: Arc::clone(&self.admitted),
            })
            .map_err(|current| RuntimeError::QueueFull { current, capacity })
    }

    /// Wait for a concurrency slot.
    ///
    /// Fails with [`RuntimeError::ShuttingDown`] once [`Self::close`] was called.
    pub async fn acquire_slot(&self) -> Result<SlotPermit, RuntimeError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| RuntimeError::ShuttingDown)?;
        self.running.fetch_add(1, Ordering::AcqRel);
        Ok(SlotPermit {
            permit,
            running: Arc::clone(&self.running),
        })
    }

    /// Admitted tasks still waiting for a slot.
    pub fn queued(&self) -> usize {
        self.admitted
            .load(Ordering::Acquire)
            .saturating_sub(self.in_flight())
    }

    pub fn in_flight(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Stop handing out slots. Tasks waiting in [`Self::acquire_slot`] wake
    /// with an error; running tasks keep their permits.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }
}
