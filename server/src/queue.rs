//! Timestamp-ordered buffer between the ingestion and dispatch loops
//!
//! The queue is the only coupling between the two loops. Ingestion pushes
//! decoded updates as they arrive; dispatch sleeps until something is
//! queued, then pops updates in ascending origin timestamp. Updates with
//! equal timestamps come out in the order they were pushed.
//!
//! Ordering only holds among updates that are queued at the same time. An
//! update that arrives after a newer one has already been popped is still
//! dispatched, just late: nothing is reordered retroactively.

use crate::shutdown::StopFlag;
use shared::Update;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Queued update tagged with its arrival order for FIFO tie-breaking
#[derive(Debug)]
struct Pending {
    update: Update,
    arrival: u64,
}

impl Pending {
    fn key(&self) -> (u32, u64) {
        (self.update.timestamp, self.arrival)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap yields the oldest update first
        other.key().cmp(&self.key())
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Pending>,
    next_arrival: u64,
}

/// Min-heap of updates keyed by origin timestamp, with a wake-up signal
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl DeliveryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queues an update and wakes a dispatcher waiting in [`Self::wait_for_updates`].
    pub fn push(&self, update: Update) {
        {
            let mut inner = self.lock();
            let arrival = inner.next_arrival;
            inner.next_arrival += 1;
            inner.heap.push(Pending { update, arrival });
        }
        self.notify.notify_one();
    }

    /// Removes the update with the smallest timestamp, if any.
    pub fn pop_min(&self) -> Option<Update> {
        self.lock().heap.pop().map(|pending| pending.update)
    }

    /// Returns true if no update is waiting for dispatch.
    pub fn is_empty(&self) -> bool {
        self.lock().heap.is_empty()
    }

    /// Number of updates waiting for dispatch.
    pub fn len(&self) -> usize {
        self.lock().heap.len()
    }

    /// Waits until the queue holds at least one update.
    ///
    /// Returns `true` when updates are available and `false` once `stop` has
    /// been raised. A raised flag wins over a non-empty queue.
    pub async fn wait_for_updates(&self, stop: &StopFlag) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if stop.is_raised() {
                return false;
            }
            if !self.is_empty() {
                return true;
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = stop.wait() => return false,
            }
        }
    }
}
