//! Process-wide stop flag shared by every server task.

use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

#[derive(Debug, Default)]
pub struct StopFlag {
    raised: AtomicBool,
    notify: Notify,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes every task currently waiting on it.
    pub fn raise(&self) {
        if !self.raised.swap(true, Ordering::SeqCst) {
            info!("Stop requested");
        }
        self.notify.notify_waiters();
    }

    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Completes once the flag has been raised.
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent raise() is not missed
            notified.as_mut().enable();

            if self.is_raised() {
                return;
            }
            notified.await;
        }
    }
}
