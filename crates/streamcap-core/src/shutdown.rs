//! Cooperative cancellation for the monitor loop, capture session, and the
//! self-polling control loop.
//!
//! A token replaces the global exit flag the loops would otherwise share:
//! each task holds a clone, observes cancellation at its own suspension
//! points, and shuts down in order.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Clonable, triggered-once cancellation token.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation. Idempotent.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Wait until the token is triggered. Returns immediately if it already
    /// was.
    pub async fn cancelled(&self) {
        while !self.is_triggered() {
            // Register before the flag re-check so a trigger between the
            // check and the await cannot be missed.
            let mut notified = pin!(self.inner.notify.notified());
            notified.as_mut().enable();
            if self.is_triggered() {
                break;
            }
            notified.await;
        }
    }
}
