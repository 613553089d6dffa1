//! Single-permit "data available" notification.
//!
//! `notify` sets a pending flag and wakes one waiter; setting it again while
//! pending is a no-op. `wait` consumes the pending flag. A waiter also wakes
//! on [`Wakeup::release`] so it can observe its closed flag.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct Wakeup {
    pending: Mutex<bool>,
    cond: Condvar,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pending notification (idempotent, never blocks on waiters)
    pub fn notify(&self) {
        let mut pending = self.pending.lock();
        if !*pending {
            *pending = true;
            self.cond.notify_one();
        }
    }

    /// Block until notified or released
    ///
    /// Returns `false` without consuming anything when `closed` is set.
    pub fn wait(&self, closed: &AtomicBool) -> bool {
        let mut pending = self.pending.lock();
        loop {
            if closed.load(Ordering::Acquire) {
                return false;
            }
            if *pending {
                *pending = false;
                return true;
            }
            self.cond.wait(&mut pending);
        }
    }

    /// Wake every waiter so it re-checks its closed flag
    pub fn release(&self) {
        let _guard = self.pending.lock();
        self.cond.notify_all();
    }

    /// True if a notification is waiting to be consumed
    pub fn is_pending(&self) -> bool {
        *self.pending.lock()
    }
}
