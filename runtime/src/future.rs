//! One-shot future with a single producer and many blocking consumers.
//!
//! The Pending half of a cache entry: the compile thread fulfills the
//! promise exactly once, and each waiter blocks only at its first real
//! dereference. Waiters before completion park on a condvar; waiters after
//! completion return immediately.

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

struct Shared<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

/// Consumer half. Cloning yields another independent waiter on the same
/// outcome.
pub struct OnceFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for OnceFuture<T> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

/// Producer half. Consumed by fulfillment, so a second completion is
/// unrepresentable.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
}

/// Create a connected promise/future pair.
pub fn channel<T: Clone>() -> (Promise<T>, OnceFuture<T>) {
    let shared = Arc::new(Shared { slot: Mutex::new(None), ready: Condvar::new() });
    (Promise { shared: Arc::clone(&shared) }, OnceFuture { shared })
}

impl<T: Clone> OnceFuture<T> {
    /// Block until the producer completes, then return the outcome.
    pub fn wait(&self) -> T {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.shared.ready.wait(&mut slot);
        }
    }

    /// Non-blocking probe of the outcome.
    pub fn try_get(&self) -> Option<T> {
        self.shared.slot.lock().clone()
    }
}

impl<T: Clone> Promise<T> {
    /// Publish the outcome and wake every current waiter.
    pub fn complete(self, value: T) {
        let mut slot = self.shared.slot.lock();
        debug_assert!(slot.is_none(), "promise completed twice");
        *slot = Some(value);
        self.shared.ready.notify_all();
    }
}
