use std::sync::{Mutex, MutexGuard};

/// A detachable callback slot shared between a handle and its worker task
///
/// The worker delivers under the lock and `detach` clears the slot under the
/// same lock, so once `detach` returns the callback never runs again. A
/// callback must not detach its own slot from inside a delivery.
pub(crate) struct ListenerSlot<F> {
    callback: Mutex<Option<F>>,
}

impl<F> ListenerSlot<F> {
    pub(crate) fn new(callback: F) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Run `deliver` against the callback if still attached
    ///
    /// Returns `false` once the slot has been detached.
    pub(crate) fn deliver(&self, deliver: impl FnOnce(&mut F)) -> bool {
        match self.lock().as_mut() {
            Some(callback) => {
                deliver(callback);
                true
            }
            None => false,
        }
    }

    /// Drop the callback; idempotent
    pub(crate) fn detach(&self) -> bool {
        self.lock().take().is_some()
    }

    pub(crate) fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<F>> {
        // A panicking callback must not wedge detach
        self.callback.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
