use parking_lot::Mutex;
use std::{
    fmt, mem,
    sync::atomic::{AtomicBool, Ordering},
    sync::{Arc, Weak},
};

/// Something a blocked thread may be parked on.
///
/// Implementors must take the same lock the waiter checks the token under
/// before notifying, otherwise a cancel racing the waiter's final check
/// could be lost.
pub(crate) trait Interrupt: Send + Sync {
    fn interrupt(&self);
}

#[derive(Default)]
struct Registry {
    next_key: u64,
    waiting: Vec<(u64, Weak<dyn Interrupt>)>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    registry: Mutex<Registry>,
}

/// Aborts blocking waits on queues and rate limiters.
///
/// Pass a token to the `*_with` variants of the blocking operations. Once
/// [`cancel`](Self::cancel) is called every current and future wait using
/// the token returns [`Error::Cancelled`](crate::Error::Cancelled). Clones
/// share the same cancellation state.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }

        // Waiters registering after this point observe the flag before parking.
        let waiting = mem::take(&mut self.inner.registry.lock().waiting);
        tracing::debug!(waiting = waiting.len(), "cancelling blocked waits");

        waiting
            .into_iter()
            .filter_map(|(_, target)| target.upgrade())
            .for_each(|target| target.interrupt());
    }

    pub(crate) fn register(&self, target: Weak<dyn Interrupt>) -> Registration<'_> {
        let mut registry = self.inner.registry.lock();
        let key = registry.next_key;
        registry.next_key += 1;
        registry.waiting.push((key, target));

        Registration { token: self, key }
    }
}

/// Unregisters a waiter from its token when the wait ends.
pub(crate) struct Registration<'a> {
    token: &'a CancelToken,
    key: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        let mut registry = self.token.inner.registry.lock();
        if let Some(index) = registry.waiting.iter().position(|(key, _)| *key == self.key) {
            registry.waiting.swap_remove(index);
        }
    }
}
