use super::{
    cancel::{CancelToken, Interrupt, Registration},
    leader::Leader,
};
use crate::{
    buffer::Buffer,
    delayed::DelayedItem,
    error::{Error, Result},
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    sync::{Arc, Weak},
    time::Instant,
};

pub(crate) struct State<T> {
    pub buffer: Buffer<T>,
    leader: Leader,
}

/// A [`Buffer`] behind a lock, plus the leader/follower machinery for
/// consumers blocking on the next deadline.
pub(crate) struct Shared<T> {
    state: Mutex<State<T>>,
    available: Condvar,
    #[cfg(feature = "future")]
    notify: tokio::sync::Notify,
}

impl<T: Send> Interrupt for Shared<T> {
    fn interrupt(&self) {
        let _state = self.state.lock();
        self.available.notify_all();
    }
}

impl<T> Shared<T> {
    pub fn new(buffer: Buffer<T>) -> Self {
        Self {
            state: Mutex::new(State {
                buffer,
                leader: Leader::default(),
            }),
            available: Condvar::new(),
            #[cfg(feature = "future")]
            notify: tokio::sync::Notify::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock()
    }

    /// Run `f` on the buffer and wake consumers if it changed the head.
    pub fn with<R>(&self, f: impl FnOnce(&mut Buffer<T>) -> R) -> R {
        let mut state = self.lock();
        let result = f(&mut state.buffer);
        self.publish(&mut state);
        result
    }

    /// A new head may expire sooner than whatever the leader is sleeping
    /// towards, so the leader is deposed and one waiter re-evaluates.
    pub fn publish(&self, state: &mut State<T>) {
        if !state.buffer.take_rescheduled() {
            return;
        }

        state.leader.clear();
        self.available.notify_one();

        #[cfg(feature = "future")]
        self.notify.notify_waiters();
    }

    /// Block until an item expires, `until` passes or `cancel` fires.
    ///
    /// `cancel` only takes effect if it was also registered with
    /// [`register`](Self::register) so that `cancel()` can wake us.
    pub fn wait_pop(
        &self,
        state: &mut MutexGuard<'_, State<T>>,
        until: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<DelayedItem<T>>> {
        let popped = self.wait_pop_inner(state, until, cancel);

        // Whoever leaves hands the baton on so the next head still gets a
        // timed waiter.
        if state.leader.is_vacant() && !state.buffer.is_empty() {
            self.available.notify_one();
        }

        popped
    }

    fn wait_pop_inner(
        &self,
        state: &mut MutexGuard<'_, State<T>>,
        until: Option<Instant>,
        cancel: Option<&CancelToken>,
    ) -> Result<Option<DelayedItem<T>>> {
        loop {
            if cancel.map_or(false, CancelToken::is_cancelled) {
                tracing::debug!("blocking wait cancelled");
                return Err(Error::Cancelled);
            }

            let now = Instant::now();
            if let Some(item) = state.buffer.pop_expired(now) {
                return Ok(Some(item));
            }

            if until.map_or(false, |until| until <= now) {
                return Ok(None);
            }

            let head = state.buffer.next_deadline();
            match head {
                Some(deadline)
                    if state.leader.is_vacant()
                        && until.map_or(true, |until| deadline <= until) =>
                {
                    let id = state.leader.claim();
                    tracing::trace!(wait = ?deadline.saturating_duration_since(now), "leading wait");

                    self.available.wait_until(state, deadline);
                    state.leader.release(id);
                }
                _ => match until {
                    Some(until) => {
                        self.available.wait_until(state, until);
                    }
                    None => self.available.wait(state),
                },
            }
        }
    }

    /// Async counterpart of [`wait_pop`](Self::wait_pop): a single timer
    /// for the earlier of the head deadline and `until`, raced against
    /// head changes. Dropping the future is cancellation.
    #[cfg(feature = "future")]
    pub async fn wait_pop_async(&self, until: Option<Instant>) -> Option<DelayedItem<T>> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let wake_at = {
                let mut state = self.lock();
                let now = Instant::now();
                if let Some(item) = state.buffer.pop_expired(now) {
                    if state.leader.is_vacant() && !state.buffer.is_empty() {
                        self.available.notify_one();
                    }
                    return Some(item);
                }

                if until.map_or(false, |until| until <= now) {
                    return None;
                }

                match (state.buffer.next_deadline(), until) {
                    (Some(deadline), Some(until)) => Some(deadline.min(until)),
                    (deadline, until) => deadline.or(until),
                }
            };

            match wake_at {
                Some(wake_at) => tokio::select! {
                    _ = notified.as_mut() => {}
                    _ = tokio::time::sleep_until(wake_at.into()) => {}
                },
                None => notified.await,
            }
        }
    }
}

impl<T: Send + 'static> Shared<T> {
    pub fn register<'a>(self: &Arc<Self>, cancel: &'a CancelToken) -> Registration<'a> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let target: Weak<dyn Interrupt> = weak;
        cancel.register(target)
    }
}
