use super::{cancel::CancelToken, shared::Shared};
use crate::{
    buffer::Buffer,
    config::Config,
    delayed::{DelayedItem, Schedule},
    error::{Error, Result},
};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

/// A thread-safe queue that only hands out items once their delay elapses.
///
/// Cloning produces another handle to the same queue. Items are ordered by
/// deadline; equal deadlines come out in insertion order. Offers that look
/// for an existing item (`*_if_absent*`, `*_or_replace*`, [`remove`]) compare
/// payloads with `PartialEq` in a linear scan.
///
/// Consumers blocked in [`take`] and [`poll_timeout`] coordinate through a
/// leader/follower protocol: one thread sleeps until the head's deadline,
/// the others park until signalled.
///
/// [`remove`]: Self::remove
/// [`take`]: Self::take
/// [`poll_timeout`]: Self::poll_timeout
pub struct BufferingQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for BufferingQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Default for BufferingQueue<T> {
    fn default() -> Self {
        Self::with_schedule(Schedule::default())
    }
}

impl<T> fmt::Debug for BufferingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("BufferingQueue")
            .field("len", &state.buffer.len())
            .field("schedule", state.buffer.schedule())
            .finish()
    }
}

impl<T> BufferingQueue<T> {
    /// Create a queue whose plain offers use `delay` and `max_delay`.
    pub fn new(delay: Duration, max_delay: Option<Duration>) -> Result<Self> {
        Schedule::new(delay, max_delay).map(Self::with_schedule)
    }

    pub fn with_schedule(schedule: Schedule) -> Self {
        Self::from_buffer(Buffer::new(schedule, 0))
    }

    pub fn builder() -> Config {
        Config::new()
    }

    pub(crate) fn from_buffer(buffer: Buffer<T>) -> Self {
        tracing::debug!(schedule = ?buffer.schedule(), "created buffering queue");
        Self {
            shared: Arc::new(Shared::new(buffer)),
        }
    }

    pub fn schedule(&self) -> Schedule {
        *self.shared.lock().buffer.schedule()
    }

    /// Insert `payload` on the default schedule. Always succeeds.
    pub fn offer(&self, payload: T) -> bool {
        self.shared.with(|buffer| {
            let item = buffer.item(payload);
            buffer.offer(item)
        });
        true
    }

    pub fn offer_with(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        DelayedItem::new(payload, delay, max_delay).map(|item| self.offer_item(item))
    }

    pub fn offer_item(&self, item: DelayedItem<T>) -> bool {
        self.shared.with(|buffer| buffer.offer(item));
        true
    }

    /// Take the head if its deadline has passed.
    pub fn poll(&self) -> Option<T> {
        self.shared.with(|buffer| buffer.poll(Instant::now()))
    }

    /// Block until an item expires.
    pub fn take(&self) -> T {
        let mut state = self.shared.lock();
        match self.shared.wait_pop(&mut state, None, None) {
            Ok(Some(item)) => item.into_payload(),
            _ => unreachable!("untimed and uncancellable wait returned empty"),
        }
    }

    /// Block up to `timeout` for an item to expire.
    pub fn poll_timeout(&self, timeout: Duration) -> Option<T> {
        let until = deadline_in(timeout);
        let mut state = self.shared.lock();
        match self.shared.wait_pop(&mut state, until, None) {
            Ok(item) => item.map(DelayedItem::into_payload),
            Err(_) => unreachable!("uncancellable wait was cancelled"),
        }
    }

    /// Pop every expired item, earliest deadline first.
    pub fn drain(&self) -> Vec<T> {
        self.shared.with(|buffer| buffer.drain(Instant::now()))
    }

    /// Move up to `max` expired items into `target`, returning how many moved.
    pub fn drain_to<E>(&self, target: &mut E, max: usize) -> usize
    where
        E: Extend<T> + ?Sized,
    {
        self.shared
            .with(|buffer| buffer.drain_to(Instant::now(), target, max))
    }

    /// Move up to `max` expired items into another queue, where they are
    /// offered on that queue's default schedule.
    ///
    /// Fails with [`Error::InvalidArgument`] when `target` is a handle to
    /// this same queue.
    pub fn transfer_to(&self, target: &BufferingQueue<T>, max: usize) -> Result<usize> {
        if Arc::ptr_eq(&self.shared, &target.shared) {
            return Err(Error::invalid("cannot drain a queue into itself"));
        }

        let mut drained = Vec::new();
        self.drain_to(&mut drained, max);

        let count = drained.len();
        target.shared.with(|buffer| {
            for payload in drained {
                let item = buffer.item(payload);
                buffer.offer(item);
            }
        });
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.lock().buffer.is_empty()
    }

    /// Number of items whose deadline has already passed.
    pub fn expired_len(&self) -> usize {
        self.shared.lock().buffer.expired_len(Instant::now())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.shared.lock().buffer.next_deadline()
    }

    pub fn clear(&self) {
        self.shared.with(Buffer::clear)
    }
}

impl<T: PartialEq> BufferingQueue<T> {
    pub fn offer_if_absent(&self, payload: T) -> bool {
        self.shared.with(|buffer| {
            let item = buffer.item(payload);
            buffer.offer_if_absent(item)
        })
    }

    pub fn offer_if_absent_with(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        Ok(self.shared.with(|buffer| buffer.offer_if_absent(item)))
    }

    /// Insert `payload`, or reset the deadline of the equal item already
    /// queued. Returns true only if a new item was inserted.
    pub fn offer_if_absent_else_reset(&self, payload: T) -> bool {
        self.shared.with(|buffer| {
            let item = buffer.item(payload);
            buffer.offer_if_absent_else_reset(item)
        })
    }

    pub fn offer_if_absent_else_reset_with(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        Ok(self
            .shared
            .with(|buffer| buffer.offer_if_absent_else_reset(item)))
    }

    /// Batch form of [`offer_if_absent_else_reset`](Self::offer_if_absent_else_reset)
    /// done under a single lock. Returns true if at least one item was inserted.
    pub fn offer_all_if_absent_else_reset<I>(&self, payloads: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        self.shared.with(|buffer| {
            let schedule = *buffer.schedule();
            let items = payloads
                .into_iter()
                .map(|payload| DelayedItem::scheduled(payload, &schedule));
            buffer.offer_all_if_absent_else_reset(items)
        })
    }

    pub fn offer_all_if_absent_else_reset_with<I>(
        &self,
        payloads: I,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
    {
        let schedule = Schedule::new(delay, max_delay)?;
        let items: Vec<_> = payloads
            .into_iter()
            .map(|payload| DelayedItem::scheduled(payload, &schedule))
            .collect();

        Ok(self
            .shared
            .with(|buffer| buffer.offer_all_if_absent_else_reset(items)))
    }

    /// Insert `payload` on a fresh schedule, evicting and returning an equal
    /// payload that was already queued.
    pub fn offer_or_replace(&self, payload: T) -> Option<T> {
        self.shared.with(|buffer| {
            let item = buffer.item(payload);
            buffer.offer_or_replace(item)
        })
    }

    pub fn offer_or_replace_with(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<Option<T>> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        Ok(self.shared.with(|buffer| buffer.offer_or_replace(item)))
    }

    /// Like [`offer_or_replace`](Self::offer_or_replace), but the new payload
    /// continues the evicted item's schedule.
    pub fn offer_or_replace_and_reset(&self, payload: T) -> Option<T> {
        self.shared.with(|buffer| {
            let item = buffer.item(payload);
            buffer.offer_or_replace_and_transfer(item, |previous, item| {
                item.inherit_schedule(previous)
            })
        })
    }

    pub fn offer_or_replace_and_reset_with(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<Option<T>> {
        self.offer_or_replace_and_transfer(payload, delay, max_delay, |previous, item| {
            item.inherit_schedule(previous)
        })
    }

    /// Replace an equal queued payload, letting `transfer` carry whatever it
    /// wants from the evicted item over to the new one. `transfer` runs under
    /// the queue lock and only when there is something to replace.
    pub fn offer_or_replace_and_transfer<F>(
        &self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
        transfer: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&DelayedItem<T>, &mut DelayedItem<T>),
    {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        Ok(self
            .shared
            .with(|buffer| buffer.offer_or_replace_and_transfer(item, transfer)))
    }

    /// Remove one queued item equal to `payload`, expired or not.
    pub fn remove(&self, payload: &T) -> bool {
        self.shared.with(|buffer| buffer.remove(payload))
    }

    pub fn contains(&self, payload: &T) -> bool {
        self.shared.lock().buffer.contains(payload)
    }
}

impl<T: Clone> BufferingQueue<T> {
    /// The head's payload, expired or not.
    pub fn peek(&self) -> Option<T> {
        self.shared.lock().buffer.peek().cloned()
    }

    /// Every queued payload, in no particular order.
    pub fn to_vec(&self) -> Vec<T> {
        self.shared.lock().buffer.snapshot()
    }

    /// Copy every queued payload into the front of `target`.
    ///
    /// Fails with [`Error::OutOfBounds`] if `target` is shorter than the queue.
    pub fn copy_to_slice(&self, target: &mut [T]) -> Result<usize> {
        self.shared.lock().buffer.copy_to_slice(target)
    }

    /// A snapshot iterator. Never observes later mutations.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.to_vec().into_iter()
    }
}

impl<'a, T: Clone> IntoIterator for &'a BufferingQueue<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: Send + 'static> BufferingQueue<T> {
    /// [`take`](Self::take), aborted with [`Error::Cancelled`] once `cancel` fires.
    pub fn take_with(&self, cancel: &CancelToken) -> Result<T> {
        let _registration = self.shared.register(cancel);
        let mut state = self.shared.lock();
        match self.shared.wait_pop(&mut state, None, Some(cancel))? {
            Some(item) => Ok(item.into_payload()),
            None => unreachable!("untimed wait returned empty"),
        }
    }

    /// [`poll_timeout`](Self::poll_timeout), aborted with
    /// [`Error::Cancelled`] once `cancel` fires.
    pub fn poll_timeout_with(&self, timeout: Duration, cancel: &CancelToken) -> Result<Option<T>> {
        let until = deadline_in(timeout);
        let _registration = self.shared.register(cancel);
        let mut state = self.shared.lock();
        self.shared
            .wait_pop(&mut state, until, Some(cancel))
            .map(|item| item.map(DelayedItem::into_payload))
    }
}

#[cfg(feature = "future")]
impl<T> BufferingQueue<T> {
    /// Wait asynchronously for an item to expire.
    pub async fn take_async(&self) -> T {
        match self.shared.wait_pop_async(None).await {
            Some(item) => item.into_payload(),
            None => unreachable!("untimed wait returned empty"),
        }
    }

    pub async fn poll_timeout_async(&self, timeout: Duration) -> Option<T> {
        self.shared
            .wait_pop_async(deadline_in(timeout))
            .await
            .map(DelayedItem::into_payload)
    }
}

// Overflowing timeouts wait forever.
fn deadline_in(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
