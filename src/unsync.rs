//! The buffering queue for callers that already have exclusive access.
//!
//! Same offers and polls as [`BufferingQueue`](crate::sync::BufferingQueue)
//! minus locking and blocking, for single threaded event loops and the like.

use crate::{
    buffer::Buffer,
    config::Config,
    delayed::{DelayedItem, Schedule},
    error::Result,
};
use std::{
    fmt,
    time::{Duration, Instant},
};

pub struct UnsyncBufferingQueue<T> {
    buffer: Buffer<T>,
}

impl<T> Default for UnsyncBufferingQueue<T> {
    fn default() -> Self {
        Self::with_schedule(Schedule::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for UnsyncBufferingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnsyncBufferingQueue")
            .field("schedule", self.buffer.schedule())
            .field("items", &self.buffer.heap().iter().collect::<Vec<_>>())
            .finish()
    }
}

impl<T> UnsyncBufferingQueue<T> {
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
        Self { buffer }
    }

    pub fn schedule(&self) -> Schedule {
        *self.buffer.schedule()
    }

    fn item(&self, payload: T) -> DelayedItem<T> {
        self.buffer.item(payload)
    }

    fn settle<R>(&mut self, result: R) -> R {
        // No one to wake.
        self.buffer.take_rescheduled();
        result
    }

    pub fn offer(&mut self, payload: T) -> bool {
        let item = self.item(payload);
        self.offer_item(item)
    }

    pub fn offer_with(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        DelayedItem::new(payload, delay, max_delay).map(|item| self.offer_item(item))
    }

    pub fn offer_item(&mut self, item: DelayedItem<T>) -> bool {
        self.buffer.offer(item);
        self.settle(true)
    }

    pub fn poll(&mut self) -> Option<T> {
        self.buffer.poll(Instant::now())
    }

    /// The head's payload, expired or not.
    pub fn peek(&self) -> Option<&T> {
        self.buffer.peek()
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.buffer.drain(Instant::now())
    }

    pub fn drain_to<E>(&mut self, target: &mut E, max: usize) -> usize
    where
        E: Extend<T> + ?Sized,
    {
        self.buffer.drain_to(Instant::now(), target, max)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn expired_len(&self) -> usize {
        self.buffer.expired_len(Instant::now())
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.buffer.next_deadline()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Queued payloads in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.buffer.heap().iter().map(DelayedItem::payload)
    }
}

impl<T: PartialEq> UnsyncBufferingQueue<T> {
    pub fn offer_if_absent(&mut self, payload: T) -> bool {
        let item = self.item(payload);
        let inserted = self.buffer.offer_if_absent(item);
        self.settle(inserted)
    }

    pub fn offer_if_absent_with(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        let inserted = self.buffer.offer_if_absent(item);
        Ok(self.settle(inserted))
    }

    pub fn offer_if_absent_else_reset(&mut self, payload: T) -> bool {
        let item = self.item(payload);
        let inserted = self.buffer.offer_if_absent_else_reset(item);
        self.settle(inserted)
    }

    pub fn offer_if_absent_else_reset_with(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        let inserted = self.buffer.offer_if_absent_else_reset(item);
        Ok(self.settle(inserted))
    }

    pub fn offer_all_if_absent_else_reset<I>(&mut self, payloads: I) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        let schedule = self.schedule();
        self.offer_all_scheduled(payloads, &schedule)
    }

    pub fn offer_all_if_absent_else_reset_with<I>(
        &mut self,
        payloads: I,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = T>,
    {
        let schedule = Schedule::new(delay, max_delay)?;
        Ok(self.offer_all_scheduled(payloads, &schedule))
    }

    fn offer_all_scheduled<I>(&mut self, payloads: I, schedule: &Schedule) -> bool
    where
        I: IntoIterator<Item = T>,
    {
        let items = payloads
            .into_iter()
            .map(|payload| DelayedItem::scheduled(payload, schedule));
        let inserted = self.buffer.offer_all_if_absent_else_reset(items);
        self.settle(inserted)
    }

    pub fn offer_or_replace(&mut self, payload: T) -> Option<T> {
        let item = self.item(payload);
        let replaced = self.buffer.offer_or_replace(item);
        self.settle(replaced)
    }

    pub fn offer_or_replace_with(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<Option<T>> {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        let replaced = self.buffer.offer_or_replace(item);
        Ok(self.settle(replaced))
    }

    pub fn offer_or_replace_and_reset(&mut self, payload: T) -> Option<T> {
        let item = self.item(payload);
        let replaced = self
            .buffer
            .offer_or_replace_and_transfer(item, |previous, item| item.inherit_schedule(previous));
        self.settle(replaced)
    }

    pub fn offer_or_replace_and_reset_with(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
    ) -> Result<Option<T>> {
        self.offer_or_replace_and_transfer(payload, delay, max_delay, |previous, item| {
            item.inherit_schedule(previous)
        })
    }

    pub fn offer_or_replace_and_transfer<F>(
        &mut self,
        payload: T,
        delay: Duration,
        max_delay: Option<Duration>,
        transfer: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce(&DelayedItem<T>, &mut DelayedItem<T>),
    {
        let item = DelayedItem::new(payload, delay, max_delay)?;
        let replaced = self.buffer.offer_or_replace_and_transfer(item, transfer);
        Ok(self.settle(replaced))
    }

    pub fn remove(&mut self, payload: &T) -> bool {
        self.buffer.remove(payload)
    }

    pub fn contains(&self, payload: &T) -> bool {
        self.buffer.contains(payload)
    }
}

impl<T: Clone> UnsyncBufferingQueue<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.buffer.snapshot()
    }

    pub fn copy_to_slice(&self, target: &mut [T]) -> Result<usize> {
        self.buffer.copy_to_slice(target)
    }
}

impl<T> IntoIterator for UnsyncBufferingQueue<T> {
    type Item = DelayedItem<T>;
    type IntoIter = std::vec::IntoIter<DelayedItem<T>>;

    /// Every item, expired or not, in no particular order.
    fn into_iter(self) -> Self::IntoIter {
        self.buffer.into_items().into_iter()
    }
}

impl<T> Extend<T> for UnsyncBufferingQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, payloads: I) {
        payloads.into_iter().for_each(|payload| {
            self.offer(payload);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::thread;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn concrete_delay_scenario() {
        let mut queue = UnsyncBufferingQueue::new(100 * MS, None).unwrap();
        queue.offer("a");

        assert_eq!(queue.poll(), None);
        thread::sleep(110 * MS);
        assert_eq!(queue.poll(), Some("a"));
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn drain_is_idempotent_when_nothing_expired() {
        let mut queue = UnsyncBufferingQueue::new(Duration::from_secs(60), None).unwrap();
        assert!(queue.drain().is_empty());

        queue.offer(1);
        queue.offer(2);
        assert!(queue.drain().is_empty());
        assert!(queue.drain().is_empty());
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.expired_len(), 0);
    }

    #[test]
    fn drain_orders_by_deadline() {
        let mut queue = UnsyncBufferingQueue::default();
        for (payload, millis) in [(4, 40), (1, 10), (3, 30), (2, 20)] {
            queue
                .offer_with(payload, Duration::from_millis(millis), None)
                .unwrap();
        }

        thread::sleep(50 * MS);
        assert_eq!(queue.drain(), vec![1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[test]
    fn reset_never_passes_cap() {
        let mut queue = UnsyncBufferingQueue::default();
        let start = Instant::now();
        for _ in 0..4 {
            queue
                .offer_if_absent_else_reset_with("x", 50 * MS, Some(200 * MS))
                .unwrap();
        }
        assert_eq!(queue.len(), 1);

        // Each reset is measured from now, not stacked on the old deadline.
        let deadline = queue.next_deadline().unwrap();
        assert!(deadline >= start + 50 * MS);
        assert!(deadline <= start + 60 * MS);

        let mut queue = UnsyncBufferingQueue::default();
        queue
            .offer_if_absent_else_reset_with("y", 150 * MS, Some(200 * MS))
            .unwrap();
        thread::sleep(100 * MS);

        // Uncapped this would land 150ms out.
        let inserted = queue
            .offer_if_absent_else_reset_with("y", 150 * MS, Some(200 * MS))
            .unwrap();
        assert!(!inserted);
        assert!(queue.next_deadline().unwrap() <= Instant::now() + 120 * MS);
    }

    #[test]
    fn repeated_resets_settle_on_max_deadline() {
        let mut queue = UnsyncBufferingQueue::default();
        queue
            .offer_if_absent_else_reset_with("z", 50 * MS, Some(150 * MS))
            .unwrap();

        for _ in 0..5 {
            thread::sleep(40 * MS);
            let inserted = queue
                .offer_if_absent_else_reset_with("z", 50 * MS, Some(150 * MS))
                .unwrap();
            assert!(!inserted);
        }

        let deadline = queue.next_deadline().unwrap();
        let item = queue.into_iter().next().unwrap();
        assert_eq!(item.max_deadline(), Some(deadline));
    }

    #[test]
    fn replace_returns_previous() {
        let mut queue = UnsyncBufferingQueue::default();
        queue.offer_with(String::from("p"), 10 * MS, None).unwrap();

        let replaced = queue
            .offer_or_replace_with(String::from("p"), 500 * MS, None)
            .unwrap();
        assert_eq!(replaced.as_deref(), Some("p"));
        assert_eq!(queue.len(), 1);

        thread::sleep(20 * MS);
        assert_eq!(queue.poll(), None);
    }

    #[test]
    fn replace_and_reset_continues_old_schedule() {
        let mut queue = UnsyncBufferingQueue::default();
        queue.offer_with(7, 300 * MS, Some(400 * MS)).unwrap();

        let replaced = queue.offer_or_replace_and_reset_with(7, MS, None).unwrap();
        assert_eq!(replaced, Some(7));

        let item = queue.into_iter().next().unwrap();
        assert_eq!(item.delay(), 300 * MS);
        assert!(item.max_deadline().is_some());
    }

    #[test]
    fn custom_transfer() {
        let mut queue = UnsyncBufferingQueue::default();
        queue.offer_with(1u8, Duration::from_secs(60), None).unwrap();

        let mut called = false;
        queue
            .offer_or_replace_and_transfer(1, MS, None, |previous, _| {
                called = previous.delay() == Duration::from_secs(60);
            })
            .unwrap();
        assert!(called);

        queue
            .offer_or_replace_and_transfer(2, MS, None, |_, _| unreachable!())
            .unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn invalid_schedules_surface_at_call() {
        let mut queue = UnsyncBufferingQueue::<u8>::default();
        let err = queue.offer_with(1, 20 * MS, Some(10 * MS)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(queue
            .offer_all_if_absent_else_reset_with(vec![1, 2], 20 * MS, Some(10 * MS))
            .is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn extend_and_views() {
        let mut queue = UnsyncBufferingQueue::new(Duration::from_secs(60), None).unwrap();
        queue.extend(vec![3, 1, 2]);
        assert!(!queue.offer_if_absent(1));
        assert!(queue.offer_all_if_absent_else_reset(vec![1, 4]));

        let mut seen: Vec<_> = queue.iter().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4]);
        assert_eq!(queue.peek(), Some(&3));

        assert!(queue.remove(&3));
        assert!(!queue.contains(&3));
        assert_eq!(queue.to_vec().len(), 3);

        queue.clear();
        assert!(queue.is_empty());
    }
}
