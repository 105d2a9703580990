use crate::{
    delayed::{DelayedItem, Schedule},
    error::{Error, Result},
    heap::DelayHeap,
};
use std::{mem, time::Instant};

/// The offer, poll and drain semantics shared by both queue flavours.
///
/// `rescheduled` latches whenever an insertion lands at the head of the
/// heap. The synchronized queue consumes it to invalidate its leader and
/// wake a waiter; the unsynchronized queue just clears it.
pub(crate) struct Buffer<T> {
    heap: DelayHeap<T>,
    schedule: Schedule,
    rescheduled: bool,
}

impl<T> Buffer<T> {
    pub fn new(schedule: Schedule, capacity: usize) -> Self {
        Self {
            heap: DelayHeap::with_capacity(capacity),
            schedule,
            rescheduled: false,
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn item(&self, payload: T) -> DelayedItem<T> {
        DelayedItem::scheduled(payload, &self.schedule)
    }

    pub fn take_rescheduled(&mut self) -> bool {
        mem::replace(&mut self.rescheduled, false)
    }

    fn insert(&mut self, item: DelayedItem<T>) {
        if self.heap.push(item) {
            self.rescheduled = true;
        }
    }

    pub fn heap(&self) -> &DelayHeap<T> {
        &self.heap
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn offer(&mut self, item: DelayedItem<T>) {
        self.insert(item);
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(DelayedItem::payload)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.heap.peek().map(DelayedItem::deadline)
    }

    pub fn pop_expired(&mut self, now: Instant) -> Option<DelayedItem<T>> {
        self.heap.pop_expired(now)
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        self.pop_expired(now).map(DelayedItem::into_payload)
    }

    pub fn expired_len(&self, now: Instant) -> usize {
        self.heap.iter().filter(|item| item.is_expired_at(now)).count()
    }

    pub fn drain_to<E>(&mut self, now: Instant, target: &mut E, max: usize) -> usize
    where
        E: Extend<T> + ?Sized,
    {
        let mut drained = 0;
        while drained < max {
            match self.heap.pop_expired(now) {
                Some(item) => target.extend(Some(item.into_payload())),
                None => break,
            }
            drained += 1;
        }
        drained
    }

    pub fn drain(&mut self, now: Instant) -> Vec<T> {
        let mut drained = Vec::new();
        self.drain_to(now, &mut drained, usize::MAX);
        drained
    }

    pub fn into_items(mut self) -> Vec<DelayedItem<T>> {
        self.heap.take_all()
    }
}

impl<T: PartialEq> Buffer<T> {
    fn find(&self, payload: &T) -> Option<usize> {
        self.heap.position(|item| item.payload() == payload)
    }

    pub fn contains(&self, payload: &T) -> bool {
        self.find(payload).is_some()
    }

    pub fn remove(&mut self, payload: &T) -> bool {
        self.find(payload)
            .map(|index| self.heap.remove(index))
            .is_some()
    }

    pub fn offer_if_absent(&mut self, item: DelayedItem<T>) -> bool {
        if self.contains(item.payload()) {
            return false;
        }

        self.insert(item);
        true
    }

    /// Reset the queued twin of `item` on its own schedule, or insert `item`.
    pub fn offer_if_absent_else_reset(&mut self, item: DelayedItem<T>) -> bool {
        let index = match self.find(item.payload()) {
            Some(index) => index,
            None => {
                self.insert(item);
                return true;
            }
        };

        let mut existing = self.heap.remove(index);
        existing.reset();
        tracing::debug!(deadline = ?existing.deadline(), "reset buffered item");
        self.insert(existing);
        false
    }

    pub fn offer_all_if_absent_else_reset<I>(&mut self, items: I) -> bool
    where
        I: IntoIterator<Item = DelayedItem<T>>,
    {
        let mut inserted = false;
        for item in items {
            inserted |= self.offer_if_absent_else_reset(item);
        }
        inserted
    }

    pub fn offer_or_replace(&mut self, item: DelayedItem<T>) -> Option<T> {
        self.offer_or_replace_and_transfer(item, |_, _| {})
    }

    /// Replace the queued twin of `item`, letting `transfer` carry state
    /// from the old item over to `item` before it is inserted.
    pub fn offer_or_replace_and_transfer<F>(
        &mut self,
        mut item: DelayedItem<T>,
        transfer: F,
    ) -> Option<T>
    where
        F: FnOnce(&DelayedItem<T>, &mut DelayedItem<T>),
    {
        let previous = self
            .find(item.payload())
            .map(|index| self.heap.remove(index));

        if let Some(previous) = &previous {
            transfer(previous, &mut item);
            tracing::debug!(deadline = ?item.deadline(), "replaced buffered item");
        }

        self.insert(item);
        previous.map(DelayedItem::into_payload)
    }
}

impl<T: Clone> Buffer<T> {
    pub fn snapshot(&self) -> Vec<T> {
        self.heap.iter().map(|item| item.payload().clone()).collect()
    }

    pub fn copy_to_slice(&self, target: &mut [T]) -> Result<usize> {
        if target.len() < self.len() {
            return Err(Error::OutOfBounds {
                index: self.len() - 1,
                len: target.len(),
            });
        }

        for (slot, item) in target.iter_mut().zip(self.heap.iter()) {
            *slot = item.payload().clone();
        }
        Ok(self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const MS: Duration = Duration::from_millis(1);

    fn buffer(delay: Duration) -> Buffer<&'static str> {
        Buffer::new(Schedule::new(delay, None).unwrap(), 0)
    }

    fn item<T>(payload: T, delay: Duration, max: Option<Duration>) -> DelayedItem<T> {
        DelayedItem::new(payload, delay, max).unwrap()
    }

    #[test]
    fn poll_gates_on_deadline() {
        let mut buffer = buffer(100 * MS);
        let start = Instant::now();
        buffer.offer(buffer.item("a"));

        assert_eq!(buffer.poll(start), None);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.poll(start + 150 * MS), Some("a"));
        assert_eq!(buffer.poll(start + 150 * MS), None);
    }

    #[test]
    fn rescheduled_latches_on_new_head() {
        let mut buffer = buffer(MS);
        buffer.offer(item("far", 500 * MS, None));
        assert!(buffer.take_rescheduled());
        assert!(!buffer.take_rescheduled());

        buffer.offer(item("farther", 900 * MS, None));
        assert!(!buffer.take_rescheduled());

        buffer.offer(item("near", 10 * MS, None));
        assert!(buffer.take_rescheduled());
        assert_eq!(buffer.peek(), Some(&"near"));
    }

    #[test]
    fn if_absent_ignores_duplicates() {
        let mut buffer = buffer(MS);
        assert!(buffer.offer_if_absent(item("a", 10 * MS, None)));
        assert!(!buffer.offer_if_absent(item("a", Duration::ZERO, None)));
        assert!(buffer.offer_if_absent(item("b", 10 * MS, None)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn else_reset_keeps_existing_schedule() {
        let mut buffer = buffer(MS);
        assert!(buffer.offer_if_absent_else_reset(item("x", 50 * MS, Some(200 * MS))));
        let first = buffer.heap().peek().unwrap().max_deadline().unwrap();

        for _ in 0..3 {
            assert!(!buffer.offer_if_absent_else_reset(item("x", 5 * MS, None)));
        }

        assert_eq!(buffer.len(), 1);
        let head = buffer.heap().peek().unwrap();
        assert_eq!(head.delay(), 50 * MS);
        assert_eq!(head.max_deadline(), Some(first));
        assert!(head.deadline() <= first);
    }

    #[test]
    fn batch_reset_reports_inserts() {
        let mut buffer = buffer(MS);
        buffer.offer(item("a", 10 * MS, None));

        let batch = vec![item("a", 10 * MS, None)];
        assert!(!buffer.offer_all_if_absent_else_reset(batch));

        let batch = vec![item("a", 10 * MS, None), item("b", 10 * MS, None)];
        assert!(buffer.offer_all_if_absent_else_reset(batch));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn replace_uses_new_schedule() {
        let mut buffer = buffer(MS);
        buffer.offer(item("r", 10 * MS, None));

        let replaced = buffer.offer_or_replace(item("r", 300 * MS, None));
        assert_eq!(replaced, Some("r"));
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.heap().peek().unwrap().delay(), 300 * MS);

        assert_eq!(buffer.offer_or_replace(item("s", 10 * MS, None)), None);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn replace_and_transfer_inherits() {
        let mut buffer = buffer(MS);
        buffer.offer(item("t", 40 * MS, Some(80 * MS)));
        let cap = buffer.heap().peek().unwrap().max_deadline();

        let replaced =
            buffer.offer_or_replace_and_transfer(item("t", 5 * MS, None), |old, new| {
                new.inherit_schedule(old)
            });
        assert_eq!(replaced, Some("t"));

        let head = buffer.heap().peek().unwrap();
        assert_eq!(head.delay(), 40 * MS);
        assert_eq!(head.max_deadline(), cap);
    }

    #[test]
    fn drain_takes_only_expired_in_order() {
        let mut buffer = Buffer::new(Schedule::default(), 4);
        let start = Instant::now();
        for (payload, millis) in [(3u8, 30), (1, 10), (9, 900), (2, 20)] {
            buffer.offer(DelayedItem::scheduled_at(
                payload,
                &Schedule::new(Duration::from_millis(millis), None).unwrap(),
                start,
            ));
        }

        assert!(buffer.drain(start).is_empty());
        assert_eq!(buffer.len(), 4);

        let mut out = Vec::new();
        assert_eq!(buffer.drain_to(start + 50 * MS, &mut out, 2), 2);
        assert_eq!(out, vec![1, 2]);
        assert_eq!(buffer.drain(start + 50 * MS), vec![3]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.expired_len(start + 50 * MS), 0);
    }

    #[test]
    fn copy_to_slice_checks_length() {
        let mut buffer = buffer(MS);
        buffer.offer(buffer.item("a"));
        buffer.offer(buffer.item("b"));

        let mut small = [""; 1];
        assert_eq!(
            buffer.copy_to_slice(&mut small),
            Err(Error::OutOfBounds { index: 1, len: 1 })
        );

        let mut large = [""; 3];
        assert_eq!(buffer.copy_to_slice(&mut large), Ok(2));
        let mut copied = large[..2].to_vec();
        copied.sort_unstable();
        assert_eq!(copied, vec!["a", "b"]);
    }

    #[test]
    fn remove_and_contains() {
        let mut buffer = buffer(500 * MS);
        buffer.offer(buffer.item("a"));
        assert!(buffer.contains(&"a"));
        assert!(buffer.remove(&"a"));
        assert!(!buffer.remove(&"a"));
        assert!(buffer.is_empty());
    }

    mod logging {
        use super::*;
        use parking_lot::Mutex;
        use std::sync::Arc;
        use tracing::{
            span::{Attributes, Id, Record},
            Event, Level, Metadata, Subscriber,
        };

        #[derive(Clone, Default)]
        struct Levels(Arc<Mutex<Vec<Level>>>);

        impl Subscriber for Levels {
            fn enabled(&self, _: &Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, _: &Attributes<'_>) -> Id {
                Id::from_u64(1)
            }
            fn record(&self, _: &Id, _: &Record<'_>) {}
            fn record_follows_from(&self, _: &Id, _: &Id) {}
            fn event(&self, event: &Event<'_>) {
                self.0.lock().push(*event.metadata().level());
            }
            fn enter(&self, _: &Id) {}
            fn exit(&self, _: &Id) {}
        }

        #[test]
        fn resets_and_replacements_log_at_debug() {
            let levels = Levels::default();
            tracing::subscriber::with_default(levels.clone(), || {
                let mut buffer = buffer(50 * MS);
                buffer.offer_if_absent_else_reset(buffer.item("a"));
                buffer.offer_if_absent_else_reset(buffer.item("a"));
                buffer.offer_or_replace(buffer.item("a"));
            });

            assert_eq!(*levels.0.lock(), vec![Level::DEBUG, Level::DEBUG]);
        }
    }
}
