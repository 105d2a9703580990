//! Items that only become visible once their deadline has passed.

use crate::error::{Error, Result};
use std::{
    fmt,
    time::{Duration, Instant},
};

// Stand-in for "never" when `now + delay` does not fit in an Instant.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

pub(crate) fn deadline_after(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay).unwrap_or_else(|| now + FAR_FUTURE)
}

/// A validated `(delay, max_delay)` pair.
///
/// `max_delay` bounds how far resets may push an item's deadline, measured
/// from the moment the item was first created. `None` or a zero duration
/// leaves resets unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    delay: Duration,
    max_delay: Option<Duration>,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            max_delay: None,
        }
    }
}

impl Schedule {
    pub fn new(delay: Duration, max_delay: Option<Duration>) -> Result<Self> {
        let max_delay = max_delay.filter(|max| !max.is_zero());
        if let Some(max_delay) = max_delay {
            if delay > max_delay {
                return Err(Error::delay_exceeds_max(delay, max_delay));
            }
        }

        Ok(Self { delay, max_delay })
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_delay(&self) -> Option<Duration> {
        self.max_delay
    }
}

/// A payload paired with the instant it becomes visible to consumers.
///
/// Equality delegates to the payload alone. Two items holding equal payloads
/// are "the same logical item" no matter their deadlines, which is what the
/// `*_if_absent` and `*_or_replace` offers rely on. Ordering by deadline is
/// done by the heap and intentionally not exposed as `Ord`.
pub struct DelayedItem<T> {
    payload: T,
    deadline: Instant,
    delay: Duration,
    max_deadline: Option<Instant>,
}

impl<T> DelayedItem<T> {
    pub fn new(payload: T, delay: Duration, max_delay: Option<Duration>) -> Result<Self> {
        let schedule = Schedule::new(delay, max_delay)?;
        Ok(Self::scheduled(payload, &schedule))
    }

    pub fn scheduled(payload: T, schedule: &Schedule) -> Self {
        Self::scheduled_at(payload, schedule, Instant::now())
    }

    pub(crate) fn scheduled_at(payload: T, schedule: &Schedule, now: Instant) -> Self {
        Self {
            payload,
            deadline: deadline_after(now, schedule.delay),
            delay: schedule.delay,
            max_deadline: schedule.max_delay.map(|max| deadline_after(now, max)),
        }
    }

    /// An item that is already expired and carries no delay.
    pub fn immediate(payload: T) -> Self {
        Self {
            payload,
            deadline: Instant::now(),
            delay: Duration::ZERO,
            max_deadline: None,
        }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn max_deadline(&self) -> Option<Instant> {
        self.max_deadline
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn remaining_at(&self, now: Instant) -> Duration {
        self.deadline.saturating_duration_since(now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.deadline <= now
    }

    /// Push the deadline to `now + delay`, never past the max deadline.
    pub fn reset(&mut self) {
        self.reset_at(Instant::now())
    }

    pub fn reset_at(&mut self, now: Instant) {
        let deadline = deadline_after(now, self.delay);
        self.deadline = match self.max_deadline {
            Some(max_deadline) => deadline.min(max_deadline),
            None => deadline,
        };
    }

    /// Continue `previous`'s buffering schedule: take over its delay and
    /// max deadline, then reset.
    pub fn inherit_schedule(&mut self, previous: &DelayedItem<T>) {
        self.delay = previous.delay;
        self.max_deadline = previous.max_deadline;
        self.reset();
    }
}

impl<T: PartialEq> PartialEq for DelayedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl<T: fmt::Debug> fmt::Debug for DelayedItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelayedItem")
            .field("payload", &self.payload)
            .field("remaining", &self.remaining())
            .field("delay", &self.delay)
            .field("bounded", &self.max_deadline.is_some())
            .finish()
    }
}
