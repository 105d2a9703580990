//! A token bucket where every permit refills on its own clock.
//!
//! The limiter keeps a fixed pool of tokens in a delay heap. Acquiring
//! pops an expired token and schedules its replacement `time_frame` later,
//! so each permit becomes available again exactly one time frame after it
//! was consumed instead of on a shared refill tick.

use crate::{
    buffer::Buffer,
    delayed::{DelayedItem, Schedule},
    error::{Error, Result},
    sync::{CancelToken, Shared},
};
use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    immediate: bool,
}

impl Token {
    /// True for the tokens the pool was seeded with.
    pub fn is_immediate(&self) -> bool {
        self.immediate
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared<Token>>,
    permits: usize,
    time_frame: Duration,
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("permits", &self.permits)
            .field("time_frame", &self.time_frame)
            .field("available", &self.available())
            .finish()
    }
}

impl RateLimiter {
    /// Allow at most `permits` acquisitions in any window of `time_frame`.
    pub fn new(permits: usize, time_frame: Duration) -> Result<Self> {
        if permits == 0 {
            return Err(Error::invalid("permits must be positive"));
        }
        if time_frame.is_zero() {
            return Err(Error::invalid("time frame must be positive"));
        }

        let schedule = Schedule::new(time_frame, None)?;
        let mut buffer = Buffer::new(schedule, permits);
        for _ in 0..permits {
            buffer.offer(DelayedItem::immediate(Token { immediate: true }));
        }
        buffer.take_rescheduled();

        tracing::debug!(permits, ?time_frame, "created rate limiter");
        Ok(Self {
            shared: Arc::new(Shared::new(buffer)),
            permits,
            time_frame,
        })
    }

    pub fn permits(&self) -> usize {
        self.permits
    }

    pub fn time_frame(&self) -> Duration {
        self.time_frame
    }

    /// Number of permits that could be acquired right now.
    pub fn available(&self) -> usize {
        self.shared.lock().buffer.expired_len(Instant::now())
    }

    /// Check for a permit without consuming it.
    pub fn can_acquire(&self) -> bool {
        let state = self.shared.lock();
        state
            .buffer
            .next_deadline()
            .map_or(false, |deadline| deadline <= Instant::now())
    }

    pub fn try_acquire(&self) -> bool {
        self.shared.with(|buffer| match buffer.pop_expired(Instant::now()) {
            Some(_) => {
                let token = buffer.item(Token { immediate: false });
                buffer.offer(token);
                true
            }
            None => false,
        })
    }

    /// Block until a permit is available.
    pub fn acquire(&self) {
        match self.acquire_until(None, None) {
            Ok(true) => {}
            _ => unreachable!("untimed and uncancellable acquire gave up"),
        }
    }

    pub fn try_acquire_for(&self, timeout: Duration) -> bool {
        match self.acquire_until(Instant::now().checked_add(timeout), None) {
            Ok(acquired) => acquired,
            Err(_) => unreachable!("uncancellable acquire was cancelled"),
        }
    }

    pub fn acquire_with(&self, cancel: &CancelToken) -> Result<()> {
        let _registration = self.shared.register(cancel);
        self.acquire_until(None, Some(cancel)).map(drop)
    }

    pub fn try_acquire_for_with(&self, timeout: Duration, cancel: &CancelToken) -> Result<bool> {
        let _registration = self.shared.register(cancel);
        self.acquire_until(Instant::now().checked_add(timeout), Some(cancel))
    }

    fn acquire_until(&self, until: Option<Instant>, cancel: Option<&CancelToken>) -> Result<bool> {
        let mut state = self.shared.lock();
        if self.shared.wait_pop(&mut state, until, cancel)?.is_none() {
            return Ok(false);
        }

        let token = state.buffer.item(Token { immediate: false });
        state.buffer.offer(token);
        self.shared.publish(&mut state);
        Ok(true)
    }

    #[cfg(feature = "future")]
    pub async fn acquire_async(&self) {
        if self.shared.wait_pop_async(None).await.is_none() {
            unreachable!("untimed acquire gave up");
        }

        self.shared.with(|buffer| {
            let token = buffer.item(Token { immediate: false });
            buffer.offer(token);
        });
    }
}
