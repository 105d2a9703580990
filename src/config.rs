use crate::{
    buffer::Buffer,
    delayed::Schedule,
    error::Result,
    sync::BufferingQueue,
    unsync::UnsyncBufferingQueue,
};
use std::time::Duration;

/// Builder for both queue flavours.
///
/// ```
/// use std::time::Duration;
///
/// let queue = delaybuf::Config::new()
///     .delay(Duration::from_millis(50))
///     .max_delay(Duration::from_secs(1))
///     .build::<u32>()
///     .unwrap();
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Config {
    delay: Duration,
    max_delay: Option<Duration>,
    capacity: usize,
}

impl Config {
    pub const fn new() -> Self {
        Self {
            delay: Duration::ZERO,
            max_delay: None,
            capacity: 0,
        }
    }

    pub fn delay(&mut self, delay: Duration) -> &mut Self {
        self.delay = delay;
        self
    }

    /// Upper bound on how far resets may push an item out. Zero means
    /// unbounded.
    pub fn max_delay(&mut self, max_delay: Duration) -> &mut Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Preallocate room for `capacity` items.
    pub fn capacity(&mut self, capacity: usize) -> &mut Self {
        self.capacity = capacity;
        self
    }

    fn buffer<T>(&self) -> Result<Buffer<T>> {
        let schedule = Schedule::new(self.delay, self.max_delay)?;
        Ok(Buffer::new(schedule, self.capacity))
    }

    pub fn build<T>(&self) -> Result<BufferingQueue<T>> {
        self.buffer().map(BufferingQueue::from_buffer)
    }

    pub fn build_unsync<T>(&self) -> Result<UnsyncBufferingQueue<T>> {
        self.buffer().map(UnsyncBufferingQueue::from_buffer)
    }
}
