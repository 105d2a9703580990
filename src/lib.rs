#![forbid(unsafe_code)]

//! Delay-buffering priority queues and a token-bucket rate limiter.
//!
//! Items offered to a queue stay invisible until their deadline passes and
//! then come out in deadline order. [`BufferingQueue`] is shared between
//! threads and supports blocking, timed, cancellable and (with the `future`
//! feature) async consumers. [`UnsyncBufferingQueue`] is the single-owner
//! variant. [`RateLimiter`] builds a rolling-window limiter on top of the
//! same machinery.

mod buffer;

pub mod config;
pub mod delayed;
pub mod error;
pub mod heap;
pub mod rate;
pub mod sync;
pub mod unsync;

pub use self::{
    config::Config,
    delayed::{DelayedItem, Schedule},
    error::{Error, Result},
    rate::RateLimiter,
    sync::{BufferingQueue, CancelToken},
    unsync::UnsyncBufferingQueue,
};
