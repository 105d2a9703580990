use std::time::Duration;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking wait was aborted through a [`CancelToken`](crate::sync::CancelToken).
    #[error("wait was cancelled")]
    Cancelled,

    #[error("index {index} out of bounds for length {len}")]
    OutOfBounds { index: usize, len: usize },
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub(crate) fn delay_exceeds_max(delay: Duration, max_delay: Duration) -> Self {
        Self::invalid(format!("delay {:?} exceeds max delay {:?}", delay, max_delay))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
