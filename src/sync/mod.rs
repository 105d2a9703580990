mod cancel;
pub use self::cancel::CancelToken;

mod leader;

mod queue;
pub use self::queue::BufferingQueue;

mod shared;
pub(crate) use self::shared::Shared;
