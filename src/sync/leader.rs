use std::thread::{self, ThreadId};

/// The thread currently timing a wait for the head of the heap.
///
/// Only the leader sleeps with a deadline; everyone else parks until
/// signalled. Guarded by the same lock as the heap.
#[derive(Debug, Default)]
pub(crate) struct Leader(Option<ThreadId>);

impl Leader {
    pub fn is_vacant(&self) -> bool {
        self.0.is_none()
    }

    pub fn claim(&mut self) -> ThreadId {
        let id = thread::current().id();
        self.0 = Some(id);
        id
    }

    /// Step down, unless an insertion already cleared the slot and someone
    /// else has since taken it.
    pub fn release(&mut self, id: ThreadId) {
        if self.0 == Some(id) {
            self.0 = None;
        }
    }

    pub fn clear(&mut self) {
        self.0 = None;
    }
}
