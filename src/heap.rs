//! A binary min-heap of [`DelayedItem`]s keyed by deadline.
//!
//! `std::collections::BinaryHeap` can't remove arbitrary elements, which the
//! replace and reset offers need, so the sifting is done by hand. Equal
//! deadlines are ordered by insertion so they expire first-in first-out.

use crate::delayed::DelayedItem;
use std::{mem, time::Instant};

struct Slot<T> {
    seq: u64,
    item: DelayedItem<T>,
}

impl<T> Slot<T> {
    fn before(&self, other: &Self) -> bool {
        (self.item.deadline(), self.seq) < (other.item.deadline(), other.seq)
    }
}

pub struct DelayHeap<T> {
    slots: Vec<Slot<T>>,
    seq: u64,
}

impl<T> Default for DelayHeap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DelayHeap<T> {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            seq: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert an item, returning true if it is now the minimum.
    pub fn push(&mut self, item: DelayedItem<T>) -> bool {
        let seq = self.seq;
        self.seq = self.seq.wrapping_add(1);

        self.slots.push(Slot { seq, item });
        self.sift_up(self.slots.len() - 1) == 0
    }

    pub fn peek(&self) -> Option<&DelayedItem<T>> {
        self.slots.first().map(|slot| &slot.item)
    }

    pub fn pop(&mut self) -> Option<DelayedItem<T>> {
        if self.slots.is_empty() {
            return None;
        }
        Some(self.remove(0))
    }

    /// Pop the minimum only if its deadline is at or before `now`.
    pub fn pop_expired(&mut self, now: Instant) -> Option<DelayedItem<T>> {
        match self.peek() {
            Some(head) if head.is_expired_at(now) => self.pop(),
            _ => None,
        }
    }

    /// Linear scan for the first item matching `predicate`.
    pub fn position(&self, mut predicate: impl FnMut(&DelayedItem<T>) -> bool) -> Option<usize> {
        self.slots.iter().position(|slot| predicate(&slot.item))
    }

    /// Remove the item at `index` as reported by [`position`](Self::position).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> DelayedItem<T> {
        let removed = self.slots.swap_remove(index);

        // The former last slot now sits at `index` and may belong either
        // above or below it.
        if index < self.slots.len() && self.sift_up(index) == index {
            self.sift_down(index);
        }

        removed.item
    }

    pub fn remove_where(
        &mut self,
        predicate: impl FnMut(&DelayedItem<T>) -> bool,
    ) -> Option<DelayedItem<T>> {
        self.position(predicate).map(|index| self.remove(index))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Items in heap layout order, which is not deadline order.
    pub fn iter(&self) -> impl Iterator<Item = &DelayedItem<T>> + '_ {
        self.slots.iter().map(|slot| &slot.item)
    }

    fn sift_up(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if !self.slots[index].before(&self.slots[parent]) {
                break;
            }
            self.slots.swap(index, parent);
            index = parent;
        }
        index
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.slots.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                return;
            }

            let right = left + 1;
            let child = if right < len && self.slots[right].before(&self.slots[left]) {
                right
            } else {
                left
            };

            if !self.slots[child].before(&self.slots[index]) {
                return;
            }
            self.slots.swap(index, child);
            index = child;
        }
    }

    pub(crate) fn take_all(&mut self) -> Vec<DelayedItem<T>> {
        mem::take(&mut self.slots)
            .into_iter()
            .map(|slot| slot.item)
            .collect()
    }
}
