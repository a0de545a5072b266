//! Idempotency guard in front of handler dispatch.
//!
//! Aggregate handlers are not idempotent, so a log redelivered by the
//! upstream fetcher would double-count. The deduplicator remembers the last
//! N event ids that were applied (a sliding window, oldest evicted first);
//! the indexer checks it before dispatch and admits an id only once the
//! handler's commit succeeded.

use std::collections::{HashSet, VecDeque};

use crate::types::EventId;

/// Sliding-window set of recently dispatched event ids.
pub struct Deduplicator {
    seen: HashSet<EventId>,
    /// Insertion order, for eviction.
    order: VecDeque<EventId>,
    /// Maximum number of ids to retain.
    window_size: usize,
}

impl Deduplicator {
    /// Create a guard remembering up to `window_size` ids.
    pub fn new(window_size: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(window_size.min(4096)),
            order: VecDeque::with_capacity(window_size.min(4096)),
            window_size: window_size.max(1),
        }
    }

    /// Returns `true` the first time `id` is offered, `false` on a repeat.
    pub fn admit(&mut self, id: EventId) -> bool {
        if !self.seen.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > self.window_size {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// `true` if `id` is currently remembered.
    pub fn contains(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }
}
