//! The dispatch input type: an ordered, deduplicated sequence of events.
//!
//! [`OrderedEvents::canonical`] establishes the contract (sort by chain
//! position, drop exact-id repeats). [`OrderedEvents::as_delivered`] skips
//! that and keeps whatever order the caller supplies; it exists so tests
//! and replay tools can feed out-of-order or duplicated sequences through
//! the same pipeline.

use std::collections::HashSet;

use crate::event::LoggedEvent;

#[derive(Debug, Clone, Default)]
pub struct OrderedEvents {
    events: Vec<LoggedEvent>,
}

impl OrderedEvents {
    /// Sort by `(block_number, log_index)` and drop repeated event ids
    /// (first occurrence wins).
    pub fn canonical(mut events: Vec<LoggedEvent>) -> Self {
        events.sort_by_key(|e| e.meta.position());
        let mut seen = HashSet::with_capacity(events.len());
        events.retain(|e| seen.insert(e.meta.id()));
        Self { events }
    }

    /// Trust the caller's order verbatim, duplicates included.
    pub fn as_delivered(events: Vec<LoggedEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LoggedEvent> {
        self.events.iter()
    }
}

impl IntoIterator for OrderedEvents {
    type Item = LoggedEvent;
    type IntoIter = std::vec::IntoIter<LoggedEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.into_iter()
    }
}
