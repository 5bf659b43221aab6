//! Pending-batch buffer for a single target.
//!
//! Holds converted events together with their completion callbacks until a
//! flush hands them to the sink. Each event and its callback travel as one
//! record, so the stable timestamp sort keeps the pairing intact and a
//! completion always belongs to the event it was submitted with.

use crate::pusher::constants::{BATCH_SPAN_LIMIT_MS, EVENT_HEADER_SIZE};
use crate::pusher::event::Completion;
use crate::sink::InputLogEvent;

/// A wire event paired with its completion callback.
pub(crate) struct BufferedEvent {
    pub(crate) event: InputLogEvent,
    pub(crate) done: Option<Completion>,
}

/// Accumulates events for the next `PutLogEvents` request.
///
/// Tracks the running payload size, the min/max timestamps, and whether an
/// append broke non-decreasing timestamp order (in which case the batch is
/// sorted before transmission).
#[derive(Default)]
pub(crate) struct BatchBuffer {
    entries: Vec<BufferedEvent>,
    buffered_bytes: usize,
    min_timestamp: Option<i64>,
    max_timestamp: Option<i64>,
    needs_sort: bool,
}

/// Payload size the sink accounts for a single event.
pub(crate) fn wire_size(event: &InputLogEvent) -> usize {
    event.message.len() + EVENT_HEADER_SIZE
}

impl BatchBuffer {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    pub(crate) fn min_timestamp(&self) -> Option<i64> {
        self.min_timestamp
    }

    pub(crate) fn max_timestamp(&self) -> Option<i64> {
        self.max_timestamp
    }

    pub(crate) fn needs_sort(&self) -> bool {
        self.needs_sort
    }

    /// True when adding an event with `timestamp` would stretch the batch
    /// beyond the 24 hour span the sink accepts.
    pub(crate) fn would_exceed_span(&self, timestamp: i64) -> bool {
        let too_new = self
            .min_timestamp
            .is_some_and(|min| timestamp.saturating_sub(min) > BATCH_SPAN_LIMIT_MS);
        let too_old = self
            .max_timestamp
            .is_some_and(|max| max.saturating_sub(timestamp) > BATCH_SPAN_LIMIT_MS);
        too_new || too_old
    }

    /// Appends an event and its callback, updating size, span, and order
    /// tracking.
    pub(crate) fn append(&mut self, event: InputLogEvent, done: Option<Completion>) {
        if self
            .entries
            .last()
            .is_some_and(|last| event.timestamp < last.event.timestamp)
        {
            self.needs_sort = true;
        }

        self.buffered_bytes += wire_size(&event);
        self.min_timestamp = Some(match self.min_timestamp {
            Some(min) => min.min(event.timestamp),
            None => event.timestamp,
        });
        self.max_timestamp = Some(match self.max_timestamp {
            Some(max) => max.max(event.timestamp),
            None => event.timestamp,
        });
        self.entries.push(BufferedEvent { event, done });
    }

    /// Stable sort by timestamp; events with equal timestamps keep their
    /// insertion order, and callbacks move with their events.
    pub(crate) fn sort_by_timestamp(&mut self) {
        self.entries.sort_by_key(|entry| entry.event.timestamp);
        self.needs_sort = false;
    }

    /// The buffered events in wire order, cloned for a request body.
    pub(crate) fn events(&self) -> Vec<InputLogEvent> {
        self.entries.iter().map(|entry| entry.event.clone()).collect()
    }

    /// Invokes every completion callback in wire order, then clears.
    pub(crate) fn complete_all(&mut self) {
        for entry in &mut self.entries {
            if let Some(done) = entry.done.take() {
                done();
            }
        }
        self.clear();
    }

    /// Clears without invoking any callback; the events are lost.
    pub(crate) fn discard_all(&mut self) {
        self.clear();
    }

    /// Resets all fields to empty; the backing allocation is retained.
    fn clear(&mut self) {
        self.entries.clear();
        self.buffered_bytes = 0;
        self.min_timestamp = None;
        self.max_timestamp = None;
        self.needs_sort = false;
    }
}
