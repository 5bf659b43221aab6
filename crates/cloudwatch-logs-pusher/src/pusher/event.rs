//! Log event model and conversion to the sink's wire format.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::pusher::constants::{MSG_SIZE_LIMIT, TRUNCATED_SUFFIX};
use crate::sink::InputLogEvent;

/// One-shot completion callback invoked after an event has been accepted by
/// the sink.
pub type Completion = Box<dyn FnOnce() + Send + 'static>;

/// A log event as handed over by a producer.
///
/// `time` is the wall-clock instant the event was produced, or `None` when
/// the producer could not determine one. `done` is invoked exactly once after
/// the event has been accepted by the sink; events dropped at admission, by
/// ingress eviction, or by a non-recoverable sink error never complete.
pub struct LogEvent {
    pub message: String,
    pub time: Option<SystemTime>,
    pub done: Option<Completion>,
}

impl LogEvent {
    pub fn new(message: impl Into<String>, time: SystemTime) -> Self {
        LogEvent {
            message: message.into(),
            time: Some(time),
            done: None,
        }
    }

    /// An event whose timestamp is unknown; the pusher assigns one during
    /// conversion.
    pub fn without_time(message: impl Into<String>) -> Self {
        LogEvent {
            message: message.into(),
            time: None,
            done: None,
        }
    }

    #[must_use]
    pub fn with_done(mut self, done: impl FnOnce() + Send + 'static) -> Self {
        self.done = Some(Box::new(done));
        self
    }
}

impl fmt::Debug for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogEvent")
            .field("message", &self.message)
            .field("time", &self.time)
            .field("done", &self.done.is_some())
            .finish()
    }
}

/// A `(group, stream)` destination pair, immutable for a pusher's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub group: String,
    pub stream: String,
}

impl Target {
    pub fn new(group: impl Into<String>, stream: impl Into<String>) -> Self {
        Target {
            group: group.into(),
            stream: stream.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.stream)
    }
}

/// Normalizes incoming events into wire events.
///
/// Carries the last explicit timestamp seen so that events without one can
/// inherit it: where there has been a valid time before, most log events from
/// the same source will have one, and the last valid timestamp is a better
/// guess than the arrival time.
#[derive(Debug, Default)]
pub(crate) struct EventConverter {
    last_valid_time: Option<i64>,
}

impl EventConverter {
    /// Converts a producer event into a wire event.
    ///
    /// Messages longer than the sink's limit are truncated with the
    /// truncation marker appended inside the limit. An explicit timestamp is
    /// floored to milliseconds and recorded as the new carry; an absent one
    /// falls back to the carry, then to the current wall clock.
    pub(crate) fn convert(&mut self, message: String, time: Option<SystemTime>) -> InputLogEvent {
        let message = truncate_message(message);
        let timestamp = match time {
            Some(t) => {
                let millis = unix_millis(t);
                self.last_valid_time = Some(millis);
                millis
            }
            None => self
                .last_valid_time
                .unwrap_or_else(|| unix_millis(SystemTime::now())),
        };
        InputLogEvent { message, timestamp }
    }
}

fn truncate_message(mut message: String) -> String {
    if message.len() <= MSG_SIZE_LIMIT {
        return message;
    }
    let mut cut = MSG_SIZE_LIMIT - TRUNCATED_SUFFIX.len();
    // Stay on a char boundary; the sink counts bytes but the message must
    // remain valid UTF-8.
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    message.truncate(cut);
    message.push_str(TRUNCATED_SUFFIX);
    message
}

/// Milliseconds since the epoch, floored.
pub(crate) fn unix_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(since) => since.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
