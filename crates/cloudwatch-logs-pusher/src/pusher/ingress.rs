//! Ingress queue between producers and the worker.
//!
//! A bounded FIFO with two submission modes: blocking submit, which applies
//! natural backpressure when the worker falls behind, and evicting submit,
//! which drops the oldest pending event to make room so a producer that must
//! not block always makes progress. Both modes sit behind the same time-range
//! admission check.
//!
//! The queue is hand-rolled rather than an `mpsc` channel because eviction
//! removes from the front while producers insert at the back, and channel
//! receivers cannot give that up while the worker is suspended in a send.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::SystemTime;

use tokio::sync::Notify;

use crate::pusher::constants::{FUTURE_ADMISSION_LIMIT, PAST_ADMISSION_LIMIT};
use crate::pusher::event::LogEvent;

/// Bounded queue with oldest-first eviction.
pub(crate) struct Ingress {
    queue: Mutex<VecDeque<LogEvent>>,
    capacity: usize,
    /// Signals the worker that an event is available.
    ready: Notify,
    /// Signals blocked producers that a slot opened up.
    vacancy: Notify,
}

impl Ingress {
    pub(crate) fn new(capacity: usize) -> Self {
        Ingress {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            ready: Notify::new(),
            vacancy: Notify::new(),
        }
    }

    /// Blocking submit: waits for a free slot when the queue is full.
    pub(crate) async fn send(&self, event: LogEvent) {
        let mut event = Some(event);
        loop {
            {
                let mut queue = self.queue.lock().expect("ingress queue lock poisoned");
                if queue.len() < self.capacity {
                    queue.push_back(event.take().expect("event already consumed"));
                    drop(queue);
                    self.ready.notify_one();
                    return;
                }
            }
            self.vacancy.notified().await;
        }
    }

    /// Evicting submit: when the queue is full, the oldest pending event is
    /// removed to make room and returned to the caller. Its callback is not
    /// invoked.
    pub(crate) fn send_evicting(&self, event: LogEvent) -> Option<LogEvent> {
        let evicted = {
            let mut queue = self.queue.lock().expect("ingress queue lock poisoned");
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(event);
            evicted
        };
        self.ready.notify_one();
        evicted
    }

    /// Receives the next event, waiting if the queue is empty. Single
    /// consumer: only the worker calls this.
    pub(crate) async fn recv(&self) -> LogEvent {
        loop {
            let popped = self
                .queue
                .lock()
                .expect("ingress queue lock poisoned")
                .pop_front();
            if let Some(event) = popped {
                self.vacancy.notify_one();
                return event;
            }
            self.ready.notified().await;
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.queue.lock().expect("ingress queue lock poisoned").len()
    }
}

/// Time-range admission applied before an event enters the queue.
///
/// Events without a timestamp are always admitted (one is assigned during
/// conversion). Timestamped events are rejected when older than 14 days or
/// more than 2 hours in the future, the window the sink itself enforces.
pub(crate) fn has_valid_time(event: &LogEvent) -> bool {
    let Some(time) = event.time else {
        return true;
    };
    let now = SystemTime::now();
    match now.duration_since(time) {
        Ok(age) => age <= PAST_ADMISSION_LIMIT,
        Err(ahead) => ahead.duration() <= FUTURE_ADMISSION_LIMIT,
    }
}
