//! The per-target worker loop.
//!
//! A single task owns all mutable pusher state: the batch buffer, the event
//! converter, the flush timer, and the sender. It waits on three sources at
//! once and reacts to whichever fires first:
//!
//! 1. a new event from the ingress queue, which is batched (possibly after a
//!    span- or size-triggered flush of the current buffer),
//! 2. the flush timer, which bounds the staleness of the oldest buffered
//!    event, and
//! 3. the shutdown signal, which drains the buffer with one final flush.
//!
//! The timer is armed when the buffer goes from empty to non-empty and not
//! re-armed on later appends: the timeout is a ceiling on the staleness of
//! the oldest buffered event, not the newest.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::pusher::buffer::{wire_size, BatchBuffer};
use crate::pusher::constants::{REQ_EVENTS_LIMIT, REQ_SIZE_LIMIT};
use crate::pusher::event::{unix_millis, EventConverter, LogEvent, Target};
use crate::pusher::ingress::Ingress;
use crate::pusher::sender::Sender;
use crate::sink::CloudWatchLogs;

pub(crate) struct Worker {
    ingress: Arc<Ingress>,
    buffer: BatchBuffer,
    converter: EventConverter,
    sender: Sender,
    flush_timeout: Duration,
    flush_deadline: Instant,
    timer_armed: bool,
    cancel_token: CancellationToken,
    target: Target,
}

impl Worker {
    pub(crate) fn new(
        target: Target,
        client: Arc<dyn CloudWatchLogs>,
        flush_timeout: Duration,
        ingress: Arc<Ingress>,
        cancel_token: CancellationToken,
    ) -> Self {
        Worker {
            ingress,
            buffer: BatchBuffer::default(),
            converter: EventConverter::default(),
            sender: Sender::new(target.clone(), client, cancel_token.clone()),
            flush_timeout,
            flush_deadline: Instant::now(),
            timer_armed: false,
            cancel_token,
            target,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                event = self.ingress.recv() => {
                    self.handle_event(event).await;
                }
                () = tokio::time::sleep_until(self.flush_deadline), if self.timer_armed => {
                    self.timer_armed = false;
                    if !self.buffer.is_empty() {
                        self.flush(true).await;
                    }
                }
                () = self.cancel_token.cancelled() => {
                    if !self.buffer.is_empty() {
                        self.sender.send(&mut self.buffer, false).await;
                    }
                    debug!("Pusher worker for {} exiting", self.target);
                    return;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: LogEvent) {
        let LogEvent {
            message,
            time,
            done,
        } = event;

        if self.buffer.is_empty() {
            self.arm_flush_timer();
        }
        let mut flushed = false;

        // A batch cannot span more than 24 hours; ship what is buffered
        // before this event joins. The producer's own time is what counts
        // here; an event without one compares as the epoch.
        let event_time = time.map_or(0, unix_millis);
        if self.buffer.would_exceed_span(event_time) {
            self.flush(true).await;
            flushed = true;
        }

        let wire = self.converter.convert(message, time);
        let size = wire_size(&wire);
        if self.buffer.buffered_bytes() + size > REQ_SIZE_LIMIT
            || self.buffer.len() >= REQ_EVENTS_LIMIT
        {
            self.flush(true).await;
            flushed = true;
        }

        // A successful preemptive flush emptied the buffer; the event being
        // appended starts a new batch and gets its own full timeout window.
        if flushed && self.buffer.is_empty() {
            self.arm_flush_timer();
        }

        self.buffer.append(wire, done);
    }

    async fn flush(&mut self, race_cancellation: bool) {
        self.sender.send(&mut self.buffer, race_cancellation).await;
        if !self.buffer.is_empty() {
            // The attempt failed and the buffer was retained; keep a trigger
            // armed so the retry does not wait for the next event.
            self.arm_flush_timer();
        }
    }

    fn arm_flush_timer(&mut self) {
        self.flush_deadline = Instant::now() + self.flush_timeout;
        self.timer_armed = true;
    }
}
