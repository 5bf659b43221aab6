//! Event ingestion, batching, and forwarding to a single log stream.
//!
//! This module implements the per-target pusher: producers hand it log
//! events, and it delivers them to the sink in batches that respect the
//! sink's size, count, ordering, and time-span limits.
//!
//! # Architecture
//!
//! ```text
//!                  ┌──────────────┐
//!                  │  Producers   │  (tailers, readers, app code)
//!                  └──────┬───────┘
//!                         │ add_event / add_event_non_blocking
//!                         v
//!                  ┌──────────────┐
//!                  │   Ingress    │  (admission + bounded queue)
//!                  └──────┬───────┘
//!                         │
//!                         v
//!                  ┌──────────────┐
//!                  │    Worker    │  (convert, batch, flush timer)
//!                  └──────┬───────┘
//!                         │
//!                         v
//!                  ┌──────────────┐
//!                  │    Sender    │  (tokens, recovery, retries)
//!                  └──────┬───────┘
//!                         │
//!                         v
//!                  ┌──────────────┐
//!                  │   Log Sink   │
//!                  └──────────────┘
//! ```
//!
//! # Components
//!
//! - **[`Pusher`]**: the public handle; submits events and coordinates
//!   shutdown
//! - **[`event`]**: producer-facing event model and wire conversion
//! - **[`buffer`]**: the pending batch with size/span/order tracking
//! - **[`ingress`]**: bounded producer queue with oldest-first eviction
//! - **[`worker`]**: the single-owner event loop
//! - **[`sender`]**: batch transmission and sink error recovery
//!
//! # Delivery semantics
//!
//! Delivery is at-least-once from the producer's point of view: an event's
//! `done` callback fires exactly once after the sink accepts its batch, and
//! never fires for events dropped at admission, evicted at ingress, or lost
//! to a non-recoverable sink error.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub mod buffer;
pub mod constants;
pub mod event;
pub mod ingress;
pub mod sender;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use event::{Completion, LogEvent, Target};

use crate::pusher::constants::INGRESS_CAPACITY;
use crate::pusher::ingress::{has_valid_time, Ingress};
use crate::pusher::worker::Worker;
use crate::sink::CloudWatchLogs;

/// Handle to a per-target pusher.
///
/// Constructing a pusher spawns its worker task; the handle is the only way
/// to feed it events or shut it down. The sink client is shared, everything
/// else is private to the worker.
pub struct Pusher {
    target: Target,
    ingress: Arc<Ingress>,
    cancel_token: CancellationToken,
    worker: JoinHandle<()>,
}

impl Pusher {
    /// Creates a pusher for `target` and starts its worker.
    ///
    /// `flush_timeout` bounds how long the oldest buffered event can wait
    /// before a timer-driven flush ships it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        target: Target,
        client: Arc<dyn CloudWatchLogs>,
        flush_timeout: Duration,
    ) -> Self {
        let ingress = Arc::new(Ingress::new(INGRESS_CAPACITY));
        let cancel_token = CancellationToken::new();
        let worker = Worker::new(
            target.clone(),
            client,
            flush_timeout,
            Arc::clone(&ingress),
            cancel_token.clone(),
        );
        let worker = tokio::spawn(worker.run());

        Pusher {
            target,
            ingress,
            cancel_token,
            worker,
        }
    }

    /// Submits an event, waiting when the ingress queue is full.
    ///
    /// Events outside the sink's accepted time range are discarded here;
    /// their callbacks are never invoked.
    pub async fn add_event(&self, event: LogEvent) {
        if !self.admit(&event) {
            return;
        }
        self.ingress.send(event).await;
    }

    /// Submits an event without blocking; when the ingress queue is full the
    /// oldest pending event is evicted to make room.
    pub fn add_event_non_blocking(&self, event: LogEvent) {
        if !self.admit(&event) {
            return;
        }
        if let Some(evicted) = self.ingress.send_evicting(event) {
            warn!(
                "Ingress queue for {} full, dropping oldest pending event: {:?}",
                self.target, evicted.message
            );
        }
    }

    fn admit(&self, event: &LogEvent) -> bool {
        if has_valid_time(event) {
            return true;
        }
        error!(
            "The log entry in {} with timestamp {:?} is out of the accepted time range relative to {:?}. Discarding the log entry.",
            self.target,
            event.time,
            std::time::SystemTime::now()
        );
        false
    }

    /// Initiates shutdown. The worker stops accepting further work, drains
    /// the current buffer with one final flush attempt, then exits.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// Waits for the worker to exit. Call after [`Pusher::stop`].
    pub async fn join(self) {
        let _ = self.worker.await;
    }

    /// The `(group, stream)` pair this pusher delivers to.
    pub fn target(&self) -> &Target {
        &self.target
    }
}
