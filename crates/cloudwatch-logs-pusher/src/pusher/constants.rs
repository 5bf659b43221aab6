//! Constants for the CloudWatch Logs API limits.
//!
//! This module defines the size, count, and time-range limits enforced by the
//! `PutLogEvents` operation. The pusher respects every one of them locally so
//! that batches are never rejected for a reason it could have prevented.

use std::time::Duration;

/// Maximum request payload size in bytes.
///
/// The sink computes the payload size as the sum over all events of the
/// message length plus [`EVENT_HEADER_SIZE`]. Requests above this size are
/// rejected, so the pusher flushes before an append would cross it.
pub(crate) const REQ_SIZE_LIMIT: usize = 1024 * 1024;

/// Maximum number of events per `PutLogEvents` request.
pub(crate) const REQ_EVENTS_LIMIT: usize = 10_000;

/// Per-event overhead in bytes added to the message length when computing
/// the request payload size.
pub(crate) const EVENT_HEADER_SIZE: usize = 26;

/// Maximum size in bytes of a single event message.
///
/// Longer messages are truncated and [`TRUNCATED_SUFFIX`] is appended inside
/// the limit to make the truncation visible downstream.
pub(crate) const MSG_SIZE_LIMIT: usize = 256 * 1024;

/// Marker appended to a message that was cut down to [`MSG_SIZE_LIMIT`].
pub(crate) const TRUNCATED_SUFFIX: &str = "[Truncated...]";

/// Maximum timestamp span within a single batch.
///
/// A batch of log events in a single request cannot span more than 24 hours,
/// so an event further than this from the buffered minimum or maximum forces
/// a flush of the current buffer first.
pub(crate) const BATCH_SPAN_LIMIT_MS: i64 = 24 * 60 * 60 * 1000;

/// Oldest event age accepted at ingress.
///
/// The sink refuses events older than 14 days; they are dropped at admission
/// instead of poisoning a batch.
pub(crate) const PAST_ADMISSION_LIMIT: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Furthest-future event time accepted at ingress (2 hours ahead of now).
pub(crate) const FUTURE_ADMISSION_LIMIT: Duration = Duration::from_secs(2 * 60 * 60);

/// Capacity of the ingress queue between producers and the worker.
pub(crate) const INGRESS_CAPACITY: usize = 100;

/// Base delay for exponential backoff between sink retries.
pub(crate) const RETRY_BACKOFF_BASE: Duration = Duration::from_millis(50);

/// Ceiling for the exponential backoff delay.
pub(crate) const RETRY_BACKOFF_CAP: Duration = Duration::from_secs(1);
