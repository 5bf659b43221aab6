//! # CloudWatch Logs Pusher
//!
//! This crate provides a batching log pusher for CloudWatch Logs style sinks:
//! a per-destination worker that accepts a stream of log events from local
//! producers and forwards them to a remote append-only log stream in batches.
//!
//! ## Overview
//!
//! One [`pusher::Pusher`] is dedicated to a single `(group, stream)` target.
//! Producers push events into it; it buffers, sorts, flushes, recovers from
//! predictable sink errors, and drains cleanly on shutdown. Batching
//! reconciles three pressures:
//!
//! - **Throughput and cost**: the sink charges per request and caps request
//!   size and event count, so events must be batched.
//! - **Latency**: events should surface promptly even when volume is low,
//!   which requires a timer-driven flush.
//! - **Correctness**: the sink rejects batches that span more than 24 hours,
//!   contain out-of-range timestamps, are out of order, or present a stale
//!   sequence token.
//!
//! ## Architecture
//!
//! ```text
//!    Producers
//!        │  add_event / add_event_non_blocking
//!        v
//!   ┌─────────────┐
//!   │   Ingress   │ (bounded queue, oldest-first eviction)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │   Worker    │ (event loop: batch, flush timer, shutdown)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │   Sender    │ (sequence token, error recovery, retries)
//!   └──────┬──────┘
//!          │
//!          v
//!   ┌─────────────┐
//!   │  Log Sink   │ (PutLogEvents / CreateLogGroup / CreateLogStream)
//!   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`pusher`]: event ingestion, batching, and the per-target worker
//! - [`sink`]: the log sink contract and its HTTP implementation
//! - [`config`]: configuration from defaults and environment variables
//! - [`logger`]: tracing formatter for agent log output

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::uninlined_format_args)]

/// Configuration management - environment variables and defaults
pub mod config;

/// Logging infrastructure and tracing setup
pub mod logger;

/// Event ingestion, batching, and forwarding
pub mod pusher;

/// Log sink contract and HTTP client
pub mod sink;

/// Maximum number of sink attempts within a single flush cycle.
///
/// Recoverable sink errors (missing resources, stale sequence tokens) are
/// retried inline with exponential backoff. Once this budget is exhausted the
/// buffer is retained and the next flush trigger starts a fresh cycle.
pub(crate) const SEND_RETRY_LIMIT: usize = 5;
