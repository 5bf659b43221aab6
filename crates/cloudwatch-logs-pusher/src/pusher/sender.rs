//! Batch transmission and sink error recovery.
//!
//! A flush cycle sorts the buffer if needed, builds one `PutLogEvents`
//! request, and walks the sink's error surface:
//!
//! ```text
//!   IDLE ──flush──▶ SENDING ──ok──▶ IDLE          (callbacks fired, cleared)
//!   SENDING ──rejected range──▶ IDLE              (warn, callbacks fired, cleared)
//!   SENDING ──ResourceNotFound──▶ CREATING ──ok──▶ SENDING
//!                                      └─fail──▶ IDLE (buffer retained)
//!   SENDING ──InvalidSequenceToken(expected)──▶ SENDING
//!   SENDING ──InvalidSequenceToken(none)──▶ IDLE  (buffer retained)
//!   SENDING ──other error──▶ IDLE                 (cleared, callbacks dropped)
//! ```
//!
//! Recoverable transitions back into SENDING are bounded by
//! [`SEND_RETRY_LIMIT`](crate::SEND_RETRY_LIMIT) attempts per cycle with
//! exponential backoff, so a persistently failing sink cannot hot-loop the
//! worker. Exhausting the budget retains the buffer for the next trigger.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::pusher::buffer::BatchBuffer;
use crate::pusher::constants::{RETRY_BACKOFF_BASE, RETRY_BACKOFF_CAP};
use crate::pusher::event::Target;
use crate::sink::{
    CloudWatchLogs, CreateLogGroupRequest, CreateLogStreamRequest, PutLogEventsRequest,
    RejectedLogEventsInfo, SinkError,
};
use crate::SEND_RETRY_LIMIT;

pub(crate) struct Sender {
    target: Target,
    client: Arc<dyn CloudWatchLogs>,
    sequence_token: Option<String>,
    cancel_token: CancellationToken,
}

impl Sender {
    pub(crate) fn new(
        target: Target,
        client: Arc<dyn CloudWatchLogs>,
        cancel_token: CancellationToken,
    ) -> Self {
        Sender {
            target,
            client,
            sequence_token: None,
            cancel_token,
        }
    }

    /// Transmits the buffered batch to the sink.
    ///
    /// On success (including partial sub-range rejection) every completion
    /// callback fires in wire order and the buffer is cleared. Recoverable
    /// errors are handled inline; non-recoverable errors clear the buffer
    /// without completing, and recovery-setup failures leave the buffer for
    /// the next trigger.
    ///
    /// With `race_cancellation`, an in-flight sink call is abandoned when the
    /// pusher shuts down so it cannot pin the worker. The final drain flush
    /// runs without the race.
    #[allow(clippy::too_many_lines)]
    pub(crate) async fn send(&mut self, buffer: &mut BatchBuffer, race_cancellation: bool) {
        if buffer.is_empty() {
            return;
        }
        if buffer.needs_sort() {
            buffer.sort_by_timestamp();
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            let request = PutLogEventsRequest {
                log_group_name: self.target.group.clone(),
                log_stream_name: self.target.stream.clone(),
                log_events: buffer.events(),
                sequence_token: self.sequence_token.clone(),
            };

            let result = if race_cancellation {
                tokio::select! {
                    result = self.client.put_log_events(request) => result,
                    () = self.cancel_token.cancelled() => Err(SinkError::Cancelled),
                }
            } else {
                self.client.put_log_events(request).await
            };

            match result {
                Ok(response) => {
                    if let Some(token) = response.next_sequence_token {
                        self.sequence_token = Some(token);
                    }
                    if let Some(info) = response.rejected_log_events_info {
                        self.warn_rejected(&info);
                    }
                    buffer.complete_all();
                    return;
                }

                Err(SinkError::ResourceNotFound(message)) => {
                    warn!(
                        "Log group or stream {} missing, creating: {}",
                        self.target, message
                    );
                    if attempts >= SEND_RETRY_LIMIT {
                        error!(
                            "Giving up sending to {} after {} attempts, keeping {} events buffered",
                            self.target,
                            attempts,
                            buffer.len()
                        );
                        return;
                    }
                    if let Err(e) = self.create_group_and_stream(race_cancellation).await {
                        error!("Unable to create log group or stream {}: {}", self.target, e);
                        return;
                    }
                }

                Err(SinkError::InvalidSequenceToken {
                    message,
                    expected_sequence_token,
                }) => {
                    warn!(
                        "Invalid sequence token used for {}, will use new token and retry: {}",
                        self.target, message
                    );
                    let Some(token) = expected_sequence_token else {
                        error!(
                            "No expected sequence token in response from {}, keeping {} events buffered",
                            self.target,
                            buffer.len()
                        );
                        return;
                    };
                    self.sequence_token = Some(token);
                    if attempts >= SEND_RETRY_LIMIT {
                        error!(
                            "Giving up sending to {} after {} attempts, keeping {} events buffered",
                            self.target,
                            attempts,
                            buffer.len()
                        );
                        return;
                    }
                }

                Err(e) => {
                    error!(
                        "Dropping {} events for {} after sink error: {}",
                        buffer.len(),
                        self.target,
                        e
                    );
                    buffer.discard_all();
                    return;
                }
            }

            backoff(attempts).await;
        }
    }

    /// Creates the log group (ignoring "already exists") and then the log
    /// stream. A stream that already exists also counts as success: the
    /// resource chain is usable either way.
    async fn create_group_and_stream(&self, race_cancellation: bool) -> Result<(), SinkError> {
        let create_group = self.client.create_log_group(CreateLogGroupRequest {
            log_group_name: self.target.group.clone(),
        });
        let result = if race_cancellation {
            tokio::select! {
                result = create_group => result,
                () = self.cancel_token.cancelled() => Err(SinkError::Cancelled),
            }
        } else {
            create_group.await
        };
        match result {
            Ok(()) | Err(SinkError::ResourceAlreadyExists(_)) => {}
            Err(e) => return Err(e),
        }

        let create_stream = self.client.create_log_stream(CreateLogStreamRequest {
            log_group_name: self.target.group.clone(),
            log_stream_name: self.target.stream.clone(),
        });
        let result = if race_cancellation {
            tokio::select! {
                result = create_stream => result,
                () = self.cancel_token.cancelled() => Err(SinkError::Cancelled),
            }
        } else {
            create_stream.await
        };
        match result {
            Ok(()) | Err(SinkError::ResourceAlreadyExists(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn warn_rejected(&self, info: &RejectedLogEventsInfo) {
        if let Some(index) = info.too_old_log_event_end_index {
            warn!("{} log events for {} are too old", index, self.target);
        }
        if let Some(index) = info.too_new_log_event_start_index {
            warn!("{} log events for {} are too new", index, self.target);
        }
        if let Some(index) = info.expired_log_event_end_index {
            warn!("{} log events for {} are expired", index, self.target);
        }
    }

    #[cfg(test)]
    pub(crate) fn sequence_token(&self) -> Option<&str> {
        self.sequence_token.as_deref()
    }
}

/// Exponential backoff between attempts within one flush cycle.
async fn backoff(attempts: usize) {
    let exponent = attempts.saturating_sub(1).min(8) as u32;
    let delay = RETRY_BACKOFF_BASE
        .saturating_mul(2_u32.saturating_pow(exponent))
        .min(RETRY_BACKOFF_CAP);
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pusher::testing::{MockCloudWatchLogs, RecordedCall};
    use crate::sink::{InputLogEvent, PutLogEventsResponse};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn create_sender(client: &Arc<MockCloudWatchLogs>) -> Sender {
        Sender::new(
            Target::new("group", "stream"),
            Arc::clone(client) as Arc<dyn CloudWatchLogs>,
            CancellationToken::new(),
        )
    }

    fn create_buffer(count: usize, fired: &Arc<AtomicUsize>) -> BatchBuffer {
        let mut buffer = BatchBuffer::default();
        for i in 0..count {
            let fired = Arc::clone(fired);
            buffer.append(
                InputLogEvent {
                    message: format!("msg-{i}"),
                    timestamp: 1_700_000_000_000 + i as i64,
                },
                Some(Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                })),
            );
        }
        buffer
    }

    #[tokio::test]
    async fn test_send_success_fires_callbacks_and_stores_token() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Ok(PutLogEventsResponse {
            next_sequence_token: Some("next-1".to_string()),
            rejected_log_events_info: None,
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(3, &fired);

        sender.send(&mut buffer, false).await;

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(sender.sequence_token(), Some("next-1"));
        assert_eq!(client.put_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_send_empty_buffer_is_noop() {
        let client = Arc::new(MockCloudWatchLogs::default());
        let mut sender = create_sender(&client);
        let mut buffer = BatchBuffer::default();

        sender.send(&mut buffer, false).await;

        assert!(client.put_requests().is_empty());
    }

    #[tokio::test]
    async fn test_send_uses_stored_token_on_next_call() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Ok(PutLogEventsResponse {
            next_sequence_token: Some("next-1".to_string()),
            rejected_log_events_info: None,
        }));
        client.push_put_result(Ok(PutLogEventsResponse::default()));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));

        let mut buffer = create_buffer(1, &fired);
        sender.send(&mut buffer, false).await;
        let mut buffer = create_buffer(1, &fired);
        sender.send(&mut buffer, false).await;

        let requests = client.put_requests();
        assert_eq!(requests[0].sequence_token, None);
        assert_eq!(requests[1].sequence_token.as_deref(), Some("next-1"));
    }

    #[tokio::test]
    async fn test_rejected_range_still_completes_batch() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Ok(PutLogEventsResponse {
            next_sequence_token: Some("next".to_string()),
            rejected_log_events_info: Some(RejectedLogEventsInfo {
                too_old_log_event_end_index: Some(2),
                ..RejectedLogEventsInfo::default()
            }),
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(5, &fired);

        sender.send(&mut buffer, false).await;

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 5);
        assert_eq!(client.put_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_resource_not_found_creates_resources_and_retries() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::ResourceNotFound("no stream".to_string())));
        client.push_put_result(Ok(PutLogEventsResponse {
            next_sequence_token: Some("after-create".to_string()),
            rejected_log_events_info: None,
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(2, &fired);

        sender.send(&mut buffer, false).await;

        let calls = client.calls();
        assert!(matches!(calls[0], RecordedCall::Put(_)));
        match &calls[1] {
            RecordedCall::CreateGroup(request) => assert_eq!(request.log_group_name, "group"),
            other => panic!("expected CreateLogGroup, got {other:?}"),
        }
        match &calls[2] {
            RecordedCall::CreateStream(request) => {
                assert_eq!(request.log_group_name, "group");
                assert_eq!(request.log_stream_name, "stream");
            }
            other => panic!("expected CreateLogStream, got {other:?}"),
        }
        assert!(matches!(calls[3], RecordedCall::Put(_)));

        let requests = client.put_requests();
        assert_eq!(requests.len(), 2);
        // The retry carries the identical events with no sequence token.
        assert_eq!(requests[1].log_events, requests[0].log_events);
        assert_eq!(requests[1].sequence_token, None);
        assert_eq!(fired.load(Ordering::SeqCst), 2);
        assert_eq!(sender.sequence_token(), Some("after-create"));
    }

    #[tokio::test]
    async fn test_group_already_exists_is_ignored() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::ResourceNotFound("no stream".to_string())));
        client.push_group_result(Err(SinkError::ResourceAlreadyExists("group".to_string())));
        client.push_put_result(Ok(PutLogEventsResponse::default()));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(1, &fired);

        sender.send(&mut buffer, false).await;

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stream_creation_failure_retains_buffer() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::ResourceNotFound("no stream".to_string())));
        client.push_stream_result(Err(SinkError::Service {
            code: "AccessDenied".to_string(),
            message: "nope".to_string(),
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(2, &fired);

        sender.send(&mut buffer, false).await;

        assert_eq!(buffer.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(client.put_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_token_adopts_expected_and_retries() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::InvalidSequenceToken {
            message: "stale".to_string(),
            expected_sequence_token: Some("X".to_string()),
        }));
        client.push_put_result(Ok(PutLogEventsResponse::default()));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(1, &fired);

        sender.send(&mut buffer, false).await;

        let requests = client.put_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].sequence_token.as_deref(), Some("X"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_token_without_expected_retains_buffer() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::InvalidSequenceToken {
            message: "stale".to_string(),
            expected_sequence_token: None,
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(2, &fired);

        sender.send(&mut buffer, false).await;

        assert_eq!(buffer.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(client.put_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_service_error_drops_events_without_callbacks() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::Service {
            code: "DataAlreadyAcceptedException".to_string(),
            message: "dup".to_string(),
        }));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(4, &fired);

        sender.send(&mut buffer, false).await;

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(client.put_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_drops_events_without_callbacks() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Err(SinkError::Transport("connection reset".to_string())));
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(1, &fired);

        sender.send(&mut buffer, false).await;

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_retry_budget_bounds_persistent_resource_errors() {
        let client = Arc::new(MockCloudWatchLogs::default());
        for _ in 0..10 {
            client.push_put_result(Err(SinkError::ResourceNotFound("still gone".to_string())));
        }
        let mut sender = create_sender(&client);
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(2, &fired);

        sender.send(&mut buffer, false).await;

        assert_eq!(client.put_requests().len(), SEND_RETRY_LIMIT);
        assert_eq!(buffer.len(), 2);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_buffer_sorted_before_send() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.push_put_result(Ok(PutLogEventsResponse::default()));
        let mut sender = create_sender(&client);
        let mut buffer = BatchBuffer::default();
        for timestamp in [3_000_i64, 1_000, 2_000] {
            buffer.append(
                InputLogEvent {
                    message: format!("t-{timestamp}"),
                    timestamp,
                },
                None,
            );
        }

        sender.send(&mut buffer, false).await;

        let requests = client.put_requests();
        let timestamps: Vec<i64> = requests[0].log_events.iter().map(|e| e.timestamp).collect();
        assert_eq!(timestamps, vec![1_000, 2_000, 3_000]);
    }

    #[tokio::test]
    async fn test_cancellation_race_drops_in_flight_batch() {
        let client = Arc::new(MockCloudWatchLogs::default());
        client.set_put_delay(std::time::Duration::from_secs(30));
        let cancel_token = CancellationToken::new();
        let mut sender = Sender::new(
            Target::new("group", "stream"),
            Arc::clone(&client) as Arc<dyn CloudWatchLogs>,
            cancel_token.clone(),
        );
        let fired = Arc::new(AtomicUsize::new(0));
        let mut buffer = create_buffer(1, &fired);

        let cancel = cancel_token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        });

        tokio::time::timeout(std::time::Duration::from_secs(5), sender.send(&mut buffer, true))
            .await
            .expect("send did not observe cancellation");

        assert!(buffer.is_empty());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
