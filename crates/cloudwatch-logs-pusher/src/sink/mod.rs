//! Log sink contract consumed by the pusher.
//!
//! The pusher talks to the sink through the [`CloudWatchLogs`] trait, which
//! covers the three operations it needs: `PutLogEvents` for delivery and
//! `CreateLogGroup` / `CreateLogStream` for on-demand resource creation.
//! The trait keeps the worker testable (see the scripted mock in the pusher
//! tests) and keeps transport concerns out of the batching core; the
//! production implementation lives in [`http`].
//!
//! # Typed errors
//!
//! The sink distinguishes three error types the pusher recovers from or
//! reasons about ([`SinkError::ResourceNotFound`],
//! [`SinkError::InvalidSequenceToken`], [`SinkError::ResourceAlreadyExists`]).
//! Everything else is opaque: either a service error with a code the pusher
//! does not recognize, or a transport failure below the protocol.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod http;

/// A single event on the wire: an opaque message and its timestamp in
/// milliseconds since the epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputLogEvent {
    pub message: String,
    pub timestamp: i64,
}

/// Request body for `PutLogEvents`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PutLogEventsRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
    pub log_events: Vec<InputLogEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_token: Option<String>,
}

/// Response body for `PutLogEvents`.
///
/// `next_sequence_token` must be presented on the next call for the same
/// stream. `rejected_log_events_info`, when present, reports a sub-range the
/// sink dropped even though the request as a whole succeeded.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PutLogEventsResponse {
    pub next_sequence_token: Option<String>,
    pub rejected_log_events_info: Option<RejectedLogEventsInfo>,
}

/// Sub-range rejection detail attached to an otherwise successful
/// `PutLogEvents` response.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RejectedLogEventsInfo {
    pub too_old_log_event_end_index: Option<i64>,
    pub too_new_log_event_start_index: Option<i64>,
    pub expired_log_event_end_index: Option<i64>,
}

/// Request body for `CreateLogGroup`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogGroupRequest {
    pub log_group_name: String,
}

/// Request body for `CreateLogStream`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogStreamRequest {
    pub log_group_name: String,
    pub log_stream_name: String,
}

/// Errors returned by sink operations.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The log group or stream does not exist yet.
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    /// The presented sequence token is stale. When the sink includes the
    /// token it expected, the caller can adopt it and retry.
    #[error("invalid sequence token: {message}")]
    InvalidSequenceToken {
        message: String,
        expected_sequence_token: Option<String>,
    },

    /// The resource being created already exists.
    #[error("resource already exists: {0}")]
    ResourceAlreadyExists(String),

    /// Any other service-side error, carried with its wire code.
    #[error("service error {code}: {message}")]
    Service { code: String, message: String },

    /// The request never produced a service response (connect failure,
    /// timeout, malformed body).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request was abandoned because the pusher is shutting down.
    #[error("request cancelled by shutdown")]
    Cancelled,
}

/// The three sink operations the pusher consumes.
///
/// Implementations must be safe for concurrent calls; a single sink client is
/// shared by every pusher in the process.
#[async_trait]
pub trait CloudWatchLogs: Send + Sync {
    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, SinkError>;

    async fn create_log_group(&self, request: CreateLogGroupRequest) -> Result<(), SinkError>;

    async fn create_log_stream(&self, request: CreateLogStreamRequest) -> Result<(), SinkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_request_serializes_wire_field_names() {
        let request = PutLogEventsRequest {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            log_events: vec![InputLogEvent {
                message: "hello".to_string(),
                timestamp: 1_700_000_000_000,
            }],
            sequence_token: Some("tok".to_string()),
        };

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["logGroupName"], "group");
        assert_eq!(value["logStreamName"], "stream");
        assert_eq!(value["sequenceToken"], "tok");
        assert_eq!(value["logEvents"][0]["message"], "hello");
        assert_eq!(value["logEvents"][0]["timestamp"], 1_700_000_000_000_i64);
    }

    #[test]
    fn test_put_request_omits_absent_sequence_token() {
        let request = PutLogEventsRequest {
            log_group_name: "group".to_string(),
            log_stream_name: "stream".to_string(),
            log_events: vec![],
            sequence_token: None,
        };

        let value = serde_json::to_value(&request).expect("serialize");
        assert!(value.get("sequenceToken").is_none());
    }

    #[test]
    fn test_put_response_deserializes_rejection_info() {
        let body = r#"{
            "nextSequenceToken": "next",
            "rejectedLogEventsInfo": {"tooOldLogEventEndIndex": 3}
        }"#;

        let response: PutLogEventsResponse = serde_json::from_str(body).expect("deserialize");
        assert_eq!(response.next_sequence_token.as_deref(), Some("next"));
        let info = response.rejected_log_events_info.expect("info");
        assert_eq!(info.too_old_log_event_end_index, Some(3));
        assert_eq!(info.too_new_log_event_start_index, None);
        assert_eq!(info.expired_log_event_end_index, None);
    }

    #[test]
    fn test_put_response_tolerates_empty_body() {
        let response: PutLogEventsResponse = serde_json::from_str("{}").expect("deserialize");
        assert!(response.next_sequence_token.is_none());
        assert!(response.rejected_log_events_info.is_none());
    }

    #[test]
    fn test_sink_error_display() {
        let error = SinkError::InvalidSequenceToken {
            message: "expected 49".to_string(),
            expected_sequence_token: Some("49".to_string()),
        };
        assert_eq!(error.to_string(), "invalid sequence token: expected 49");

        let error = SinkError::Service {
            code: "ThrottlingException".to_string(),
            message: "rate exceeded".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "service error ThrottlingException: rate exceeded"
        );
    }
}
