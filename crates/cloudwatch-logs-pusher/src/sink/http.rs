//! HTTP implementation of the log sink contract.
//!
//! CloudWatch Logs speaks a JSON-RPC style protocol: every operation is a
//! POST to the service endpoint with an `X-Amz-Target` header naming the
//! operation and an `application/x-amz-json-1.1` body. Errors come back as
//! a JSON body whose `__type` field carries the exception name, which is how
//! the typed [`SinkError`] variants are recovered.
//!
//! Request signing is deliberately out of scope here: deployments front the
//! endpoint with a signing proxy or inject pre-computed credentials through
//! the configured static headers. The client imposes no deadline of its own
//! beyond the configured request timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::error;

use crate::sink::{
    CloudWatchLogs, CreateLogGroupRequest, CreateLogStreamRequest, PutLogEventsRequest,
    PutLogEventsResponse, SinkError,
};

const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.1";

const TARGET_PUT_LOG_EVENTS: &str = "Logs_20140328.PutLogEvents";
const TARGET_CREATE_LOG_GROUP: &str = "Logs_20140328.CreateLogGroup";
const TARGET_CREATE_LOG_STREAM: &str = "Logs_20140328.CreateLogStream";

/// HTTP client for a CloudWatch Logs style endpoint.
///
/// Cheap to clone; the underlying connection pool is shared. A single client
/// is safe for concurrent calls and is meant to be shared across pushers.
#[derive(Debug, Clone)]
pub struct HttpCloudWatchLogs {
    client: reqwest::Client,
    endpoint: String,
    headers: HeaderMap,
}

impl HttpCloudWatchLogs {
    /// Creates a client for `endpoint` with the given per-request timeout.
    ///
    /// `extra_headers` are attached to every request (auth material supplied
    /// by the deployment). Entries that do not parse as HTTP headers are
    /// skipped with an error log rather than failing construction, so a
    /// misconfigured header cannot take the agent down.
    pub fn new(
        endpoint: impl Into<String>,
        extra_headers: &HashMap<String, String>,
        timeout: Duration,
    ) -> Self {
        let client = match reqwest::Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                error!(
                    "Failed to build HTTP client: {}, falling back to defaults",
                    e
                );
                reqwest::Client::new()
            }
        };

        let mut headers = HeaderMap::new();
        for (name, value) in extra_headers {
            match (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => error!("Skipping invalid sink header {:?}", name),
            }
        }

        HttpCloudWatchLogs {
            client,
            endpoint: endpoint.into(),
            headers,
        }
    }

    async fn call(&self, target: &str, body: String) -> Result<String, SinkError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, AMZ_JSON_CONTENT_TYPE)
            .header("X-Amz-Target", target)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(decode_error(status, &body))
        }
    }
}

#[async_trait]
impl CloudWatchLogs for HttpCloudWatchLogs {
    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, SinkError> {
        let body = serde_json::to_string(&request)
            .map_err(|e| SinkError::Transport(format!("failed to encode request: {e}")))?;
        let body = self.call(TARGET_PUT_LOG_EVENTS, body).await?;
        if body.is_empty() {
            return Ok(PutLogEventsResponse::default());
        }
        serde_json::from_str(&body)
            .map_err(|e| SinkError::Transport(format!("failed to decode response: {e}")))
    }

    async fn create_log_group(&self, request: CreateLogGroupRequest) -> Result<(), SinkError> {
        let body = serde_json::to_string(&request)
            .map_err(|e| SinkError::Transport(format!("failed to encode request: {e}")))?;
        self.call(TARGET_CREATE_LOG_GROUP, body).await?;
        Ok(())
    }

    async fn create_log_stream(&self, request: CreateLogStreamRequest) -> Result<(), SinkError> {
        let body = serde_json::to_string(&request)
            .map_err(|e| SinkError::Transport(format!("failed to encode request: {e}")))?;
        self.call(TARGET_CREATE_LOG_STREAM, body).await?;
        Ok(())
    }
}

/// Maps a non-2xx response to a typed [`SinkError`].
///
/// Error bodies look like `{"__type": "ResourceNotFoundException",
/// "message": "..."}`; some deployments qualify the type as
/// `com.amazonaws...#ResourceNotFoundException`, so only the fragment after
/// `#` is matched. Bodies that do not parse are surfaced as opaque service
/// errors keyed by the HTTP status.
fn decode_error(status: StatusCode, body: &str) -> SinkError {
    #[derive(Deserialize, Default)]
    #[serde(default)]
    struct ErrorBody {
        #[serde(rename = "__type")]
        kind: Option<String>,
        #[serde(alias = "Message")]
        message: Option<String>,
        #[serde(rename = "expectedSequenceToken")]
        expected_sequence_token: Option<String>,
    }

    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .unwrap_or_else(|| format!("HTTP {status}: {body}"));

    let Some(kind) = parsed.kind else {
        return SinkError::Service {
            code: format!("HTTP {}", status.as_u16()),
            message,
        };
    };
    let code = kind.rsplit('#').next().unwrap_or_default().to_string();

    match code.as_str() {
        "ResourceNotFoundException" => SinkError::ResourceNotFound(message),
        "InvalidSequenceTokenException" => SinkError::InvalidSequenceToken {
            message,
            expected_sequence_token: parsed.expected_sequence_token,
        },
        "ResourceAlreadyExistsException" => SinkError::ResourceAlreadyExists(message),
        _ => SinkError::Service { code, message },
    }
}
