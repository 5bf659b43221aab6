//! Scripted sink client shared by the pusher tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::sink::{
    CloudWatchLogs, CreateLogGroupRequest, CreateLogStreamRequest, PutLogEventsRequest,
    PutLogEventsResponse, SinkError,
};

/// One recorded sink operation, in call order.
#[derive(Clone, Debug)]
pub(crate) enum RecordedCall {
    Put(PutLogEventsRequest),
    CreateGroup(CreateLogGroupRequest),
    CreateStream(CreateLogStreamRequest),
}

/// Mock sink: records every call and replays scripted results.
///
/// When no result is scripted, operations succeed; `put_log_events` then
/// issues a fresh `token-N` sequence token, recorded in `issued_tokens` so
/// tests can assert the token round-trip.
#[derive(Default)]
pub(crate) struct MockCloudWatchLogs {
    calls: Mutex<Vec<RecordedCall>>,
    put_results: Mutex<VecDeque<Result<PutLogEventsResponse, SinkError>>>,
    group_results: Mutex<VecDeque<Result<(), SinkError>>>,
    stream_results: Mutex<VecDeque<Result<(), SinkError>>>,
    issued_tokens: Mutex<Vec<String>>,
    put_delay: Mutex<Option<Duration>>,
}

impl MockCloudWatchLogs {
    pub(crate) fn push_put_result(&self, result: Result<PutLogEventsResponse, SinkError>) {
        self.put_results.lock().expect("lock").push_back(result);
    }

    pub(crate) fn push_group_result(&self, result: Result<(), SinkError>) {
        self.group_results.lock().expect("lock").push_back(result);
    }

    pub(crate) fn push_stream_result(&self, result: Result<(), SinkError>) {
        self.stream_results.lock().expect("lock").push_back(result);
    }

    /// Delays every `put_log_events` call, for cancellation tests.
    pub(crate) fn set_put_delay(&self, delay: Duration) {
        *self.put_delay.lock().expect("lock") = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("lock").clone()
    }

    pub(crate) fn put_requests(&self) -> Vec<PutLogEventsRequest> {
        self.calls
            .lock()
            .expect("lock")
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Put(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn issued_tokens(&self) -> Vec<String> {
        self.issued_tokens.lock().expect("lock").clone()
    }
}

#[async_trait]
impl CloudWatchLogs for MockCloudWatchLogs {
    async fn put_log_events(
        &self,
        request: PutLogEventsRequest,
    ) -> Result<PutLogEventsResponse, SinkError> {
        self.calls
            .lock()
            .expect("lock")
            .push(RecordedCall::Put(request));

        let delay = *self.put_delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.put_results.lock().expect("lock").pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let mut tokens = self.issued_tokens.lock().expect("lock");
                let token = format!("token-{}", tokens.len() + 1);
                tokens.push(token.clone());
                Ok(PutLogEventsResponse {
                    next_sequence_token: Some(token),
                    rejected_log_events_info: None,
                })
            }
        }
    }

    async fn create_log_group(&self, request: CreateLogGroupRequest) -> Result<(), SinkError> {
        self.calls
            .lock()
            .expect("lock")
            .push(RecordedCall::CreateGroup(request));
        self.group_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn create_log_stream(&self, request: CreateLogStreamRequest) -> Result<(), SinkError> {
        self.calls
            .lock()
            .expect("lock")
            .push(RecordedCall::CreateStream(request));
        self.stream_results
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}
