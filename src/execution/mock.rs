//! Scripted execution client for tests without network calls.

use super::{ExecutionClient, ExecutionError, RemoteStatus, SubmitOutcome};
use crate::domain::Payload;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Script {
    submits: VecDeque<Result<SubmitOutcome, ExecutionError>>,
    polls: VecDeque<Result<RemoteStatus, ExecutionError>>,
    default_submit: Option<SubmitOutcome>,
    default_poll: Option<RemoteStatus>,
    submitted: Vec<(Uuid, Payload)>,
    polled: Vec<String>,
}

/// Answers calls from queued responses, then from the defaults.
///
/// With nothing queued and no default, calls fail with `ExecutionError::Other`.
#[derive(Debug, Default)]
pub struct MockExecutionClient {
    script: Mutex<Script>,
}

impl MockExecutionClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue one submit response.
    pub fn with_submit(self, outcome: Result<SubmitOutcome, ExecutionError>) -> Self {
        self.lock().submits.push_back(outcome);
        self
    }

    /// Queue one poll response.
    pub fn with_poll(self, status: Result<RemoteStatus, ExecutionError>) -> Self {
        self.lock().polls.push_back(status);
        self
    }

    pub fn with_default_submit(self, outcome: SubmitOutcome) -> Self {
        self.lock().default_submit = Some(outcome);
        self
    }

    pub fn with_default_poll(self, status: RemoteStatus) -> Self {
        self.lock().default_poll = Some(status);
        self
    }

    pub fn submit_calls(&self) -> usize {
        self.lock().submitted.len()
    }

    pub fn poll_calls(&self) -> usize {
        self.lock().polled.len()
    }

    pub fn submissions(&self) -> Vec<(Uuid, Payload)> {
        self.lock().submitted.clone()
    }
}

#[async_trait]
impl ExecutionClient for MockExecutionClient {
    async fn submit(
        &self,
        record_id: Uuid,
        payload: &Payload,
    ) -> Result<SubmitOutcome, ExecutionError> {
        let mut script = self.lock();
        script.submitted.push((record_id, payload.clone()));
        match script.submits.pop_front() {
            Some(outcome) => outcome,
            None => script
                .default_submit
                .clone()
                .ok_or_else(|| ExecutionError::Other("no scripted submit response".to_string())),
        }
    }

    async fn status_by_handle(&self, handle: &str) -> Result<RemoteStatus, ExecutionError> {
        let mut script = self.lock();
        script.polled.push(handle.to_string());
        match script.polls.pop_front() {
            Some(status) => status,
            None => script
                .default_poll
                .clone()
                .ok_or_else(|| ExecutionError::Other("no scripted poll response".to_string())),
        }
    }
}
