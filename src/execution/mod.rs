//! Boundary to the external wallet-execution service.

use crate::domain::Payload;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod http;
pub mod mock;

pub use http::HttpExecutionClient;
pub use mock::MockExecutionClient;

/// What the service answered to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// Broadcast immediately; the on-chain hash is known.
    Hash(String),
    /// Accepted asynchronously; poll with this handle.
    Handle(String),
    /// Refused without a handle or hash.
    Rejected(String),
}

/// Status of an asynchronous operation, looked up by handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Confirmed { hash: Option<String> },
    Failed { reason: String },
    Pending,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    #[error("rate limited")]
    RateLimited,
    #[error("parse error: {0}")]
    Parse(String),
    #[error("{0}")]
    Other(String),
}

/// Submit and poll operations against the execution service.
///
/// `record_id` is forwarded as the idempotency key, so resubmitting the same
/// record after a crash cannot produce a second effective operation.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn submit(
        &self,
        record_id: Uuid,
        payload: &Payload,
    ) -> Result<SubmitOutcome, ExecutionError>;

    async fn status_by_handle(&self, handle: &str) -> Result<RemoteStatus, ExecutionError>;
}
