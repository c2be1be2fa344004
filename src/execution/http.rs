//! HTTP client for the wallet-execution service.

use super::{ExecutionClient, ExecutionError, RemoteStatus, SubmitOutcome};
use crate::domain::Payload;
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_BUDGET: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationBody {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    transaction_hash: Option<String>,
    #[serde(default)]
    operation_handle: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Submits operations to `{base}/v1/operations` with a bearer key.
#[derive(Debug, Clone)]
pub struct HttpExecutionClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    retry_budget: Duration,
}

impl HttpExecutionClient {
    pub fn new(base_url: String, api_key: Option<String>) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ExecutionError::Other(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            retry_budget: RETRY_BUDGET,
        })
    }

    /// Cap the total time spent retrying transient failures.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(100).min(self.retry_budget),
            max_elapsed_time: Some(self.retry_budget),
            ..Default::default()
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    /// `{base}/v1/operations/{handle}` with the handle as one escaped path segment.
    fn operation_url(&self, handle: &str) -> Result<Url, ExecutionError> {
        let mut url = Url::parse(&format!("{}/v1/operations", self.base_url))
            .map_err(|e| ExecutionError::Other(format!("invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                ExecutionError::Other(format!("base URL {} cannot hold a path", self.base_url))
            })?
            .push(handle);
        Ok(url)
    }

    /// Send with retries on network errors, 429 and 5xx. Other statuses are
    /// returned to the caller.
    async fn send_retrying<F>(&self, build: F) -> Result<Response, ExecutionError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        retry(self.backoff(), || async {
            let response = build().send().await.map_err(|e| {
                backoff::Error::transient(ExecutionError::Network(e.to_string()))
            })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(backoff::Error::transient(ExecutionError::RateLimited));
            }
            if status.is_server_error() {
                return Err(backoff::Error::transient(ExecutionError::Http {
                    status: status.as_u16(),
                    message: "Server error".to_string(),
                }));
            }
            Ok(response)
        })
        .await
    }

    async fn parse_body(response: Response) -> Result<OperationBody, ExecutionError> {
        response
            .json::<OperationBody>()
            .await
            .map_err(|e| ExecutionError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn submit(
        &self,
        record_id: Uuid,
        payload: &Payload,
    ) -> Result<SubmitOutcome, ExecutionError> {
        let url = format!("{}/v1/operations", self.base_url);
        let idempotency_key = record_id.to_string();
        debug!(record_id = %record_id, chain_id = payload.chain_id(), "Submitting operation");

        let response = self
            .send_retrying(|| {
                self.authorize(self.client.post(&url))
                    .header("Idempotency-Key", &idempotency_key)
                    .json(payload)
            })
            .await?;

        let status = response.status();
        if status.is_client_error() {
            let reason = match Self::parse_body(response).await {
                Ok(body) => body
                    .error
                    .or(body.reason)
                    .unwrap_or_else(|| format!("status {}", status.as_u16())),
                Err(_) => format!("status {}", status.as_u16()),
            };
            warn!(record_id = %record_id, status = status.as_u16(), reason = %reason, "Operation rejected");
            return Ok(SubmitOutcome::Rejected(reason));
        }
        if !status.is_success() {
            return Err(ExecutionError::Http {
                status: status.as_u16(),
                message: "Unexpected status".to_string(),
            });
        }

        let body = Self::parse_body(response).await?;
        if let Some(hash) = body.transaction_hash.filter(|h| !h.is_empty()) {
            return Ok(SubmitOutcome::Hash(hash));
        }
        if let Some(handle) = body.operation_handle.filter(|h| !h.is_empty()) {
            return Ok(SubmitOutcome::Handle(handle));
        }
        Ok(SubmitOutcome::Rejected(
            body.error
                .unwrap_or_else(|| "response carried neither hash nor handle".to_string()),
        ))
    }

    async fn status_by_handle(&self, handle: &str) -> Result<RemoteStatus, ExecutionError> {
        let url = self.operation_url(handle)?;
        debug!(handle = %handle, "Polling operation");

        let response = self
            .send_retrying(|| self.authorize(self.client.get(url.clone())))
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExecutionError::Http {
                status: status.as_u16(),
                message: "Client error".to_string(),
            });
        }

        let body = Self::parse_body(response).await?;
        match body.status.as_deref() {
            Some("SUCCESS") => Ok(RemoteStatus::Confirmed {
                hash: body.transaction_hash.filter(|h| !h.is_empty()),
            }),
            Some("FAILURE") => Ok(RemoteStatus::Failed {
                reason: body
                    .reason
                    .or(body.error)
                    .unwrap_or_else(|| "operation failed".to_string()),
            }),
            Some("PENDING") | Some("PENDING_HASH") => Ok(RemoteStatus::Pending),
            other => Err(ExecutionError::Parse(format!(
                "unknown operation status: {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Decimal};
    use mockito::Matcher;
    use std::str::FromStr;

    fn payload() -> Payload {
        Payload::Transfer {
            chain_id: "137".to_string(),
            token: "RWD".to_string(),
            recipient: Address::new("0xabc"),
            amount: Decimal::from_str("5").unwrap(),
            memo: None,
        }
    }

    fn client(url: String) -> HttpExecutionClient {
        HttpExecutionClient::new(url, Some("secret".to_string()))
            .unwrap()
            .with_retry_budget(Duration::from_millis(300))
    }

    #[tokio::test]
    async fn test_submit_returns_hash_and_sends_idempotency_key() {
        let mut server = mockito::Server::new_async().await;
        let id = Uuid::new_v4();
        let mock = server
            .mock("POST", "/v1/operations")
            .match_header("authorization", "Bearer secret")
            .match_header("idempotency-key", id.to_string().as_str())
            .match_body(Matcher::PartialJson(serde_json::json!({"type": "transfer"})))
            .with_status(200)
            .with_body(r#"{"transactionHash":"0x1"}"#)
            .create_async()
            .await;

        let outcome = client(server.url()).submit(id, &payload()).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Hash("0x1".to_string()));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_submit_returns_handle() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/operations")
            .with_status(202)
            .with_body(r#"{"operationHandle":"op-7"}"#)
            .create_async()
            .await;

        let outcome = client(server.url())
            .submit(Uuid::new_v4(), &payload())
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Handle("op-7".to_string()));
    }

    #[tokio::test]
    async fn test_submit_client_error_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/operations")
            .with_status(422)
            .with_body(r#"{"error":"insufficient balance"}"#)
            .create_async()
            .await;

        let outcome = client(server.url())
            .submit(Uuid::new_v4(), &payload())
            .await
            .unwrap();
        assert_eq!(outcome, SubmitOutcome::Rejected("insufficient balance".to_string()));
    }

    #[tokio::test]
    async fn test_submit_server_error_exhausts_retries() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v1/operations")
            .with_status(500)
            .expect_at_least(1)
            .create_async()
            .await;

        let err = client(server.url())
            .submit(Uuid::new_v4(), &payload())
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Http { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_status_by_handle() {
        let mut server = mockito::Server::new_async().await;
        let _ok = server
            .mock("GET", "/v1/operations/op-1")
            .with_status(200)
            .with_body(r#"{"status":"SUCCESS","transactionHash":"0xdead"}"#)
            .create_async()
            .await;
        let _failed = server
            .mock("GET", "/v1/operations/op-2")
            .with_status(200)
            .with_body(r#"{"status":"FAILURE","reason":"reverted"}"#)
            .create_async()
            .await;
        let _pending = server
            .mock("GET", "/v1/operations/op-3")
            .with_status(200)
            .with_body(r#"{"status":"PENDING"}"#)
            .create_async()
            .await;

        let c = client(server.url());
        assert_eq!(
            c.status_by_handle("op-1").await.unwrap(),
            RemoteStatus::Confirmed {
                hash: Some("0xdead".to_string())
            }
        );
        assert_eq!(
            c.status_by_handle("op-2").await.unwrap(),
            RemoteStatus::Failed {
                reason: "reverted".to_string()
            }
        );
        assert_eq!(c.status_by_handle("op-3").await.unwrap(), RemoteStatus::Pending);
    }

    #[tokio::test]
    async fn test_status_by_handle_escapes_the_handle() {
        let mut server = mockito::Server::new_async().await;
        let escaped = server
            .mock("GET", "/v1/operations/op%2F1%3Fx")
            .with_status(200)
            .with_body(r#"{"status":"PENDING"}"#)
            .create_async()
            .await;

        let status = client(server.url()).status_by_handle("op/1?x").await.unwrap();
        assert_eq!(status, RemoteStatus::Pending);
        escaped.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_by_handle_not_found_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/v1/operations/missing")
            .with_status(404)
            .create_async()
            .await;

        let err = client(server.url())
            .status_by_handle("missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Http { status: 404, .. }));
    }
}
