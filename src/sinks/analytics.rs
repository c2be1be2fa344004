//! Analytics event sink.

use super::{record_summary, SideEffectSink, SinkError};
use crate::domain::TransactionRecord;
use async_trait::async_trait;
use reqwest::Client;

/// Posts a `distribution_succeeded` event to an analytics collector.
#[derive(Debug, Clone)]
pub struct AnalyticsSink {
    client: Client,
    url: String,
}

impl AnalyticsSink {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl SideEffectSink for AnalyticsSink {
    fn name(&self) -> &str {
        "analytics"
    }

    async fn notify(&self, record: &TransactionRecord) -> Result<(), SinkError> {
        let body = serde_json::json!({
            "event": "distribution_succeeded",
            "distinctId": record.user,
            "properties": record_summary(record),
        });

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Http(response.status().as_u16()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::settled_record;
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_posts_distribution_event() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/track")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "event": "distribution_succeeded",
                "distinctId": "u1",
                "properties": {"kind": "transfer", "status": "SUCCESS"}
            })))
            .with_status(200)
            .create_async()
            .await;

        let sink = AnalyticsSink::new(format!("{}/track", server.url()));
        sink.notify(&settled_record()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/track")
            .with_status(500)
            .create_async()
            .await;

        let sink = AnalyticsSink::new(format!("{}/track", server.url()));
        assert_eq!(
            sink.notify(&settled_record()).await.unwrap_err(),
            SinkError::Http(500)
        );
    }
}
