//! Automation webhook sink (workflow triggers on settled distributions).

use super::{record_summary, SideEffectSink, SinkError};
use crate::domain::TransactionRecord;
use async_trait::async_trait;
use reqwest::Client;

pub const SECRET_HEADER: &str = "X-Webhook-Secret";

#[derive(Debug, Clone)]
pub struct AutomationWebhookSink {
    client: Client,
    url: String,
    secret: Option<String>,
}

impl AutomationWebhookSink {
    pub fn new(url: String, secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            url,
            secret,
        }
    }
}

#[async_trait]
impl SideEffectSink for AutomationWebhookSink {
    fn name(&self) -> &str {
        "automation_webhook"
    }

    async fn notify(&self, record: &TransactionRecord) -> Result<(), SinkError> {
        let mut request = self.client.post(&self.url).json(&record_summary(record));
        if let Some(secret) = &self.secret {
            request = request.header(SECRET_HEADER, secret);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(SinkError::Http(response.status().as_u16()));
        }
        Ok(())
    }
}
