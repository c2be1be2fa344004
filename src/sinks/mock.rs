//! In-process sinks for tests.

use super::{SideEffectSink, SinkError};
use crate::domain::TransactionRecord;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

/// Remembers which records it was notified about.
#[derive(Debug)]
pub struct RecordingSink {
    name: String,
    delay: Option<Duration>,
    notified: Mutex<Vec<Uuid>>,
}

impl RecordingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            delay: None,
            notified: Mutex::new(Vec::new()),
        }
    }

    /// Sleep before recording each notification.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn notified(&self) -> Vec<Uuid> {
        self.notified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count(&self) -> usize {
        self.notified().len()
    }
}

#[async_trait]
impl SideEffectSink for RecordingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, record: &TransactionRecord) -> Result<(), SinkError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.notified
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record.id);
        Ok(())
    }
}

/// Always fails.
#[derive(Debug)]
pub struct FailingSink {
    name: String,
}

impl FailingSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl SideEffectSink for FailingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn notify(&self, _record: &TransactionRecord) -> Result<(), SinkError> {
        Err(SinkError::Other(format!("{} is down", self.name)))
    }
}
