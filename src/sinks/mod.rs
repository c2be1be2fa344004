//! Side-effect sinks notified once a record reaches `SUCCESS`.
//!
//! Sinks are best-effort. Their failures are logged and collected but never
//! touch the record's status.

use crate::domain::TransactionRecord;
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

pub mod analytics;
pub mod automation;
pub mod mock;

pub use analytics::AnalyticsSink;
pub use automation::AutomationWebhookSink;
pub use mock::{FailingSink, RecordingSink};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP error {0}")]
    Http(u16),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait SideEffectSink: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, record: &TransactionRecord) -> Result<(), SinkError>;
}

/// Per-sink result of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl FanoutReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Notify every sink concurrently, each bounded by `per_sink_timeout`.
pub async fn fan_out(
    sinks: &[Arc<dyn SideEffectSink>],
    record: &TransactionRecord,
    per_sink_timeout: Duration,
) -> FanoutReport {
    let calls = sinks.iter().map(|sink| async move {
        let result = match tokio::time::timeout(per_sink_timeout, sink.notify(record)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(per_sink_timeout)),
        };
        (sink.name().to_string(), result)
    });

    let mut report = FanoutReport::default();
    for (name, result) in join_all(calls).await {
        match result {
            Ok(()) => {
                debug!(sink = %name, record_id = %record.id, "Sink notified");
                report.delivered.push(name);
            }
            Err(e) => {
                warn!(
                    sink = %name,
                    record_id = %record.id,
                    event_id = %record.event_id,
                    error = %e,
                    "Sink notification failed"
                );
                report.failed.push((name, e.to_string()));
            }
        }
    }
    report
}

/// JSON summary of a settled record, shared by the HTTP sinks.
pub(crate) fn record_summary(record: &TransactionRecord) -> serde_json::Value {
    serde_json::json!({
        "recordId": record.id,
        "eventId": record.event_id,
        "businessKey": record.business_key,
        "kind": record.kind,
        "user": record.user,
        "status": record.status,
        "transactionHash": record.transaction_hash,
        "chainId": record.payload.chain_id(),
        "recipient": record.payload.recipient(),
        "amount": record.payload.amount(),
        "settledAt": record.date_added.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Address, BusinessKey, Decimal, DistributionKind, EventId, Payload, UserId,
    };

    pub(crate) fn settled_record() -> TransactionRecord {
        let mut record = TransactionRecord::new(
            EventId::new("e1"),
            BusinessKey::derive(DistributionKind::Transfer, &["u1", "e1"]),
            DistributionKind::Transfer,
            UserId::new("u1"),
            Payload::Transfer {
                chain_id: "137".to_string(),
                token: "RWD".to_string(),
                recipient: Address::new("0xabc"),
                amount: Decimal::from_str_canonical("7.25").unwrap(),
                memo: None,
            },
        );
        record.status = crate::domain::TxStatus::Success;
        record.transaction_hash = Some("0x1".to_string());
        record
    }

    #[tokio::test]
    async fn test_fan_out_collects_failures_without_stopping_others() {
        let ok = Arc::new(RecordingSink::new("ok"));
        let sinks: Vec<Arc<dyn SideEffectSink>> = vec![
            ok.clone(),
            Arc::new(FailingSink::new("broken")),
        ];
        let record = settled_record();

        let report = fan_out(&sinks, &record, Duration::from_secs(1)).await;
        assert_eq!(report.delivered, vec!["ok".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert_eq!(ok.notified(), vec![record.id]);
    }

    #[tokio::test]
    async fn test_fan_out_times_out_slow_sink() {
        let sinks: Vec<Arc<dyn SideEffectSink>> =
            vec![Arc::new(RecordingSink::new("slow").with_delay(Duration::from_millis(500)))];

        let report = fan_out(&sinks, &settled_record(), Duration::from_millis(20)).await;
        assert!(!report.all_delivered());
        assert!(report.failed[0].1.contains("timed out"));
    }

    #[tokio::test]
    async fn test_fan_out_notifies_sinks_concurrently() {
        let first = Arc::new(RecordingSink::new("first").with_delay(Duration::from_millis(200)));
        let second = Arc::new(RecordingSink::new("second").with_delay(Duration::from_millis(200)));
        let sinks: Vec<Arc<dyn SideEffectSink>> = vec![first.clone(), second.clone()];

        let started = std::time::Instant::now();
        let report = fan_out(&sinks, &settled_record(), Duration::from_secs(2)).await;
        let elapsed = started.elapsed();

        assert!(report.all_delivered());
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(first.count(), 1);
        assert_eq!(second.count(), 1);
        // Sequential delivery would take at least 400ms.
        assert!(elapsed < Duration::from_millis(350), "fan-out took {:?}", elapsed);
    }

    #[test]
    fn test_record_summary_fields() {
        let summary = record_summary(&settled_record());
        assert_eq!(summary["status"], "SUCCESS");
        assert_eq!(summary["amount"], "7.25");
        assert_eq!(summary["transactionHash"], "0x1");
        assert_eq!(summary["kind"], "transfer");
    }
}
