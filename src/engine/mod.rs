//! Transaction lifecycle engine and the dual-leg order aggregator.

use crate::db::StoreError;
use crate::domain::TxStatus;
use crate::sinks::FanoutReport;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

pub mod aggregator;
pub mod lifecycle;

pub use aggregator::aggregate_legs;
pub use lifecycle::LifecycleEngine;

/// Knobs for the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnginePolicy {
    /// How long a `PENDING_HASH` record may wait for confirmation.
    pub treatment_window: Duration,
    /// Settle a `PENDING_HASH` record that never got a handle as `SUCCESS`.
    ///
    /// With this off, such a record is left alone until the treatment
    /// window fails it.
    pub settle_without_handle: bool,
    pub sink_timeout: Duration,
}

impl Default for EnginePolicy {
    fn default() -> Self {
        Self {
            treatment_window: Duration::from_secs(600),
            settle_without_handle: true,
            sink_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The record was already terminal; nothing was done.
    AlreadyHandled { status: TxStatus },
    /// Confirmation did not arrive within the treatment window.
    TimedOut,
    /// The execution service reported the operation failed.
    Failed { reason: String },
    Succeeded {
        hash: Option<String>,
        fanout: FanoutReport,
    },
    /// Submitted; waiting on the execution service under this handle.
    AwaitingConfirmation { handle: String },
    /// Polled; the operation is still in flight.
    StillPending,
    /// `PENDING_HASH` without a handle, and settling it is disabled.
    AwaitingHandle,
    /// The service refused the submission. The record stays `PENDING`.
    SubmitRejected { reason: String },
    /// Submit or poll failed in transport. Retried on redelivery.
    TransientError { detail: String },
}

impl Outcome {
    /// Whether the caller may acknowledge the event.
    pub fn handled(&self) -> bool {
        matches!(
            self,
            Outcome::AlreadyHandled { .. }
                | Outcome::TimedOut
                | Outcome::Failed { .. }
                | Outcome::Succeeded { .. }
        )
    }

    pub fn terminal_status(&self) -> Option<TxStatus> {
        match self {
            Outcome::AlreadyHandled { status } => Some(*status),
            Outcome::TimedOut | Outcome::Failed { .. } => Some(TxStatus::Failure),
            Outcome::Succeeded { .. } => Some(TxStatus::Success),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::AlreadyHandled { .. } => "already_handled",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed { .. } => "failed",
            Outcome::Succeeded { .. } => "succeeded",
            Outcome::AwaitingConfirmation { .. } => "awaiting_confirmation",
            Outcome::StillPending => "still_pending",
            Outcome::AwaitingHandle => "awaiting_handle",
            Outcome::SubmitRejected { .. } => "submit_rejected",
            Outcome::TransientError { .. } => "transient_error",
        }
    }
}

/// `{handled, terminalStatus?}` as exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_status: Option<TxStatus>,
    pub outcome: &'static str,
}

impl From<&Outcome> for Acknowledgement {
    fn from(outcome: &Outcome) -> Self {
        Self {
            handled: outcome.handled(),
            terminal_status: outcome.terminal_status(),
            outcome: outcome.label(),
        }
    }
}

/// Failures the engine does not absorb. Transport errors from the execution
/// service never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
