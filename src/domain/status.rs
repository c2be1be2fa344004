//! Transaction status taxonomy and the reported order status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lifecycle status of a transaction record.
///
/// Allowed edges:
/// `PENDING -> PENDING_HASH | SUCCESS | FAILURE`, `PENDING_HASH -> SUCCESS | FAILURE`.
/// Nothing leaves `SUCCESS` or `FAILURE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    /// Created; not yet submitted, or the submission result is unknown.
    Pending,
    /// Accepted by the execution service; waiting for a transaction hash.
    PendingHash,
    Success,
    Failure,
}

impl TxStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Success | TxStatus::Failure)
    }

    pub fn can_transition_to(&self, next: TxStatus) -> bool {
        matches!(
            (self, next),
            (TxStatus::Pending, TxStatus::PendingHash)
                | (TxStatus::Pending, TxStatus::Success)
                | (TxStatus::Pending, TxStatus::Failure)
                | (TxStatus::PendingHash, TxStatus::Success)
                | (TxStatus::PendingHash, TxStatus::Failure)
        )
    }

    /// Statuses from which `self` may be entered.
    pub fn predecessors(&self) -> &'static [TxStatus] {
        match self {
            TxStatus::Pending => &[],
            TxStatus::PendingHash => &[TxStatus::Pending],
            TxStatus::Success | TxStatus::Failure => &[TxStatus::Pending, TxStatus::PendingHash],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Pending => "PENDING",
            TxStatus::PendingHash => "PENDING_HASH",
            TxStatus::Success => "SUCCESS",
            TxStatus::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown transaction status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for TxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TxStatus::Pending),
            "PENDING_HASH" => Ok(TxStatus::PendingHash),
            "SUCCESS" => Ok(TxStatus::Success),
            "FAILURE" => Ok(TxStatus::Failure),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Externally reported status of a two-leg purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Success,
    Failure,
}

impl From<TxStatus> for OrderStatus {
    /// `PENDING_HASH` is an awaiting-confirmation sub-state and reports as `PENDING`.
    fn from(status: TxStatus) -> Self {
        match status {
            TxStatus::Pending | TxStatus::PendingHash => OrderStatus::Pending,
            TxStatus::Success => OrderStatus::Success,
            TxStatus::Failure => OrderStatus::Failure,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderStatus::Pending => f.write_str("PENDING"),
            OrderStatus::Success => f.write_str("SUCCESS"),
            OrderStatus::Failure => f.write_str("FAILURE"),
        }
    }
}
