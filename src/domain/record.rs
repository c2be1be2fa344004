//! Transaction records and their immutable payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Address, BusinessKey, Decimal, DistributionKind, EventId, TimeMs, TxStatus, UserId};

/// What the execution service is asked to do. Immutable once a record exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Transfer {
        chain_id: String,
        token: String,
        recipient: Address,
        amount: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        memo: Option<String>,
    },
    Swap {
        chain_id: String,
        sell_token: String,
        buy_token: String,
        recipient: Address,
        amount: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_out: Option<Decimal>,
    },
    Vesting {
        chain_id: String,
        token: String,
        beneficiary: Address,
        amount: Decimal,
        start_ms: i64,
        cliff_ms: i64,
        duration_ms: i64,
    },
}

impl Payload {
    pub fn chain_id(&self) -> &str {
        match self {
            Payload::Transfer { chain_id, .. }
            | Payload::Swap { chain_id, .. }
            | Payload::Vesting { chain_id, .. } => chain_id,
        }
    }

    pub fn amount(&self) -> Decimal {
        match self {
            Payload::Transfer { amount, .. }
            | Payload::Swap { amount, .. }
            | Payload::Vesting { amount, .. } => *amount,
        }
    }

    /// Address that ends up holding the funds.
    pub fn recipient(&self) -> &Address {
        match self {
            Payload::Transfer { recipient, .. } | Payload::Swap { recipient, .. } => recipient,
            Payload::Vesting { beneficiary, .. } => beneficiary,
        }
    }
}

/// One distribution attempt for one logical event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub event_id: EventId,
    pub business_key: BusinessKey,
    pub kind: DistributionKind,
    pub user: UserId,
    pub status: TxStatus,
    /// Time of the last status transition; anchors the treatment window.
    pub date_added: TimeMs,
    pub operation_handle: Option<String>,
    pub transaction_hash: Option<String>,
    pub payload: Payload,
    pub created_at: TimeMs,
}

impl TransactionRecord {
    /// A fresh `PENDING` record.
    pub fn new(
        event_id: EventId,
        business_key: BusinessKey,
        kind: DistributionKind,
        user: UserId,
        payload: Payload,
    ) -> Self {
        let now = TimeMs::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            business_key,
            kind,
            user,
            status: TxStatus::Pending,
            date_added: now,
            operation_handle: None,
            transaction_hash: None,
            payload,
            created_at: now,
        }
    }
}
