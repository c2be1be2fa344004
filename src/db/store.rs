//! Storage contract the lifecycle engine and distributor depend on.

use crate::domain::{
    BusinessKey, EventId, Leg, Order, TimeMs, TransactionRecord, TxStatus, UserId,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("record {0} not found")]
    NotFound(Uuid),
    #[error("illegal status transition for record {id} to {to}")]
    IllegalTransition { id: Uuid, to: TxStatus },
    #[error("invariant violated for record {id}: {detail}")]
    Invariant { id: Uuid, detail: String },
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result of an insert-or-fail write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer already created a row under the same unique key.
    Conflict,
    /// The `(referent, new_user)` pair is already bound to another record.
    ClaimTaken { record_id: Uuid },
}

/// Second idempotency index entry for referral rewards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferralClaim {
    pub referent: UserId,
    pub new_user: UserId,
}

/// Keyed persistence for transaction records and orders.
///
/// Implementations must be read-your-writes consistent within a process and
/// must enforce the status taxonomy on every mutation.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_business_key(
        &self,
        key: &BusinessKey,
    ) -> Result<Option<TransactionRecord>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError>;

    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Insert a new record; `Conflict` if its business key is taken.
    async fn insert(&self, record: &TransactionRecord) -> Result<InsertOutcome, StoreError>;

    /// Insert a referral record and claim its `(referent, new_user)` pair atomically.
    async fn insert_referral(
        &self,
        record: &TransactionRecord,
        claim: &ReferralClaim,
    ) -> Result<InsertOutcome, StoreError>;

    async fn find_referral_claim(&self, claim: &ReferralClaim)
        -> Result<Option<Uuid>, StoreError>;

    /// Move a record to `status`, stamping `date_added`.
    ///
    /// # Errors
    /// `IllegalTransition` if the current status has no edge to `status`.
    async fn update_status(&self, id: Uuid, status: TxStatus, at: TimeMs)
        -> Result<(), StoreError>;

    /// Record the operation handle; only while `PENDING_HASH` and unset.
    async fn set_handle(&self, id: Uuid, handle: &str) -> Result<(), StoreError>;

    /// Move `PENDING -> PENDING_HASH` and record `handle` in a single write.
    ///
    /// # Errors
    /// `IllegalTransition` unless the record is `PENDING`; `Invariant` if a
    /// handle is already stored. Nothing is written on error.
    async fn mark_pending_hash(&self, id: Uuid, handle: &str, at: TimeMs)
        -> Result<(), StoreError>;

    /// Record the transaction hash; only while non-terminal and unset.
    async fn set_transaction_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError>;

    /// Records in one of `statuses` whose `date_added` is at or before `older_than`.
    async fn list_stale(
        &self,
        statuses: &[TxStatus],
        older_than: TimeMs,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError>;

    /// Insert an order; `Conflict` if the quote already has one.
    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError>;

    async fn find_order(&self, quote_id: &str) -> Result<Option<Order>, StoreError>;

    /// Bind a leg record to an order. A leg that is already bound keeps its record.
    async fn attach_leg(&self, quote_id: &str, leg: Leg, record_id: Uuid)
        -> Result<(), StoreError>;
}
