//! In-memory `RecordStore` with a journal of every mutating call.

use super::store::{InsertOutcome, RecordStore, ReferralClaim, StoreError};
use crate::domain::{
    BusinessKey, EventId, Leg, Order, TimeMs, TransactionRecord, TxStatus, UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// A mutating store call, as seen by the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Insert(Uuid),
    UpdateStatus(Uuid, TxStatus),
    SetHandle(Uuid, String),
    MarkPendingHash(Uuid, String),
    SetTransactionHash(Uuid, String),
    InsertOrder(String),
    AttachLeg(String, Leg, Uuid),
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Uuid, TransactionRecord>,
    by_key: HashMap<BusinessKey, Uuid>,
    claims: HashMap<(UserId, UserId), Uuid>,
    orders: HashMap<String, Order>,
    journal: Vec<StoreCall>,
    fail_pending_hash: bool,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Place a record as-is, bypassing taxonomy checks and the journal.
    pub fn seed(&self, record: TransactionRecord) {
        let mut inner = self.lock();
        inner.by_key.insert(record.business_key.clone(), record.id);
        inner.records.insert(record.id, record);
    }

    /// The next `mark_pending_hash` fails with a database error and writes nothing.
    pub fn fail_next_pending_hash(&self) {
        self.lock().fail_pending_hash = true;
    }

    pub fn journal(&self) -> Vec<StoreCall> {
        self.lock().journal.clone()
    }

    /// Statuses written for one record, in order.
    pub fn status_updates(&self, id: Uuid) -> Vec<TxStatus> {
        self.lock()
            .journal
            .iter()
            .filter_map(|call| match call {
                StoreCall::UpdateStatus(rid, status) if *rid == id => Some(*status),
                StoreCall::MarkPendingHash(rid, _) if *rid == id => Some(TxStatus::PendingHash),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, id: Uuid) -> Option<TransactionRecord> {
        self.lock().records.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_business_key(
        &self,
        key: &BusinessKey,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let inner = self.lock();
        Ok(inner
            .by_key
            .get(key)
            .and_then(|id| inner.records.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.lock().records.get(&id).cloned())
    }

    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .records
            .values()
            .filter(|r| &r.event_id == event_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    async fn insert(&self, record: &TransactionRecord) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock();
        if inner.by_key.contains_key(&record.business_key) {
            return Ok(InsertOutcome::Conflict);
        }
        inner.by_key.insert(record.business_key.clone(), record.id);
        inner.records.insert(record.id, record.clone());
        inner.journal.push(StoreCall::Insert(record.id));
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_referral(
        &self,
        record: &TransactionRecord,
        claim: &ReferralClaim,
    ) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock();
        if inner.by_key.contains_key(&record.business_key) {
            return Ok(InsertOutcome::Conflict);
        }
        let pair = (claim.referent.clone(), claim.new_user.clone());
        if let Some(existing) = inner.claims.get(&pair) {
            return Ok(InsertOutcome::ClaimTaken {
                record_id: *existing,
            });
        }
        inner.claims.insert(pair, record.id);
        inner.by_key.insert(record.business_key.clone(), record.id);
        inner.records.insert(record.id, record.clone());
        inner.journal.push(StoreCall::Insert(record.id));
        Ok(InsertOutcome::Inserted)
    }

    async fn find_referral_claim(
        &self,
        claim: &ReferralClaim,
    ) -> Result<Option<Uuid>, StoreError> {
        let pair = (claim.referent.clone(), claim.new_user.clone());
        Ok(self.lock().claims.get(&pair).copied())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TxStatus,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if !record.status.can_transition_to(status) {
            return Err(StoreError::IllegalTransition { id, to: status });
        }
        record.status = status;
        record.date_added = at;
        inner.journal.push(StoreCall::UpdateStatus(id, status));
        Ok(())
    }

    async fn set_handle(&self, id: Uuid, handle: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status != TxStatus::PendingHash || record.operation_handle.is_some() {
            return Err(StoreError::Invariant {
                id,
                detail: format!(
                    "handle may only be set once while PENDING_HASH (status {})",
                    record.status
                ),
            });
        }
        record.operation_handle = Some(handle.to_string());
        inner.journal.push(StoreCall::SetHandle(id, handle.to_string()));
        Ok(())
    }

    async fn mark_pending_hash(
        &self,
        id: Uuid,
        handle: &str,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if std::mem::take(&mut inner.fail_pending_hash) {
            return Err(StoreError::Db(sqlx::Error::PoolTimedOut));
        }
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status != TxStatus::Pending {
            return Err(StoreError::IllegalTransition {
                id,
                to: TxStatus::PendingHash,
            });
        }
        if record.operation_handle.is_some() {
            return Err(StoreError::Invariant {
                id,
                detail: "handle already set on a PENDING record".to_string(),
            });
        }
        record.status = TxStatus::PendingHash;
        record.operation_handle = Some(handle.to_string());
        record.date_added = at;
        inner
            .journal
            .push(StoreCall::MarkPendingHash(id, handle.to_string()));
        Ok(())
    }

    async fn set_transaction_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let record = inner.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if record.status.is_terminal() || record.transaction_hash.is_some() {
            return Err(StoreError::Invariant {
                id,
                detail: format!(
                    "transaction hash may only be set once before a terminal status (status {})",
                    record.status
                ),
            });
        }
        record.transaction_hash = Some(hash.to_string());
        inner
            .journal
            .push(StoreCall::SetTransactionHash(id, hash.to_string()));
        Ok(())
    }

    async fn list_stale(
        &self,
        statuses: &[TxStatus],
        older_than: TimeMs,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let mut records: Vec<_> = self
            .lock()
            .records
            .values()
            .filter(|r| statuses.contains(&r.status) && r.date_added <= older_than)
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.date_added, r.id));
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock();
        if inner.orders.contains_key(&order.quote_id) {
            return Ok(InsertOutcome::Conflict);
        }
        inner.orders.insert(order.quote_id.clone(), order.clone());
        inner
            .journal
            .push(StoreCall::InsertOrder(order.quote_id.clone()));
        Ok(InsertOutcome::Inserted)
    }

    async fn find_order(&self, quote_id: &str) -> Result<Option<Order>, StoreError> {
        Ok(self.lock().orders.get(quote_id).cloned())
    }

    async fn attach_leg(
        &self,
        quote_id: &str,
        leg: Leg,
        record_id: Uuid,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let order = inner
            .orders
            .get_mut(quote_id)
            .ok_or_else(|| StoreError::Corrupt(format!("order {} not found", quote_id)))?;
        let slot = match leg {
            Leg::Token => &mut order.token_leg_id,
            Leg::Fiat => &mut order.fiat_leg_id,
        };
        if slot.is_none() {
            *slot = Some(record_id);
            inner
                .journal
                .push(StoreCall::AttachLeg(quote_id.to_string(), leg, record_id));
        }
        Ok(())
    }
}
