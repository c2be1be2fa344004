//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `records.rs` - Transaction records and the referral claim index
//! - `orders.rs` - Purchase orders and leg binding
//! - `directory.rs` - Users, wallets, referral codes and quotes

mod directory;
mod orders;
mod records;

use crate::db::store::{InsertOutcome, RecordStore, ReferralClaim, StoreError};
use crate::domain::{
    BusinessKey, DistributionKind, EventId, Leg, Order, Payload, TimeMs, TransactionRecord,
    TxStatus, UserId,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, event_id, business_key, kind, user_id, status, date_added, \
     operation_handle, transaction_hash, payload, created_at";

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// `?, ?, ?` with one placeholder per status.
fn status_placeholders(statuses: &[TxStatus]) -> String {
    vec!["?"; statuses.len()].join(", ")
}

fn parse_uuid(raw: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Corrupt(format!("invalid uuid {}: {}", raw, e)))
}

fn row_to_record(row: &SqliteRow) -> Result<TransactionRecord, StoreError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");
    let status: String = row.get("status");
    let payload: String = row.get("payload");

    Ok(TransactionRecord {
        id: parse_uuid(&id)?,
        event_id: EventId::new(row.get::<String, _>("event_id")),
        business_key: BusinessKey::from_stored(row.get("business_key")),
        kind: kind
            .parse::<DistributionKind>()
            .map_err(|e| StoreError::Corrupt(format!("record {}: {}", id, e)))?,
        user: UserId::new(row.get::<String, _>("user_id")),
        status: status
            .parse::<TxStatus>()
            .map_err(|e| StoreError::Corrupt(format!("record {}: {}", id, e)))?,
        date_added: TimeMs::new(row.get("date_added")),
        operation_handle: row.get("operation_handle"),
        transaction_hash: row.get("transaction_hash"),
        payload: serde_json::from_str::<Payload>(&payload)
            .map_err(|e| StoreError::Corrupt(format!("record {} payload: {}", id, e)))?,
        created_at: TimeMs::new(row.get("created_at")),
    })
}

#[async_trait]
impl RecordStore for Repository {
    async fn find_by_business_key(
        &self,
        key: &BusinessKey,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        self.get_record_by_business_key(key).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        self.get_record(id).await
    }

    async fn find_by_event_id(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.query_records_by_event(event_id).await
    }

    async fn insert(&self, record: &TransactionRecord) -> Result<InsertOutcome, StoreError> {
        self.insert_record(record).await
    }

    async fn insert_referral(
        &self,
        record: &TransactionRecord,
        claim: &ReferralClaim,
    ) -> Result<InsertOutcome, StoreError> {
        self.insert_record_with_claim(record, claim).await
    }

    async fn find_referral_claim(
        &self,
        claim: &ReferralClaim,
    ) -> Result<Option<Uuid>, StoreError> {
        self.get_referral_claim(claim).await
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TxStatus,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        self.transition_status(id, status, at).await
    }

    async fn set_handle(&self, id: Uuid, handle: &str) -> Result<(), StoreError> {
        self.store_handle(id, handle).await
    }

    async fn mark_pending_hash(
        &self,
        id: Uuid,
        handle: &str,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        self.store_pending_handle(id, handle, at).await
    }

    async fn set_transaction_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        self.store_transaction_hash(id, hash).await
    }

    async fn list_stale(
        &self,
        statuses: &[TxStatus],
        older_than: TimeMs,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        self.query_stale_records(statuses, older_than, limit).await
    }

    async fn insert_order(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        self.insert_order_row(order).await
    }

    async fn find_order(&self, quote_id: &str) -> Result<Option<Order>, StoreError> {
        self.get_order(quote_id).await
    }

    async fn attach_leg(
        &self,
        quote_id: &str,
        leg: Leg,
        record_id: Uuid,
    ) -> Result<(), StoreError> {
        self.bind_leg(quote_id, leg, record_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::{Address, Decimal};
    use std::str::FromStr;
    use tempfile::TempDir;

    pub(super) async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    pub(super) fn make_record(user: &str, event: &str) -> TransactionRecord {
        TransactionRecord::new(
            EventId::new(event),
            BusinessKey::derive(DistributionKind::Transfer, &[user, event]),
            DistributionKind::Transfer,
            UserId::new(user),
            Payload::Transfer {
                chain_id: "137".to_string(),
                token: "RWD".to_string(),
                recipient: Address::new("0xabc"),
                amount: Decimal::from_str("12.5").unwrap(),
                memo: Some("welcome".to_string()),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_and_find_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let record = make_record("u1", "e1");

        assert_eq!(repo.insert(&record).await.unwrap(), InsertOutcome::Inserted);

        let by_key = repo
            .find_by_business_key(&record.business_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_key, record);

        let by_id = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(by_id, record);

        let by_event = repo.find_by_event_id(&record.event_id).await.unwrap();
        assert_eq!(by_event, vec![record]);
    }

    #[tokio::test]
    async fn test_insert_conflict_on_business_key() {
        let (repo, _temp) = setup_repo().await;
        let first = make_record("u1", "e1");
        let mut dup = make_record("u1", "e1");
        dup.id = Uuid::new_v4();

        repo.insert(&first).await.unwrap();
        assert_eq!(repo.insert(&dup).await.unwrap(), InsertOutcome::Conflict);
        assert!(repo.find_by_id(dup.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_edges_are_enforced() {
        let (repo, _temp) = setup_repo().await;
        let record = make_record("u1", "e1");
        repo.insert(&record).await.unwrap();

        repo.update_status(record.id, TxStatus::PendingHash, TimeMs::new(5))
            .await
            .unwrap();
        repo.set_handle(record.id, "op-1").await.unwrap();
        repo.update_status(record.id, TxStatus::Success, TimeMs::new(9))
            .await
            .unwrap();

        let err = repo
            .update_status(record.id, TxStatus::Failure, TimeMs::new(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));

        let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Success);
        assert_eq!(stored.date_added, TimeMs::new(9));
        assert_eq!(stored.operation_handle.as_deref(), Some("op-1"));
    }

    #[tokio::test]
    async fn test_update_status_unknown_record() {
        let (repo, _temp) = setup_repo().await;
        let err = repo
            .update_status(Uuid::new_v4(), TxStatus::Failure, TimeMs::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_handle_requires_pending_hash_and_is_set_once() {
        let (repo, _temp) = setup_repo().await;
        let record = make_record("u1", "e1");
        repo.insert(&record).await.unwrap();

        assert!(matches!(
            repo.set_handle(record.id, "op-1").await,
            Err(StoreError::Invariant { .. })
        ));

        repo.update_status(record.id, TxStatus::PendingHash, TimeMs::now())
            .await
            .unwrap();
        repo.set_handle(record.id, "op-1").await.unwrap();
        assert!(repo.set_handle(record.id, "op-2").await.is_err());
    }

    #[tokio::test]
    async fn test_mark_pending_hash_is_one_guarded_write() {
        let (repo, _temp) = setup_repo().await;
        let record = make_record("u1", "e1");
        repo.insert(&record).await.unwrap();

        repo.mark_pending_hash(record.id, "op-1", TimeMs::new(42))
            .await
            .unwrap();
        let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::PendingHash);
        assert_eq!(stored.operation_handle.as_deref(), Some("op-1"));
        assert_eq!(stored.date_added, TimeMs::new(42));

        assert!(matches!(
            repo.mark_pending_hash(record.id, "op-2", TimeMs::new(43)).await,
            Err(StoreError::IllegalTransition { .. })
        ));
        assert!(matches!(
            repo.mark_pending_hash(Uuid::new_v4(), "op-3", TimeMs::new(43)).await,
            Err(StoreError::NotFound(_))
        ));
        let stored = repo.find_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(stored.operation_handle.as_deref(), Some("op-1"));
        assert_eq!(stored.date_added, TimeMs::new(42));
    }

    #[tokio::test]
    async fn test_transaction_hash_set_once_before_terminal() {
        let (repo, _temp) = setup_repo().await;
        let record = make_record("u1", "e1");
        repo.insert(&record).await.unwrap();

        repo.set_transaction_hash(record.id, "0x1").await.unwrap();
        assert!(repo.set_transaction_hash(record.id, "0x2").await.is_err());

        let other = make_record("u1", "e2");
        repo.insert(&other).await.unwrap();
        repo.update_status(other.id, TxStatus::Failure, TimeMs::now())
            .await
            .unwrap();
        assert!(repo.set_transaction_hash(other.id, "0x3").await.is_err());
    }

    #[tokio::test]
    async fn test_referral_claim_index() {
        let (repo, _temp) = setup_repo().await;
        let claim = ReferralClaim {
            referent: UserId::new("ref"),
            new_user: UserId::new("new"),
        };
        let first = make_record("ref", "e1");
        let second = make_record("ref", "e2");

        assert_eq!(
            repo.insert_referral(&first, &claim).await.unwrap(),
            InsertOutcome::Inserted
        );
        assert_eq!(
            repo.insert_referral(&second, &claim).await.unwrap(),
            InsertOutcome::ClaimTaken { record_id: first.id }
        );
        assert!(repo.find_by_id(second.id).await.unwrap().is_none());
        assert_eq!(repo.find_referral_claim(&claim).await.unwrap(), Some(first.id));
    }

    #[tokio::test]
    async fn test_list_stale() {
        let (repo, _temp) = setup_repo().await;
        let mut old = make_record("u1", "e1");
        old.date_added = TimeMs::new(1_000);
        let mut done = make_record("u1", "e2");
        done.date_added = TimeMs::new(1_000);
        let fresh = make_record("u1", "e3");
        repo.insert(&old).await.unwrap();
        repo.insert(&done).await.unwrap();
        repo.insert(&fresh).await.unwrap();
        repo.update_status(done.id, TxStatus::Success, TimeMs::new(1_000))
            .await
            .unwrap();

        let stale = repo
            .list_stale(
                &[TxStatus::Pending, TxStatus::PendingHash],
                TimeMs::new(2_000),
                50,
            )
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old.id);
    }
}
