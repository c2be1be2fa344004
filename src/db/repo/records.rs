//! Transaction record and referral claim operations for the repository.

use crate::db::store::{InsertOutcome, ReferralClaim, StoreError};
use crate::domain::{BusinessKey, EventId, TimeMs, TransactionRecord, TxStatus};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use super::{parse_uuid, row_to_record, status_placeholders, Repository, RECORD_COLUMNS};

const INSERT_RECORD: &str = r#"
    INSERT INTO transaction_records (
        id, event_id, business_key, kind, user_id, status, date_added,
        operation_handle, transaction_hash, payload, created_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(business_key) DO NOTHING
"#;

impl Repository {
    pub async fn get_record(&self, id: Uuid) -> Result<Option<TransactionRecord>, StoreError> {
        let sql = format!("SELECT {} FROM transaction_records WHERE id = ?", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn get_record_by_business_key(
        &self,
        key: &BusinessKey,
    ) -> Result<Option<TransactionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM transaction_records WHERE business_key = ?",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_record).transpose()
    }

    pub async fn query_records_by_event(
        &self,
        event_id: &EventId,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM transaction_records WHERE event_id = ? ORDER BY created_at ASC, id ASC",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(event_id.as_str())
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    /// Insert-or-fail on `business_key`.
    pub async fn insert_record(
        &self,
        record: &TransactionRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let result = bind_record(sqlx::query(INSERT_RECORD), record)?
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(business_key = %record.business_key, "Record insert lost to existing row");
            return Ok(InsertOutcome::Conflict);
        }
        Ok(InsertOutcome::Inserted)
    }

    /// Insert a record and its `(referent, new_user)` claim in one transaction.
    pub async fn insert_record_with_claim(
        &self,
        record: &TransactionRecord,
        claim: &ReferralClaim,
    ) -> Result<InsertOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = bind_record(sqlx::query(INSERT_RECORD), record)?
            .execute(&mut *tx)
            .await?;
        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(InsertOutcome::Conflict);
        }

        let claimed = sqlx::query(
            r#"
            INSERT INTO referral_claims (referent, new_user, record_id, claimed_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(referent, new_user) DO NOTHING
            "#,
        )
        .bind(claim.referent.as_str())
        .bind(claim.new_user.as_str())
        .bind(record.id.to_string())
        .bind(TimeMs::now().as_ms())
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return match self.get_referral_claim(claim).await? {
                Some(record_id) => Ok(InsertOutcome::ClaimTaken { record_id }),
                None => Err(StoreError::Corrupt(format!(
                    "referral claim {} -> {} conflicted but is missing",
                    claim.referent, claim.new_user
                ))),
            };
        }

        tx.commit().await?;
        Ok(InsertOutcome::Inserted)
    }

    pub async fn get_referral_claim(
        &self,
        claim: &ReferralClaim,
    ) -> Result<Option<Uuid>, StoreError> {
        let row = sqlx::query(
            "SELECT record_id FROM referral_claims WHERE referent = ? AND new_user = ?",
        )
        .bind(claim.referent.as_str())
        .bind(claim.new_user.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| parse_uuid(&r.get::<String, _>("record_id")))
            .transpose()
    }

    /// Apply a status transition guarded by the taxonomy's allowed predecessors.
    pub async fn transition_status(
        &self,
        id: Uuid,
        status: TxStatus,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        let allowed_from = status.predecessors();
        if allowed_from.is_empty() {
            return Err(StoreError::IllegalTransition { id, to: status });
        }

        let sql = format!(
            "UPDATE transaction_records SET status = ?, date_added = ? WHERE id = ? AND status IN ({})",
            status_placeholders(allowed_from)
        );
        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(at.as_ms())
            .bind(id.to_string());
        for from in allowed_from {
            query = query.bind(from.as_str());
        }

        let result = query.execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            return match self.get_record(id).await? {
                Some(_) => Err(StoreError::IllegalTransition { id, to: status }),
                None => Err(StoreError::NotFound(id)),
            };
        }
        Ok(())
    }

    pub async fn store_handle(&self, id: Uuid, handle: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transaction_records SET operation_handle = ?
            WHERE id = ? AND status = 'PENDING_HASH' AND operation_handle IS NULL
            "#,
        )
        .bind(handle)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .guard_failure(id, "handle may only be set once while PENDING_HASH")
                .await);
        }
        Ok(())
    }

    /// `PENDING -> PENDING_HASH` together with the handle, guarded in one `UPDATE`.
    pub async fn store_pending_handle(
        &self,
        id: Uuid,
        handle: &str,
        at: TimeMs,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transaction_records
            SET status = 'PENDING_HASH', operation_handle = ?, date_added = ?
            WHERE id = ? AND status = 'PENDING' AND operation_handle IS NULL
            "#,
        )
        .bind(handle)
        .bind(at.as_ms())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get_record(id).await? {
                None => Err(StoreError::NotFound(id)),
                Some(record) if record.status != TxStatus::Pending => {
                    Err(StoreError::IllegalTransition {
                        id,
                        to: TxStatus::PendingHash,
                    })
                }
                Some(_) => Err(StoreError::Invariant {
                    id,
                    detail: "handle already set on a PENDING record".to_string(),
                }),
            };
        }
        debug!(record_id = %id, handle = %handle, "Record awaiting confirmation");
        Ok(())
    }

    pub async fn store_transaction_hash(&self, id: Uuid, hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE transaction_records SET transaction_hash = ?
            WHERE id = ? AND status IN ('PENDING', 'PENDING_HASH') AND transaction_hash IS NULL
            "#,
        )
        .bind(hash)
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self
                .guard_failure(id, "transaction hash may only be set once before a terminal status")
                .await);
        }
        Ok(())
    }

    pub async fn query_stale_records(
        &self,
        statuses: &[TxStatus],
        older_than: TimeMs,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {} FROM transaction_records WHERE status IN ({}) AND date_added <= ? \
             ORDER BY date_added ASC, id ASC LIMIT ?",
            RECORD_COLUMNS,
            status_placeholders(statuses)
        );
        let mut query = sqlx::query(&sql);
        for status in statuses {
            query = query.bind(status.as_str());
        }
        let rows = query
            .bind(older_than.as_ms())
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_record).collect()
    }

    async fn guard_failure(&self, id: Uuid, detail: &str) -> StoreError {
        match self.get_record(id).await {
            Ok(Some(record)) => StoreError::Invariant {
                id,
                detail: format!("{} (status {})", detail, record.status),
            },
            Ok(None) => StoreError::NotFound(id),
            Err(e) => e,
        }
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

fn bind_record<'q>(
    query: SqliteQuery<'q>,
    record: &'q TransactionRecord,
) -> Result<SqliteQuery<'q>, StoreError> {
    let payload = serde_json::to_string(&record.payload)
        .map_err(|e| StoreError::Corrupt(format!("record {} payload: {}", record.id, e)))?;

    Ok(query
        .bind(record.id.to_string())
        .bind(record.event_id.as_str())
        .bind(record.business_key.as_str())
        .bind(record.kind.as_str())
        .bind(record.user.as_str())
        .bind(record.status.as_str())
        .bind(record.date_added.as_ms())
        .bind(record.operation_handle.as_deref())
        .bind(record.transaction_hash.as_deref())
        .bind(payload)
        .bind(record.created_at.as_ms()))
}
