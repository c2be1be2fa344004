//! The state machine that drives one record to a terminal status.

use super::{EngineError, EnginePolicy, Outcome};
use crate::db::{RecordStore, StoreError};
use crate::domain::{TimeMs, TransactionRecord, TxStatus};
use crate::execution::{ExecutionClient, RemoteStatus, SubmitOutcome};
use crate::sinks::{fan_out, SideEffectSink};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Advances transaction records through submit, poll and finalize.
///
/// Shared by every distribution variant; variants only decide whether a
/// record exists and what its payload is.
#[derive(Clone)]
pub struct LifecycleEngine {
    store: Arc<dyn RecordStore>,
    execution: Arc<dyn ExecutionClient>,
    sinks: Vec<Arc<dyn SideEffectSink>>,
    policy: EnginePolicy,
}

impl LifecycleEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        execution: Arc<dyn ExecutionClient>,
        sinks: Vec<Arc<dyn SideEffectSink>>,
        policy: EnginePolicy,
    ) -> Self {
        Self {
            store,
            execution,
            sinks,
            policy,
        }
    }

    pub fn policy(&self) -> &EnginePolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Advance `record` once, at the current wall-clock time.
    pub async fn advance(&self, record: &TransactionRecord) -> Result<Outcome, EngineError> {
        self.advance_at(record, TimeMs::now()).await
    }

    /// Advance `record` once, treating `now` as the current time.
    ///
    /// Safe to call on every redelivery: terminal records are returned
    /// untouched and a `PENDING` record is submitted at most once per call.
    pub async fn advance_at(
        &self,
        record: &TransactionRecord,
        now: TimeMs,
    ) -> Result<Outcome, EngineError> {
        if record.status.is_terminal() {
            debug!(record_id = %record.id, status = %record.status, "Record already terminal");
            return Ok(Outcome::AlreadyHandled {
                status: record.status,
            });
        }

        match record.status {
            TxStatus::PendingHash => self.confirm(record, now).await,
            _ => self.submit(record, now).await,
        }
    }

    async fn confirm(
        &self,
        record: &TransactionRecord,
        now: TimeMs,
    ) -> Result<Outcome, EngineError> {
        let waited = record.date_added.elapsed_until(now);
        if waited > self.policy.treatment_window {
            warn!(
                record_id = %record.id,
                event_id = %record.event_id,
                waited_secs = waited.as_secs(),
                "Confirmation window expired, failing record"
            );
            if let Some(status) = self.transition(record.id, TxStatus::Failure, now).await? {
                return Ok(Outcome::AlreadyHandled { status });
            }
            return Ok(Outcome::TimedOut);
        }

        let Some(handle) = record.operation_handle.as_deref() else {
            if !self.policy.settle_without_handle {
                debug!(record_id = %record.id, "No handle yet, leaving record pending");
                return Ok(Outcome::AwaitingHandle);
            }
            info!(
                record_id = %record.id,
                event_id = %record.event_id,
                "No operation handle to poll, settling as success"
            );
            return self.finalize(record, None, now).await;
        };

        match self.execution.status_by_handle(handle).await {
            Ok(RemoteStatus::Confirmed { hash }) => self.finalize(record, hash, now).await,
            Ok(RemoteStatus::Failed { reason }) => {
                warn!(
                    record_id = %record.id,
                    event_id = %record.event_id,
                    handle = %handle,
                    reason = %reason,
                    "Operation failed"
                );
                if let Some(status) = self.transition(record.id, TxStatus::Failure, now).await? {
                    return Ok(Outcome::AlreadyHandled { status });
                }
                Ok(Outcome::Failed { reason })
            }
            Ok(RemoteStatus::Pending) => {
                debug!(record_id = %record.id, handle = %handle, "Operation still pending");
                Ok(Outcome::StillPending)
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    event_id = %record.event_id,
                    error = %e,
                    "Poll failed, will retry on redelivery"
                );
                Ok(Outcome::TransientError {
                    detail: e.to_string(),
                })
            }
        }
    }

    async fn submit(
        &self,
        record: &TransactionRecord,
        now: TimeMs,
    ) -> Result<Outcome, EngineError> {
        match self.execution.submit(record.id, &record.payload).await {
            Ok(SubmitOutcome::Hash(hash)) => self.finalize(record, Some(hash), now).await,
            Ok(SubmitOutcome::Handle(handle)) => {
                // A PENDING_HASH record without a handle means none was ever returned.
                if let Err(e) = self.store.mark_pending_hash(record.id, &handle, now).await {
                    let status = self.reconcile(record.id, e).await?;
                    return Ok(Outcome::AlreadyHandled { status });
                }
                info!(
                    record_id = %record.id,
                    event_id = %record.event_id,
                    handle = %handle,
                    "Operation accepted, awaiting confirmation"
                );
                Ok(Outcome::AwaitingConfirmation { handle })
            }
            Ok(SubmitOutcome::Rejected(reason)) => {
                warn!(
                    record_id = %record.id,
                    event_id = %record.event_id,
                    reason = %reason,
                    "Submission rejected, record left pending"
                );
                Ok(Outcome::SubmitRejected { reason })
            }
            Err(e) => {
                warn!(
                    record_id = %record.id,
                    event_id = %record.event_id,
                    error = %e,
                    "Submission failed, will retry on redelivery"
                );
                Ok(Outcome::TransientError {
                    detail: e.to_string(),
                })
            }
        }
    }

    /// Persist the hash, move to `SUCCESS`, then notify every sink.
    async fn finalize(
        &self,
        record: &TransactionRecord,
        hash: Option<String>,
        now: TimeMs,
    ) -> Result<Outcome, EngineError> {
        if let Some(hash) = hash.as_deref() {
            if record.transaction_hash.is_none() {
                if let Err(e) = self.store.set_transaction_hash(record.id, hash).await {
                    let status = self.reconcile(record.id, e).await?;
                    return Ok(Outcome::AlreadyHandled { status });
                }
            }
        }
        if let Some(status) = self.transition(record.id, TxStatus::Success, now).await? {
            return Ok(Outcome::AlreadyHandled { status });
        }

        let mut settled = record.clone();
        settled.status = TxStatus::Success;
        settled.date_added = now;
        settled.transaction_hash = hash.clone().or_else(|| record.transaction_hash.clone());

        info!(
            record_id = %record.id,
            event_id = %record.event_id,
            business_key = %record.business_key,
            tx_hash = settled.transaction_hash.as_deref().unwrap_or("-"),
            "Distribution succeeded"
        );

        let fanout = fan_out(&self.sinks, &settled, self.policy.sink_timeout).await;
        Ok(Outcome::Succeeded {
            hash: settled.transaction_hash,
            fanout,
        })
    }

    /// Apply a status transition. If another writer got there first and the
    /// record is now terminal, returns that status instead of an error.
    async fn transition(
        &self,
        id: Uuid,
        status: TxStatus,
        now: TimeMs,
    ) -> Result<Option<TxStatus>, EngineError> {
        match self.store.update_status(id, status, now).await {
            Ok(()) => Ok(None),
            Err(e) => self.reconcile(id, e).await.map(Some),
        }
    }

    /// Resolve a rejected write against the stored record.
    ///
    /// A guard rejection on a record that is now terminal means a concurrent
    /// delivery finished it; anything else is propagated.
    async fn reconcile(&self, id: Uuid, err: StoreError) -> Result<TxStatus, EngineError> {
        if !matches!(
            err,
            StoreError::IllegalTransition { .. } | StoreError::Invariant { .. }
        ) {
            return Err(err.into());
        }
        let current = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        if current.status.is_terminal() {
            debug!(record_id = %id, status = %current.status, "Lost race to a concurrent delivery");
            return Ok(current.status);
        }
        Err(err.into())
    }
}
