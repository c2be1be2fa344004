//! Idempotent distribution flows on top of the lifecycle engine.
//!
//! Every flow follows the same path: derive the business key, reuse the
//! record stored under it, or check the variant's preconditions and create
//! one with insert-or-fail, then advance it. Variants only supply the key,
//! the preconditions and the payload through [`DistributionPolicy`].

use crate::db::{InsertOutcome, RecordStore, ReferralClaim, StoreError};
use crate::directory::{DirectoryError, QuoteBook, UserDirectory};
use crate::domain::{
    Address, BusinessKey, Decimal, DirectEvent, DistributionKind, EventId, IsolatedEvent, LinkEvent,
    Payload, ReferralEvent, SignupEvent, TimeMs, TransactionRecord, TxStatus, UserId,
};
use crate::engine::{Acknowledgement, EngineError, LifecycleEngine, Outcome};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod conversion;
pub mod direct;
pub mod isolated;
pub mod link;
pub mod referral;
pub mod signup;

pub use conversion::{ConversionOutcome, LegView, OrderView};
pub use direct::DirectPolicy;
pub use isolated::IsolatedPolicy;
pub use link::LinkPolicy;
pub use referral::ReferralPolicy;
pub use signup::SignupPolicy;

#[derive(Debug, Error)]
pub enum DistributionError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("record under {0} conflicted on insert but cannot be reloaded")]
    Vanished(BusinessKey),
}

/// Chain, token and amounts for the reward variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewardSettings {
    pub chain_id: String,
    pub token: String,
    /// A zero amount disables the reward.
    pub signup_amount: Decimal,
    pub referral_amount: Decimal,
    pub link_amount: Decimal,
}

impl RewardSettings {
    pub(crate) fn transfer(&self, to: Address, amount: Decimal, memo: &str) -> Payload {
        Payload::Transfer {
            chain_id: self.chain_id.clone(),
            token: self.token.clone(),
            recipient: to,
            amount,
            memo: Some(memo.to_string()),
        }
    }
}

/// Where an event's record lives, or why it has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locate {
    Key(BusinessKey),
    Skip(String),
}

/// Everything needed to create a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub kind: DistributionKind,
    pub user: UserId,
    pub payload: Payload,
    /// Claimed atomically with the insert.
    pub claim: Option<ReferralClaim>,
}

/// Precondition verdict for an event without a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Preparation {
    Create(Draft),
    /// Precondition not met; acknowledged without a record.
    Skip(String),
    /// Not ready yet; the event should be redelivered.
    Defer(String),
    /// An equivalent distribution already exists under another record.
    Suppress { record_id: Uuid },
}

/// Variant-specific part of a distribution flow.
#[async_trait]
pub trait DistributionPolicy: Send + Sync {
    type Event: Send + Sync;

    fn event_id<'a>(&self, event: &'a Self::Event) -> &'a EventId;

    /// Business key of the event's record.
    async fn locate(&self, event: &Self::Event) -> Locate;

    /// Preconditions and payload for a record that does not exist yet.
    async fn prepare(
        &self,
        event: &Self::Event,
        store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError>;
}

/// How a delivery was disposed of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Advanced { record_id: Uuid, outcome: Outcome },
    Skipped { reason: String },
    Deferred { reason: String },
    Suppressed { record_id: Uuid },
}

impl Disposition {
    pub fn handled(&self) -> bool {
        match self {
            Disposition::Advanced { outcome, .. } => outcome.handled(),
            Disposition::Skipped { .. } | Disposition::Suppressed { .. } => true,
            Disposition::Deferred { .. } => false,
        }
    }

    pub fn record_id(&self) -> Option<Uuid> {
        match self {
            Disposition::Advanced { record_id, .. } | Disposition::Suppressed { record_id } => {
                Some(*record_id)
            }
            _ => None,
        }
    }

    pub fn acknowledgement(&self) -> Acknowledgement {
        match self {
            Disposition::Advanced { outcome, .. } => Acknowledgement::from(outcome),
            Disposition::Skipped { .. } => Acknowledgement {
                handled: true,
                terminal_status: None,
                outcome: "skipped",
            },
            Disposition::Deferred { .. } => Acknowledgement {
                handled: false,
                terminal_status: None,
                outcome: "deferred",
            },
            Disposition::Suppressed { .. } => Acknowledgement {
                handled: true,
                terminal_status: None,
                outcome: "suppressed",
            },
        }
    }
}

/// Record found or created, or a final disposition without advancing.
#[derive(Debug)]
pub(crate) enum Resolution {
    Record(TransactionRecord),
    Settled(Disposition),
}

/// Counters from one sweep pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub examined: usize,
    pub handled: usize,
    pub pending: usize,
    pub errors: usize,
}

/// Entry point for every distribution flow.
#[derive(Clone)]
pub struct Distributor {
    engine: LifecycleEngine,
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn UserDirectory>,
    quotes: Arc<dyn QuoteBook>,
    rewards: RewardSettings,
}

impl Distributor {
    pub fn new(
        engine: LifecycleEngine,
        directory: Arc<dyn UserDirectory>,
        quotes: Arc<dyn QuoteBook>,
        rewards: RewardSettings,
    ) -> Self {
        let store = engine.store().clone();
        Self {
            engine,
            store,
            directory,
            quotes,
            rewards,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Run one event through `policy`: resolve or create its record, then advance it.
    pub async fn distribute<P: DistributionPolicy>(
        &self,
        policy: &P,
        event: &P::Event,
    ) -> Result<Disposition, DistributionError> {
        match self.resolve(policy, event).await? {
            Resolution::Record(record) => {
                let outcome = self.engine.advance(&record).await?;
                info!(
                    event_id = %record.event_id,
                    record_id = %record.id,
                    kind = %record.kind,
                    outcome = outcome.label(),
                    "Event processed"
                );
                Ok(Disposition::Advanced {
                    record_id: record.id,
                    outcome,
                })
            }
            Resolution::Settled(disposition) => Ok(disposition),
        }
    }

    pub(crate) async fn resolve<P: DistributionPolicy>(
        &self,
        policy: &P,
        event: &P::Event,
    ) -> Result<Resolution, DistributionError> {
        let event_id = policy.event_id(event);
        let key = match policy.locate(event).await {
            Locate::Key(key) => key,
            Locate::Skip(reason) => {
                info!(event_id = %event_id, reason = %reason, "Event skipped");
                return Ok(Resolution::Settled(Disposition::Skipped { reason }));
            }
        };

        if let Some(existing) = self.store.find_by_business_key(&key).await? {
            debug!(event_id = %event_id, record_id = %existing.id, "Reusing existing record");
            return Ok(Resolution::Record(existing));
        }

        let draft = match policy.prepare(event, self.store.as_ref()).await? {
            Preparation::Create(draft) => draft,
            Preparation::Skip(reason) => {
                info!(event_id = %event_id, business_key = %key, reason = %reason, "Event skipped");
                return Ok(Resolution::Settled(Disposition::Skipped { reason }));
            }
            Preparation::Defer(reason) => {
                info!(event_id = %event_id, business_key = %key, reason = %reason, "Event deferred");
                return Ok(Resolution::Settled(Disposition::Deferred { reason }));
            }
            Preparation::Suppress { record_id } => {
                info!(event_id = %event_id, record_id = %record_id, "Duplicate distribution suppressed");
                return Ok(Resolution::Settled(Disposition::Suppressed { record_id }));
            }
        };

        let record = TransactionRecord::new(
            event_id.clone(),
            key.clone(),
            draft.kind,
            draft.user,
            draft.payload,
        );
        let inserted = match &draft.claim {
            Some(claim) => self.store.insert_referral(&record, claim).await?,
            None => self.store.insert(&record).await?,
        };

        match inserted {
            InsertOutcome::Inserted => {
                debug!(event_id = %event_id, record_id = %record.id, business_key = %key, "Record created");
                Ok(Resolution::Record(record))
            }
            InsertOutcome::Conflict => {
                debug!(event_id = %event_id, business_key = %key, "Lost create race, reloading");
                let existing = self
                    .store
                    .find_by_business_key(&key)
                    .await?
                    .ok_or(DistributionError::Vanished(key))?;
                Ok(Resolution::Record(existing))
            }
            InsertOutcome::ClaimTaken { record_id } => {
                info!(event_id = %event_id, record_id = %record_id, "Duplicate distribution suppressed");
                Ok(Resolution::Settled(Disposition::Suppressed { record_id }))
            }
        }
    }

    pub async fn direct(&self, event: &DirectEvent) -> Result<Disposition, DistributionError> {
        self.distribute(&DirectPolicy, event).await
    }

    pub async fn signup(&self, event: &SignupEvent) -> Result<Disposition, DistributionError> {
        let policy = SignupPolicy::new(self.directory.clone(), self.rewards.clone());
        self.distribute(&policy, event).await
    }

    pub async fn referral(&self, event: &ReferralEvent) -> Result<Disposition, DistributionError> {
        let policy = ReferralPolicy::new(self.directory.clone(), self.rewards.clone());
        self.distribute(&policy, event).await
    }

    pub async fn link(&self, event: &LinkEvent) -> Result<Disposition, DistributionError> {
        let policy = LinkPolicy::new(self.directory.clone(), self.rewards.clone());
        self.distribute(&policy, event).await
    }

    pub async fn isolated(&self, event: &IsolatedEvent) -> Result<Disposition, DistributionError> {
        let policy = IsolatedPolicy::new(self.directory.clone(), self.rewards.clone());
        self.distribute(&policy, event).await
    }

    pub async fn record(&self, id: Uuid) -> Result<TransactionRecord, DistributionError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| DistributionError::NotFound(format!("record {}", id)))
    }

    /// Advance every `PENDING`/`PENDING_HASH` record last touched at or before
    /// `older_than`, oldest first.
    pub async fn sweep(
        &self,
        older_than: TimeMs,
        limit: i64,
    ) -> Result<SweepReport, DistributionError> {
        let stale = self
            .store
            .list_stale(&[TxStatus::Pending, TxStatus::PendingHash], older_than, limit)
            .await?;

        let mut report = SweepReport::default();
        for record in stale {
            report.examined += 1;
            match self.engine.advance(&record).await {
                Ok(outcome) if outcome.handled() => report.handled += 1,
                Ok(_) => report.pending += 1,
                Err(e) => {
                    warn!(record_id = %record.id, event_id = %record.event_id, error = %e, "Sweep failed to advance record");
                    report.errors += 1;
                }
            }
        }
        info!(
            examined = report.examined,
            handled = report.handled,
            pending = report.pending,
            errors = report.errors,
            "Sweep complete"
        );
        Ok(report)
    }
}


#[cfg(test)]
mod tests {
    use super::testkit::kit;
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::execution::{MockExecutionClient, SubmitOutcome};

    fn transfer_event(event: &str) -> DirectEvent {
        DirectEvent {
            event_id: EventId::new(event),
            user: UserId::new("u1"),
            payload: Payload::Transfer {
                chain_id: "137".to_string(),
                token: "USDC".to_string(),
                recipient: Address::new("0xabc"),
                amount: Decimal::from_str_canonical("3").unwrap(),
                memo: None,
            },
        }
    }

    #[tokio::test]
    async fn test_redelivery_reuses_record_and_submits_once() {
        let k = kit(
            InMemoryDirectory::new(),
            MockExecutionClient::new().with_submit(Ok(SubmitOutcome::Hash("0x1".to_string()))),
        );
        let event = transfer_event("evt-1");

        let first = k.distributor.direct(&event).await.unwrap();
        let second = k.distributor.direct(&event).await.unwrap();

        assert!(first.handled());
        assert_eq!(first.record_id(), second.record_id());
        assert_eq!(
            second.acknowledgement().terminal_status,
            Some(TxStatus::Success)
        );
        assert_eq!(k.store.len(), 1);
        assert_eq!(k.execution.submit_calls(), 1);
        assert_eq!(k.sink.count(), 1);
    }

    #[tokio::test]
    async fn test_insert_conflict_reloads_existing_record() {
        let k = kit(
            InMemoryDirectory::new(),
            MockExecutionClient::new().with_default_submit(SubmitOutcome::Handle("op".into())),
        );
        let event = transfer_event("evt-1");

        // Another writer created the record between lookup and insert.
        struct RacingPolicy(TransactionRecord);

        #[async_trait]
        impl DistributionPolicy for RacingPolicy {
            type Event = DirectEvent;

            fn event_id<'a>(&self, event: &'a DirectEvent) -> &'a EventId {
                &event.event_id
            }

            async fn locate(&self, _event: &DirectEvent) -> Locate {
                Locate::Key(self.0.business_key.clone())
            }

            async fn prepare(
                &self,
                event: &DirectEvent,
                store: &dyn RecordStore,
            ) -> Result<Preparation, StoreError> {
                store.insert(&self.0).await?;
                Ok(Preparation::Create(Draft {
                    kind: event.kind(),
                    user: event.user.clone(),
                    payload: event.payload.clone(),
                    claim: None,
                }))
            }
        }

        let winner = TransactionRecord::new(
            event.event_id.clone(),
            BusinessKey::derive(DistributionKind::Transfer, &["u1", "evt-1"]),
            DistributionKind::Transfer,
            event.user.clone(),
            event.payload.clone(),
        );
        let disposition = k
            .distributor
            .distribute(&RacingPolicy(winner.clone()), &event)
            .await
            .unwrap();

        assert_eq!(disposition.record_id(), Some(winner.id));
        assert_eq!(k.store.len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_advances_stale_records() {
        let k = kit(
            InMemoryDirectory::new(),
            MockExecutionClient::new()
                .with_submit(Ok(SubmitOutcome::Handle("op-1".to_string())))
                .with_default_poll(crate::execution::RemoteStatus::Confirmed {
                    hash: Some("0x2".to_string()),
                }),
        );
        let first = k.distributor.direct(&transfer_event("evt-1")).await.unwrap();
        assert!(!first.handled());

        let report = k.distributor.sweep(TimeMs::now(), 10).await.unwrap();
        assert_eq!(report.examined, 1);
        assert_eq!(report.handled, 1);

        let record = k
            .distributor
            .record(first.record_id().unwrap())
            .await
            .unwrap();
        assert_eq!(record.status, TxStatus::Success);
        assert!(matches!(
            k.distributor.record(Uuid::new_v4()).await,
            Err(DistributionError::NotFound(_))
        ));
    }
}
