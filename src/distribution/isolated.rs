//! One-off rewards granted for an explicit reason.

use super::{DistributionPolicy, Draft, Locate, Preparation, RewardSettings};
use crate::db::{RecordStore, StoreError};
use crate::directory::UserDirectory;
use crate::domain::{BusinessKey, DistributionKind, EventId, IsolatedEvent, Payload};
use async_trait::async_trait;
use std::sync::Arc;

/// Keyed on `(user, event_id, reason)`, so one event may carry several
/// rewards that differ by reason.
pub struct IsolatedPolicy {
    directory: Arc<dyn UserDirectory>,
    rewards: RewardSettings,
}

impl IsolatedPolicy {
    pub fn new(directory: Arc<dyn UserDirectory>, rewards: RewardSettings) -> Self {
        Self { directory, rewards }
    }
}

#[async_trait]
impl DistributionPolicy for IsolatedPolicy {
    type Event = IsolatedEvent;

    fn event_id<'a>(&self, event: &'a IsolatedEvent) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &IsolatedEvent) -> Locate {
        let Some(reason) = event.reason() else {
            return Locate::Skip("no reason given".to_string());
        };
        if event.amount().is_none() {
            return Locate::Skip("no positive amount given".to_string());
        }
        Locate::Key(BusinessKey::derive(
            DistributionKind::IsolatedReward,
            &[event.user.as_str(), event.event_id.as_str(), reason],
        ))
    }

    async fn prepare(
        &self,
        event: &IsolatedEvent,
        _store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        let (Some(reason), Some(amount)) = (event.reason(), event.amount()) else {
            return Ok(Preparation::Skip("reason and amount are required".to_string()));
        };

        let wallet = match self.directory.wallet_address(&event.user).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return Ok(Preparation::Skip("user has no wallet".to_string())),
            Err(e) => return Ok(Preparation::Skip(format!("wallet lookup failed: {}", e))),
        };

        Ok(Preparation::Create(Draft {
            kind: DistributionKind::IsolatedReward,
            user: event.user.clone(),
            payload: Payload::Transfer {
                chain_id: self.rewards.chain_id.clone(),
                token: event
                    .token
                    .clone()
                    .unwrap_or_else(|| self.rewards.token.clone()),
                recipient: wallet,
                amount,
                memo: Some(reason.to_string()),
            },
            claim: None,
        }))
    }
}
