//! Link reward for the referent named on an account-link event.

use super::{DistributionPolicy, Draft, Locate, Preparation, RewardSettings};
use crate::db::{RecordStore, StoreError};
use crate::directory::UserDirectory;
use crate::domain::{BusinessKey, DistributionKind, EventId, LinkEvent};
use async_trait::async_trait;
use std::sync::Arc;

pub struct LinkPolicy {
    directory: Arc<dyn UserDirectory>,
    rewards: RewardSettings,
}

impl LinkPolicy {
    pub fn new(directory: Arc<dyn UserDirectory>, rewards: RewardSettings) -> Self {
        Self { directory, rewards }
    }
}

#[async_trait]
impl DistributionPolicy for LinkPolicy {
    type Event = LinkEvent;

    fn event_id<'a>(&self, event: &'a LinkEvent) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &LinkEvent) -> Locate {
        match event.referent() {
            Some(referent) => Locate::Key(BusinessKey::derive(
                DistributionKind::LinkReward,
                &[referent.as_str(), event.event_id.as_str()],
            )),
            None => Locate::Skip("no referent on link event".to_string()),
        }
    }

    async fn prepare(
        &self,
        event: &LinkEvent,
        _store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        let Some(referent) = event.referent() else {
            return Ok(Preparation::Skip("no referent on link event".to_string()));
        };
        if !self.rewards.link_amount.is_positive() {
            return Ok(Preparation::Skip("link reward disabled".to_string()));
        }

        let wallet = match self.directory.wallet_address(&referent).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return Ok(Preparation::Skip("referent has no wallet".to_string())),
            Err(e) => return Ok(Preparation::Skip(format!("wallet lookup failed: {}", e))),
        };

        Ok(Preparation::Create(Draft {
            kind: DistributionKind::LinkReward,
            user: referent,
            payload: self
                .rewards
                .transfer(wallet, self.rewards.link_amount, "link reward"),
            claim: None,
        }))
    }
}
