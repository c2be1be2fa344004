//! Signup reward for a newly registered user.

use super::{DistributionPolicy, Draft, Locate, Preparation, RewardSettings};
use crate::db::{RecordStore, StoreError};
use crate::directory::UserDirectory;
use crate::domain::{BusinessKey, DistributionKind, EventId, SignupEvent, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Business key of the signup reward a user received for `event_id`.
pub fn signup_key(user: &UserId, event_id: &EventId) -> BusinessKey {
    BusinessKey::derive(
        DistributionKind::SignupReward,
        &[user.as_str(), event_id.as_str()],
    )
}

/// Rewards users that are not yet in the user store. A missing wallet defers
/// the event until one is known.
pub struct SignupPolicy {
    directory: Arc<dyn UserDirectory>,
    rewards: RewardSettings,
}

impl SignupPolicy {
    pub fn new(directory: Arc<dyn UserDirectory>, rewards: RewardSettings) -> Self {
        Self { directory, rewards }
    }
}

#[async_trait]
impl DistributionPolicy for SignupPolicy {
    type Event = SignupEvent;

    fn event_id<'a>(&self, event: &'a SignupEvent) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &SignupEvent) -> Locate {
        Locate::Key(signup_key(&event.user, &event.event_id))
    }

    async fn prepare(
        &self,
        event: &SignupEvent,
        _store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        if !self.rewards.signup_amount.is_positive() {
            return Ok(Preparation::Skip("signup reward disabled".to_string()));
        }

        match self.directory.is_registered(&event.user).await {
            Ok(false) => {}
            Ok(true) => return Ok(Preparation::Skip("user already registered".to_string())),
            Err(e) => {
                warn!(event_id = %event.event_id, error = %e, "User lookup failed");
                return Ok(Preparation::Skip(format!("user lookup failed: {}", e)));
            }
        }

        let wallet = match self.directory.wallet_address(&event.user).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return Ok(Preparation::Defer("no wallet address yet".to_string())),
            Err(e) => {
                warn!(event_id = %event.event_id, error = %e, "Wallet lookup failed");
                return Ok(Preparation::Skip(format!("wallet lookup failed: {}", e)));
            }
        };

        Ok(Preparation::Create(Draft {
            kind: DistributionKind::SignupReward,
            user: event.user.clone(),
            payload: self
                .rewards
                .transfer(wallet, self.rewards.signup_amount, "signup reward"),
            claim: None,
        }))
    }
}
