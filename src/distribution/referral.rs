//! Referral reward paid to the referent of a new user.

use super::signup::signup_key;
use super::{DistributionPolicy, Draft, Locate, Preparation, RewardSettings};
use crate::db::{RecordStore, ReferralClaim, StoreError};
use crate::directory::UserDirectory;
use crate::domain::{BusinessKey, DistributionKind, EventId, ReferralEvent, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Requires the new user's signup record for the same event and a resolvable
/// referent. Each `(referent, new_user)` pair is rewarded once across all
/// events; later events for the pair are suppressed.
pub struct ReferralPolicy {
    directory: Arc<dyn UserDirectory>,
    rewards: RewardSettings,
}

impl ReferralPolicy {
    pub fn new(directory: Arc<dyn UserDirectory>, rewards: RewardSettings) -> Self {
        Self { directory, rewards }
    }

    async fn referent(&self, event: &ReferralEvent) -> Result<UserId, String> {
        let code = event.referral_code.trim();
        if code.is_empty() {
            return Err("no referral code".to_string());
        }
        match self.directory.resolve_referral_code(code).await {
            Ok(Some(referent)) if referent == event.new_user => {
                Err("self-referral".to_string())
            }
            Ok(Some(referent)) => Ok(referent),
            Ok(None) => Err(format!("unknown referral code {}", code)),
            Err(e) => {
                warn!(event_id = %event.event_id, error = %e, "Referral code lookup failed");
                Err(format!("referral code lookup failed: {}", e))
            }
        }
    }
}

#[async_trait]
impl DistributionPolicy for ReferralPolicy {
    type Event = ReferralEvent;

    fn event_id<'a>(&self, event: &'a ReferralEvent) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &ReferralEvent) -> Locate {
        match self.referent(event).await {
            Ok(referent) => Locate::Key(BusinessKey::derive(
                DistributionKind::ReferralReward,
                &[
                    referent.as_str(),
                    event.new_user.as_str(),
                    event.event_id.as_str(),
                ],
            )),
            Err(reason) => Locate::Skip(reason),
        }
    }

    async fn prepare(
        &self,
        event: &ReferralEvent,
        store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        if !self.rewards.referral_amount.is_positive() {
            return Ok(Preparation::Skip("referral reward disabled".to_string()));
        }
        let referent = match self.referent(event).await {
            Ok(referent) => referent,
            Err(reason) => return Ok(Preparation::Skip(reason)),
        };

        let claim = ReferralClaim {
            referent: referent.clone(),
            new_user: event.new_user.clone(),
        };
        if let Some(record_id) = store.find_referral_claim(&claim).await? {
            debug!(
                event_id = %event.event_id,
                referent = %referent,
                new_user = %event.new_user,
                record_id = %record_id,
                "Pair already rewarded under another event"
            );
            return Ok(Preparation::Suppress { record_id });
        }

        let parent = signup_key(&event.new_user, &event.event_id);
        if store.find_by_business_key(&parent).await?.is_none() {
            return Ok(Preparation::Skip(
                "no signup transaction for the new user".to_string(),
            ));
        }

        let wallet = match self.directory.wallet_address(&referent).await {
            Ok(Some(wallet)) => wallet,
            Ok(None) => return Ok(Preparation::Skip("referent has no wallet".to_string())),
            Err(e) => {
                warn!(event_id = %event.event_id, error = %e, "Wallet lookup failed");
                return Ok(Preparation::Skip(format!("wallet lookup failed: {}", e)));
            }
        };

        Ok(Preparation::Create(Draft {
            kind: DistributionKind::ReferralReward,
            user: referent,
            payload: self
                .rewards
                .transfer(wallet, self.rewards.referral_amount, "referral reward"),
            claim: Some(claim),
        }))
    }
}
