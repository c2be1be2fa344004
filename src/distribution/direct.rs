//! Transfers, swaps and vesting grants carrying an explicit payload.

use super::{DistributionPolicy, Draft, Locate, Preparation};
use crate::db::{RecordStore, StoreError};
use crate::domain::{BusinessKey, DirectEvent, EventId};
use async_trait::async_trait;

/// Keyed on `(user, event_id)`; only requires a positive amount.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectPolicy;

#[async_trait]
impl DistributionPolicy for DirectPolicy {
    type Event = DirectEvent;

    fn event_id<'a>(&self, event: &'a DirectEvent) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &DirectEvent) -> Locate {
        Locate::Key(BusinessKey::derive(
            event.kind(),
            &[event.user.as_str(), event.event_id.as_str()],
        ))
    }

    async fn prepare(
        &self,
        event: &DirectEvent,
        _store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        if !event.payload.amount().is_positive() {
            return Ok(Preparation::Skip("amount must be positive".to_string()));
        }
        Ok(Preparation::Create(Draft {
            kind: event.kind(),
            user: event.user.clone(),
            payload: event.payload.clone(),
            claim: None,
        }))
    }
}
