//! Inbound events as delivered by the webhook layer (possibly more than once).

use serde::{Deserialize, Serialize};

use super::{Decimal, DistributionKind, EventId, Payload, UserId};

/// Transfer, swap or vesting grant with an explicit payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectEvent {
    pub event_id: EventId,
    pub user: UserId,
    pub payload: Payload,
}

impl DirectEvent {
    pub fn kind(&self) -> DistributionKind {
        match self.payload {
            Payload::Transfer { .. } => DistributionKind::Transfer,
            Payload::Swap { .. } => DistributionKind::Swap,
            Payload::Vesting { .. } => DistributionKind::Vesting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupEvent {
    pub event_id: EventId,
    pub user: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEvent {
    pub event_id: EventId,
    pub new_user: UserId,
    pub referral_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkEvent {
    pub event_id: EventId,
    pub user: UserId,
    #[serde(default)]
    pub referent: Option<String>,
}

impl LinkEvent {
    pub fn referent(&self) -> Option<UserId> {
        self.referent
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(UserId::new)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IsolatedEvent {
    pub event_id: EventId,
    pub user: UserId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Overrides the configured reward token.
    #[serde(default)]
    pub token: Option<String>,
}

impl IsolatedEvent {
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn amount(&self) -> Option<Decimal> {
        self.amount.filter(|a| a.is_positive())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    pub event_id: EventId,
    pub quote_id: String,
}
