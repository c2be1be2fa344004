//! Webhook endpoints, one per distribution variant.
//!
//! A handled delivery is acknowledged with `200`; anything else answers
//! `503` with `Retry-After` so the sender redelivers.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::distribution::{ConversionOutcome, Disposition};
use crate::domain::{
    ConversionEvent, DirectEvent, DistributionKind, IsolatedEvent, LinkEvent, OrderStatus,
    ReferralEvent, SignupEvent, TxStatus,
};
use crate::error::AppError;

pub const RETRY_AFTER_SECS: u64 = 30;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminal_status: Option<TxStatus>,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
}

impl From<&Disposition> for EventResponse {
    fn from(disposition: &Disposition) -> Self {
        let ack = disposition.acknowledgement();
        Self {
            handled: ack.handled,
            terminal_status: ack.terminal_status,
            outcome: ack.outcome,
            record_id: disposition.record_id(),
            order_status: None,
        }
    }
}

impl From<&ConversionOutcome> for EventResponse {
    fn from(outcome: &ConversionOutcome) -> Self {
        let order_status = match outcome {
            ConversionOutcome::Processed { status, .. } => Some(*status),
            ConversionOutcome::Skipped { .. } => None,
        };
        Self {
            handled: outcome.handled(),
            terminal_status: None,
            outcome: outcome.label(),
            record_id: None,
            order_status,
        }
    }
}

impl IntoResponse for EventResponse {
    fn into_response(self) -> Response {
        if self.handled {
            (StatusCode::OK, Json(self)).into_response()
        } else {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, RETRY_AFTER_SECS.to_string())],
                Json(self),
            )
                .into_response()
        }
    }
}

async fn direct(
    state: &AppState,
    event: DirectEvent,
    expected: DistributionKind,
) -> Result<EventResponse, AppError> {
    if event.kind() != expected {
        return Err(AppError::BadRequest(format!(
            "payload type {} does not match {} endpoint",
            event.kind(),
            expected
        )));
    }
    let disposition = state.distributor.direct(&event).await?;
    Ok(EventResponse::from(&disposition))
}

pub async fn transfer(
    State(state): State<AppState>,
    Json(event): Json<DirectEvent>,
) -> Result<EventResponse, AppError> {
    direct(&state, event, DistributionKind::Transfer).await
}

pub async fn swap(
    State(state): State<AppState>,
    Json(event): Json<DirectEvent>,
) -> Result<EventResponse, AppError> {
    direct(&state, event, DistributionKind::Swap).await
}

pub async fn vesting(
    State(state): State<AppState>,
    Json(event): Json<DirectEvent>,
) -> Result<EventResponse, AppError> {
    direct(&state, event, DistributionKind::Vesting).await
}

pub async fn signup(
    State(state): State<AppState>,
    Json(event): Json<SignupEvent>,
) -> Result<EventResponse, AppError> {
    let disposition = state.distributor.signup(&event).await?;
    Ok(EventResponse::from(&disposition))
}

pub async fn referral(
    State(state): State<AppState>,
    Json(event): Json<ReferralEvent>,
) -> Result<EventResponse, AppError> {
    let disposition = state.distributor.referral(&event).await?;
    Ok(EventResponse::from(&disposition))
}

pub async fn link(
    State(state): State<AppState>,
    Json(event): Json<LinkEvent>,
) -> Result<EventResponse, AppError> {
    let disposition = state.distributor.link(&event).await?;
    Ok(EventResponse::from(&disposition))
}

pub async fn isolated(
    State(state): State<AppState>,
    Json(event): Json<IsolatedEvent>,
) -> Result<EventResponse, AppError> {
    let disposition = state.distributor.isolated(&event).await?;
    Ok(EventResponse::from(&disposition))
}

pub async fn conversion(
    State(state): State<AppState>,
    Json(event): Json<ConversionEvent>,
) -> Result<EventResponse, AppError> {
    let outcome = state.distributor.convert(&event).await?;
    Ok(EventResponse::from(&outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Outcome;

    #[test]
    fn test_unhandled_response_asks_for_retry() {
        let resp = EventResponse::from(&Disposition::Advanced {
            record_id: Uuid::new_v4(),
            outcome: Outcome::StillPending,
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            resp.headers().get(header::RETRY_AFTER).unwrap().to_str().unwrap(),
            "30"
        );
    }

    #[test]
    fn test_skipped_delivery_is_acknowledged() {
        let resp = EventResponse::from(&Disposition::Skipped {
            reason: "no wallet".to_string(),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get(header::RETRY_AFTER).is_none());
    }
}
