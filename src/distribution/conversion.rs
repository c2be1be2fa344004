//! Purchase orders settled as a token leg and a fiat-token leg.

use super::{
    Disposition, DistributionError, DistributionPolicy, Distributor, Draft, Locate, Preparation,
    Resolution,
};
use crate::db::{RecordStore, StoreError};
use crate::domain::{
    BusinessKey, ConversionEvent, DistributionKind, EventId, Leg, Order, OrderStatus, Payload,
    Quote, TxStatus,
};
use crate::engine::aggregate_legs;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

const LEGS: [Leg; 2] = [Leg::Token, Leg::Fiat];

fn leg_kind(leg: Leg) -> DistributionKind {
    match leg {
        Leg::Token => DistributionKind::ConversionToken,
        Leg::Fiat => DistributionKind::ConversionFiat,
    }
}

/// One leg of one quote, as seen by the leg policy.
pub struct ConversionLeg {
    pub event_id: EventId,
    pub quote: Quote,
    pub leg: Leg,
}

/// Keyed on `(quote_id, leg)`, so every delivery for a quote lands on the
/// same two records whatever its event id.
struct LegPolicy;

#[async_trait]
impl DistributionPolicy for LegPolicy {
    type Event = ConversionLeg;

    fn event_id<'a>(&self, event: &'a ConversionLeg) -> &'a EventId {
        &event.event_id
    }

    async fn locate(&self, event: &ConversionLeg) -> Locate {
        Locate::Key(BusinessKey::derive(
            leg_kind(event.leg),
            &[event.quote.quote_id.as_str(), event.leg.as_str()],
        ))
    }

    async fn prepare(
        &self,
        event: &ConversionLeg,
        _store: &dyn RecordStore,
    ) -> Result<Preparation, StoreError> {
        let Some(amount) = event.quote.leg_amount(event.leg) else {
            return Ok(Preparation::Skip(format!("quote has no {} leg", event.leg)));
        };
        Ok(Preparation::Create(Draft {
            kind: leg_kind(event.leg),
            user: event.quote.user.clone(),
            payload: Payload::Transfer {
                chain_id: event.quote.chain_id.clone(),
                token: event.quote.leg_token(event.leg).to_string(),
                recipient: event.quote.recipient.clone(),
                amount,
                memo: Some(format!("order {} {} leg", event.quote.quote_id, event.leg)),
            },
            claim: None,
        }))
    }
}

/// Result of processing one conversion event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionOutcome {
    /// The quote is unknown; precondition not met.
    Skipped { reason: String },
    Processed {
        quote_id: String,
        legs: Vec<(Leg, Disposition)>,
        status: OrderStatus,
    },
}

impl ConversionOutcome {
    /// Handled once every present leg is handled.
    pub fn handled(&self) -> bool {
        match self {
            ConversionOutcome::Skipped { .. } => true,
            ConversionOutcome::Processed { legs, .. } => legs.iter().all(|(_, d)| d.handled()),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConversionOutcome::Skipped { .. } => "skipped",
            ConversionOutcome::Processed { .. } if self.handled() => "processed",
            ConversionOutcome::Processed { .. } => "in_progress",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegView {
    pub record_id: Uuid,
    pub status: TxStatus,
    pub transaction_hash: Option<String>,
}

/// Externally reported order status with per-leg detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    pub quote_id: String,
    pub status: OrderStatus,
    pub token_leg: Option<LegView>,
    pub fiat_leg: Option<LegView>,
}

impl Distributor {
    /// Create or reuse the order for a quote and advance each of its legs.
    pub async fn convert(
        &self,
        event: &ConversionEvent,
    ) -> Result<ConversionOutcome, DistributionError> {
        let quote = match self.quotes.find_quote(&event.quote_id).await {
            Ok(Some(quote)) => quote,
            Ok(None) => {
                info!(event_id = %event.event_id, quote_id = %event.quote_id, "Unknown quote, skipping");
                return Ok(ConversionOutcome::Skipped {
                    reason: format!("unknown quote {}", event.quote_id),
                });
            }
            Err(e) => {
                warn!(event_id = %event.event_id, quote_id = %event.quote_id, error = %e, "Quote lookup failed");
                return Ok(ConversionOutcome::Skipped {
                    reason: format!("quote lookup failed: {}", e),
                });
            }
        };

        if LEGS.iter().all(|leg| quote.leg_amount(*leg).is_none()) {
            return Ok(ConversionOutcome::Skipped {
                reason: format!("quote {} has no positive leg", quote.quote_id),
            });
        }

        self.store.insert_order(&Order::from_quote(quote.clone())).await?;
        let order = self
            .store
            .find_order(&quote.quote_id)
            .await?
            .ok_or_else(|| DistributionError::NotFound(format!("order {}", quote.quote_id)))?;

        let mut legs = Vec::new();
        for leg in LEGS {
            if quote.leg_amount(leg).is_none() {
                continue;
            }
            let input = ConversionLeg {
                event_id: event.event_id.clone(),
                quote: quote.clone(),
                leg,
            };
            let disposition = match self.resolve(&LegPolicy, &input).await? {
                Resolution::Record(record) => {
                    if order.leg_id(leg).is_none() {
                        self.store.attach_leg(&order.quote_id, leg, record.id).await?;
                    }
                    let outcome = self.engine.advance(&record).await?;
                    Disposition::Advanced {
                        record_id: record.id,
                        outcome,
                    }
                }
                Resolution::Settled(disposition) => disposition,
            };
            legs.push((leg, disposition));
        }

        let status = self.order_status(&quote.quote_id).await?.status;
        info!(
            event_id = %event.event_id,
            quote_id = %quote.quote_id,
            status = %status,
            "Conversion processed"
        );
        Ok(ConversionOutcome::Processed {
            quote_id: quote.quote_id,
            legs,
            status,
        })
    }

    /// Aggregated status of the order for `quote_id`.
    ///
    /// A known quote without an order yet reports `PENDING`; an unknown quote
    /// is `NotFound`. A quote book that cannot answer is `Directory`.
    pub async fn order_status(&self, quote_id: &str) -> Result<OrderView, DistributionError> {
        let Some(order) = self.store.find_order(quote_id).await? else {
            return match self.quotes.find_quote(quote_id).await? {
                Some(_) => Ok(OrderView {
                    quote_id: quote_id.to_string(),
                    status: aggregate_legs(None, None),
                    token_leg: None,
                    fiat_leg: None,
                }),
                None => Err(DistributionError::NotFound(format!("quote {}", quote_id))),
            };
        };

        let token_leg = self.leg_view(order.token_leg_id).await?;
        let fiat_leg = self.leg_view(order.fiat_leg_id).await?;
        Ok(OrderView {
            quote_id: order.quote_id,
            status: aggregate_legs(
                token_leg.as_ref().map(|l| l.status),
                fiat_leg.as_ref().map(|l| l.status),
            ),
            token_leg,
            fiat_leg,
        })
    }

    async fn leg_view(&self, id: Option<Uuid>) -> Result<Option<LegView>, DistributionError> {
        let Some(id) = id else {
            return Ok(None);
        };
        let record = self
            .store
            .find_by_id(id)
            .await?
            .ok_or(StoreError::Corrupt(format!("order leg {} missing", id)))?;
        Ok(Some(LegView {
            record_id: record.id,
            status: record.status,
            transaction_hash: record.transaction_hash,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testkit::kit;
    use super::*;
    use crate::directory::{DirectoryError, InMemoryDirectory};
    use crate::domain::{Address, Decimal, UserId};
    use crate::execution::{MockExecutionClient, RemoteStatus, SubmitOutcome};

    fn quote(token: Option<&str>, fiat: Option<&str>) -> Quote {
        Quote {
            quote_id: "q-1".to_string(),
            user: UserId::new("buyer"),
            chain_id: "137".to_string(),
            recipient: Address::new("0xbuyer"),
            token: "TKN".to_string(),
            token_amount: token.map(|a| Decimal::from_str_canonical(a).unwrap()),
            fiat_token: "USDC".to_string(),
            fiat_amount: fiat.map(|a| Decimal::from_str_canonical(a).unwrap()),
        }
    }

    fn event(id: &str) -> ConversionEvent {
        ConversionEvent {
            event_id: EventId::new(id),
            quote_id: "q-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_both_legs_settle_and_order_succeeds() {
        let k = kit(
            InMemoryDirectory::new().with_quote(quote(Some("100"), Some("42"))),
            MockExecutionClient::new().with_default_submit(SubmitOutcome::Hash("0xc".into())),
        );

        let outcome = k.distributor.convert(&event("conv-1")).await.unwrap();
        assert!(outcome.handled());
        match &outcome {
            ConversionOutcome::Processed { legs, status, .. } => {
                assert_eq!(legs.len(), 2);
                assert_eq!(*status, OrderStatus::Success);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let view = k.distributor.order_status("q-1").await.unwrap();
        assert_eq!(view.status, OrderStatus::Success);
        assert!(view.token_leg.is_some());
        assert!(view.fiat_leg.is_some());
    }

    #[tokio::test]
    async fn test_one_failed_leg_fails_the_order() {
        let k = kit(
            InMemoryDirectory::new().with_quote(quote(Some("100"), Some("42"))),
            MockExecutionClient::new()
                .with_submit(Ok(SubmitOutcome::Hash("0xt".to_string())))
                .with_submit(Ok(SubmitOutcome::Handle("op-f".to_string())))
                .with_poll(Ok(RemoteStatus::Failed {
                    reason: "reverted".to_string(),
                })),
        );

        let first = k.distributor.convert(&event("conv-1")).await.unwrap();
        assert!(!first.handled());
        let view = k.distributor.order_status("q-1").await.unwrap();
        assert_eq!(view.status, OrderStatus::Pending);
        assert_eq!(view.fiat_leg.unwrap().status, TxStatus::PendingHash);

        // Redelivery under another event id reuses both legs.
        let second = k.distributor.convert(&event("conv-2")).await.unwrap();
        assert!(second.handled());
        assert_eq!(k.execution.submit_calls(), 2);
        assert_eq!(
            k.distributor.order_status("q-1").await.unwrap().status,
            OrderStatus::Failure
        );
    }

    #[tokio::test]
    async fn test_single_leg_order_reports_that_leg() {
        let k = kit(
            InMemoryDirectory::new().with_quote(quote(Some("100"), None)),
            MockExecutionClient::new().with_default_submit(SubmitOutcome::Hash("0xc".into())),
        );
        k.distributor.convert(&event("conv-1")).await.unwrap();

        let view = k.distributor.order_status("q-1").await.unwrap();
        assert_eq!(view.status, OrderStatus::Success);
        assert!(view.fiat_leg.is_none());
        assert_eq!(k.store.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_quote() {
        let k = kit(InMemoryDirectory::new(), MockExecutionClient::new());
        let outcome = k.distributor.convert(&event("conv-1")).await.unwrap();
        assert!(matches!(outcome, ConversionOutcome::Skipped { .. }));
        assert!(matches!(
            k.distributor.order_status("q-1").await,
            Err(DistributionError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_order_status_surfaces_quote_book_outage() {
        let k = kit(InMemoryDirectory::new().unavailable(), MockExecutionClient::new());
        assert!(matches!(
            k.distributor.order_status("q-1").await,
            Err(DistributionError::Directory(DirectoryError::Unavailable(_)))
        ));
    }

    #[tokio::test]
    async fn test_known_quote_without_order_is_pending() {
        let k = kit(
            InMemoryDirectory::new().with_quote(quote(Some("1"), Some("1"))),
            MockExecutionClient::new(),
        );
        let view = k.distributor.order_status("q-1").await.unwrap();
        assert_eq!(view.status, OrderStatus::Pending);
        assert!(view.token_leg.is_none());
    }
}
