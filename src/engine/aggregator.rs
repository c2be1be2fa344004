//! Merge rule for the two legs of a purchase order.

use crate::domain::{OrderStatus, TxStatus};

/// Reported status of an order given the status of each leg.
///
/// First match wins:
/// 1. a missing leg is ignored and the other leg is reported as-is
/// 2. any `FAILURE` gives `FAILURE`
/// 3. `PENDING_HASH` reads as `PENDING`
/// 4. two `SUCCESS` legs give `SUCCESS`
/// 5. anything else is `PENDING`
///
/// An order with neither leg reports `PENDING`.
pub fn aggregate_legs(token: Option<TxStatus>, fiat: Option<TxStatus>) -> OrderStatus {
    match (token, fiat) {
        (None, None) => OrderStatus::Pending,
        (Some(only), None) | (None, Some(only)) => OrderStatus::from(only),
        (Some(token), Some(fiat)) => {
            if token == TxStatus::Failure || fiat == TxStatus::Failure {
                return OrderStatus::Failure;
            }
            match (OrderStatus::from(token), OrderStatus::from(fiat)) {
                (OrderStatus::Success, OrderStatus::Success) => OrderStatus::Success,
                _ => OrderStatus::Pending,
            }
        }
    }
}
