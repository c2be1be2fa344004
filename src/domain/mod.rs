//! Domain types for the payout engine.
//!
//! This module provides:
//! - The transaction status taxonomy and the reported order status
//! - Primitives: TimeMs, Address, UserId, EventId and the lossless Decimal
//! - Business keys and distribution kinds
//! - Transaction records, payloads, orders, quotes and inbound events

pub mod decimal;
pub mod event;
pub mod keys;
pub mod order;
pub mod primitives;
pub mod record;
pub mod status;

pub use decimal::Decimal;
pub use event::{
    ConversionEvent, DirectEvent, IsolatedEvent, LinkEvent, ReferralEvent, SignupEvent,
};
pub use keys::{BusinessKey, DistributionKind};
pub use order::{Leg, Order, Quote};
pub use primitives::{Address, EventId, IdentifierParseError, TimeMs, UnknownKind, UserId};
pub use record::{Payload, TransactionRecord};
pub use status::{OrderStatus, TxStatus, UnknownStatus};
