//! Purchase ("conversion") orders and the quotes they originate from.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Address, Decimal, TimeMs, UserId};

/// One of the two sub-transactions of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Token,
    Fiat,
}

impl Leg {
    pub fn as_str(&self) -> &'static str {
        match self {
            Leg::Token => "token",
            Leg::Fiat => "fiat",
        }
    }
}

impl fmt::Display for Leg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priced purchase quote supplied by the quoting collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub quote_id: String,
    pub user: UserId,
    pub chain_id: String,
    pub recipient: Address,
    pub token: String,
    pub token_amount: Option<Decimal>,
    pub fiat_token: String,
    pub fiat_amount: Option<Decimal>,
}

impl Quote {
    /// Amount for a leg, if that leg is part of this purchase.
    pub fn leg_amount(&self, leg: Leg) -> Option<Decimal> {
        let amount = match leg {
            Leg::Token => self.token_amount,
            Leg::Fiat => self.fiat_amount,
        };
        amount.filter(|a| a.is_positive())
    }

    pub fn leg_token(&self, leg: Leg) -> &str {
        match leg {
            Leg::Token => &self.token,
            Leg::Fiat => &self.fiat_token,
        }
    }
}

/// Order metadata; references its leg records by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub quote_id: String,
    pub user: UserId,
    pub token_leg_id: Option<Uuid>,
    pub fiat_leg_id: Option<Uuid>,
    pub quote: Quote,
    pub created_at: TimeMs,
}

impl Order {
    pub fn from_quote(quote: Quote) -> Self {
        Self {
            quote_id: quote.quote_id.clone(),
            user: quote.user.clone(),
            token_leg_id: None,
            fiat_leg_id: None,
            quote,
            created_at: TimeMs::now(),
        }
    }

    pub fn leg_id(&self, leg: Leg) -> Option<Uuid> {
        match leg {
            Leg::Token => self.token_leg_id,
            Leg::Fiat => self.fiat_leg_id,
        }
    }
}
