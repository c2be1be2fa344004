//! Domain primitives: TimeMs, Address, UserId, EventId.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeMs(pub i64);

impl TimeMs {
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// Time elapsed from `self` until `later`; zero if `later` is earlier.
    pub fn elapsed_until(&self, later: TimeMs) -> Duration {
        Duration::from_millis(later.0.saturating_sub(self.0).max(0) as u64)
    }

    /// `self` moved back by `d`, clamped at the earliest representable time.
    pub fn minus(&self, d: Duration) -> TimeMs {
        let ms = i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
        TimeMs(self.0.saturating_sub(ms))
    }

    /// RFC 3339 rendering for API responses.
    pub fn to_rfc3339(&self) -> String {
        use chrono::TimeZone;
        match chrono::Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) => dt.to_rfc3339(),
            None => self.0.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown distribution kind: {0}")]
pub struct UnknownKind(pub String);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdentifierParseError {
    #[error("{0} must not be empty")]
    Empty(&'static str),
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                $name(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FromStr for $name {
            type Err = IdentifierParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return Err(IdentifierParseError::Empty($label));
                }
                Ok($name(trimmed.to_string()))
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// On-chain wallet address.
    Address,
    "address"
);

string_id!(
    /// Application user identifier.
    UserId,
    "user id"
);

string_id!(
    /// Externally supplied idempotency token of an inbound event.
    EventId,
    "event id"
);
