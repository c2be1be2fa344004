//! Distribution kinds and business keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::primitives::UnknownKind;

/// Which distribution flow produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionKind {
    Transfer,
    Swap,
    Vesting,
    SignupReward,
    ReferralReward,
    LinkReward,
    IsolatedReward,
    ConversionToken,
    ConversionFiat,
}

impl DistributionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionKind::Transfer => "transfer",
            DistributionKind::Swap => "swap",
            DistributionKind::Vesting => "vesting",
            DistributionKind::SignupReward => "signup_reward",
            DistributionKind::ReferralReward => "referral_reward",
            DistributionKind::LinkReward => "link_reward",
            DistributionKind::IsolatedReward => "isolated_reward",
            DistributionKind::ConversionToken => "conversion_token",
            DistributionKind::ConversionFiat => "conversion_fiat",
        }
    }
}

impl fmt::Display for DistributionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "transfer" => DistributionKind::Transfer,
            "swap" => DistributionKind::Swap,
            "vesting" => DistributionKind::Vesting,
            "signup_reward" => DistributionKind::SignupReward,
            "referral_reward" => DistributionKind::ReferralReward,
            "link_reward" => DistributionKind::LinkReward,
            "isolated_reward" => DistributionKind::IsolatedReward,
            "conversion_token" => DistributionKind::ConversionToken,
            "conversion_fiat" => DistributionKind::ConversionFiat,
            other => return Err(UnknownKind(other.to_string())),
        })
    }
}

/// Natural idempotency key of a distribution attempt.
///
/// Format: `<kind>:<hex>` where `<hex>` is the first 16 bytes of a SHA-256
/// over the length-prefixed key parts. Equal parts always give equal keys,
/// and no concatenation of different parts can collide on a separator.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessKey(String);

impl BusinessKey {
    pub fn derive(kind: DistributionKind, parts: &[&str]) -> Self {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(kind.as_str().as_bytes());
        for part in parts {
            hasher.update((part.len() as u32).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        let hash = hasher.finalize();
        BusinessKey(format!("{}:{}", kind.as_str(), hex::encode(&hash[..16])))
    }

    /// Wrap a key read back from storage.
    pub fn from_stored(raw: String) -> Self {
        BusinessKey(raw)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BusinessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
