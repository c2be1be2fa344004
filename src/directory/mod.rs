//! Read-only lookups for users, wallets, referral codes and quotes.
//!
//! Absence and failure are both answers here: callers treat them as
//! "precondition not met", never as engine errors.

use crate::domain::{Address, Quote, UserId};
use async_trait::async_trait;
use thiserror::Error;

pub mod memory;

pub use memory::InMemoryDirectory;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error("corrupt directory entry: {0}")]
    Corrupt(String),
    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Whether the user is already present in the user store.
    async fn is_registered(&self, user: &UserId) -> Result<bool, DirectoryError>;

    /// Resolved wallet address for a user, if one is known.
    async fn wallet_address(&self, user: &UserId) -> Result<Option<Address>, DirectoryError>;

    /// The user owning a referral code.
    async fn resolve_referral_code(&self, code: &str) -> Result<Option<UserId>, DirectoryError>;
}

#[async_trait]
pub trait QuoteBook: Send + Sync {
    async fn find_quote(&self, quote_id: &str) -> Result<Option<Quote>, DirectoryError>;
}
