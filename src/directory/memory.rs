//! In-memory directory for tests and embedding.

use super::{DirectoryError, QuoteBook, UserDirectory};
use crate::domain::{Address, Quote, UserId};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};

/// Directory backed by fixed maps, built with `with_*` calls.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    registered: HashSet<UserId>,
    wallets: HashMap<UserId, Address>,
    referral_codes: HashMap<String, UserId>,
    quotes: HashMap<String, Quote>,
    unavailable: bool,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registered(mut self, user: UserId) -> Self {
        self.registered.insert(user);
        self
    }

    pub fn with_wallet(mut self, user: UserId, address: Address) -> Self {
        self.wallets.insert(user, address);
        self
    }

    pub fn with_referral_code(mut self, code: &str, owner: UserId) -> Self {
        self.referral_codes.insert(code.to_string(), owner);
        self
    }

    pub fn with_quote(mut self, quote: Quote) -> Self {
        self.quotes.insert(quote.quote_id.clone(), quote);
        self
    }

    /// Make every lookup fail.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    fn check(&self) -> Result<(), DirectoryError> {
        if self.unavailable {
            return Err(DirectoryError::Unavailable("in-memory directory offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn is_registered(&self, user: &UserId) -> Result<bool, DirectoryError> {
        self.check()?;
        Ok(self.registered.contains(user))
    }

    async fn wallet_address(&self, user: &UserId) -> Result<Option<Address>, DirectoryError> {
        self.check()?;
        Ok(self.wallets.get(user).cloned())
    }

    async fn resolve_referral_code(&self, code: &str) -> Result<Option<UserId>, DirectoryError> {
        self.check()?;
        Ok(self.referral_codes.get(code).cloned())
    }
}

#[async_trait]
impl QuoteBook for InMemoryDirectory {
    async fn find_quote(&self, quote_id: &str) -> Result<Option<Quote>, DirectoryError> {
        self.check()?;
        Ok(self.quotes.get(quote_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookups() {
        let dir = InMemoryDirectory::new()
            .with_registered(UserId::new("u1"))
            .with_wallet(UserId::new("u2"), Address::new("0x2"))
            .with_referral_code("ABC", UserId::new("u1"));

        assert!(dir.is_registered(&UserId::new("u1")).await.unwrap());
        assert!(!dir.is_registered(&UserId::new("u2")).await.unwrap());
        assert_eq!(
            dir.wallet_address(&UserId::new("u2")).await.unwrap(),
            Some(Address::new("0x2"))
        );
        assert_eq!(
            dir.resolve_referral_code("ABC").await.unwrap(),
            Some(UserId::new("u1"))
        );
        assert!(dir.find_quote("q").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_lookup() {
        let dir = InMemoryDirectory::new().unavailable();
        assert!(dir.is_registered(&UserId::new("u1")).await.is_err());
        assert!(dir.find_quote("q").await.is_err());
    }
}
