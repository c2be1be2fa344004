//! Users, wallets, referral codes and quotes.
//!
//! Read through the `UserDirectory` and `QuoteBook` traits. The upsert
//! helpers are how operators and tests populate the tables.

use crate::directory::{DirectoryError, QuoteBook, UserDirectory};
use crate::domain::{Address, Quote, TimeMs, UserId};
use async_trait::async_trait;
use sqlx::Row;

use super::Repository;

impl Repository {
    /// Register a user, optionally owning a referral code.
    pub async fn register_user(
        &self,
        user: &UserId,
        referral_code: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, referral_code, registered_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET referral_code = COALESCE(excluded.referral_code, users.referral_code)
            "#,
        )
        .bind(user.as_str())
        .bind(referral_code)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn upsert_wallet(&self, user: &UserId, address: &Address) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, address, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET address = excluded.address, updated_at = excluded.updated_at
            "#,
        )
        .bind(user.as_str())
        .bind(address.as_str())
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn put_quote(&self, quote: &Quote) -> Result<(), DirectoryError> {
        let body = serde_json::to_string(quote)
            .map_err(|e| DirectoryError::Corrupt(format!("quote {}: {}", quote.quote_id, e)))?;
        sqlx::query(
            r#"
            INSERT INTO quotes (quote_id, body, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(quote_id) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(&quote.quote_id)
        .bind(body)
        .bind(TimeMs::now().as_ms())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for Repository {
    async fn is_registered(&self, user: &UserId) -> Result<bool, DirectoryError> {
        let row = sqlx::query("SELECT 1 AS present FROM users WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn wallet_address(&self, user: &UserId) -> Result<Option<Address>, DirectoryError> {
        let row = sqlx::query("SELECT address FROM wallets WHERE user_id = ?")
            .bind(user.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .map(|r| r.get::<String, _>("address"))
            .filter(|a| !a.trim().is_empty())
            .map(Address::new))
    }

    async fn resolve_referral_code(&self, code: &str) -> Result<Option<UserId>, DirectoryError> {
        let row = sqlx::query("SELECT user_id FROM users WHERE referral_code = ?")
            .bind(code.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| UserId::new(r.get::<String, _>("user_id"))))
    }
}

#[async_trait]
impl QuoteBook for Repository {
    async fn find_quote(&self, quote_id: &str) -> Result<Option<Quote>, DirectoryError> {
        let row = sqlx::query("SELECT body FROM quotes WHERE quote_id = ?")
            .bind(quote_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let body: String = row.get("body");
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| DirectoryError::Corrupt(format!("quote {}: {}", quote_id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup_repo;
    use super::*;
    use crate::domain::Decimal;
    use std::str::FromStr;

    #[tokio::test]
    async fn test_user_and_referral_code() {
        let (repo, _temp) = setup_repo().await;
        let alice = UserId::new("alice");
        repo.register_user(&alice, Some("ALICE1")).await.unwrap();

        assert!(repo.is_registered(&alice).await.unwrap());
        assert!(!repo.is_registered(&UserId::new("bob")).await.unwrap());
        assert_eq!(repo.resolve_referral_code("ALICE1").await.unwrap(), Some(alice.clone()));
        assert!(repo.resolve_referral_code("NOPE").await.unwrap().is_none());

        // Re-registering without a code keeps the existing one.
        repo.register_user(&alice, None).await.unwrap();
        assert_eq!(repo.resolve_referral_code("ALICE1").await.unwrap(), Some(alice));
    }

    #[tokio::test]
    async fn test_wallet_upsert() {
        let (repo, _temp) = setup_repo().await;
        let user = UserId::new("u1");
        assert!(repo.wallet_address(&user).await.unwrap().is_none());

        repo.upsert_wallet(&user, &Address::new("0x1")).await.unwrap();
        repo.upsert_wallet(&user, &Address::new("0x2")).await.unwrap();
        assert_eq!(repo.wallet_address(&user).await.unwrap(), Some(Address::new("0x2")));
    }

    #[tokio::test]
    async fn test_quote_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let quote = Quote {
            quote_id: "q-9".to_string(),
            user: UserId::new("u1"),
            chain_id: "8453".to_string(),
            recipient: Address::new("0xfeed"),
            token: "TKN".to_string(),
            token_amount: Some(Decimal::from_str("0.000000000000000001").unwrap()),
            fiat_token: "USDC".to_string(),
            fiat_amount: None,
        };
        repo.put_quote(&quote).await.unwrap();

        assert_eq!(repo.find_quote("q-9").await.unwrap(), Some(quote));
        assert!(repo.find_quote("q-0").await.unwrap().is_none());
    }
}
