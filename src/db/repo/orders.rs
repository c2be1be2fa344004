//! Purchase order operations for the repository.

use crate::db::store::{InsertOutcome, StoreError};
use crate::domain::{Leg, Order, Quote, TimeMs, UserId};
use sqlx::Row;
use uuid::Uuid;

use super::{parse_uuid, Repository};

impl Repository {
    pub async fn insert_order_row(&self, order: &Order) -> Result<InsertOutcome, StoreError> {
        let quote = serde_json::to_string(&order.quote)
            .map_err(|e| StoreError::Corrupt(format!("order {} quote: {}", order.quote_id, e)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO orders (quote_id, user_id, token_leg_id, fiat_leg_id, quote, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(quote_id) DO NOTHING
            "#,
        )
        .bind(&order.quote_id)
        .bind(order.user.as_str())
        .bind(order.token_leg_id.map(|id| id.to_string()))
        .bind(order.fiat_leg_id.map(|id| id.to_string()))
        .bind(quote)
        .bind(order.created_at.as_ms())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Conflict);
        }
        Ok(InsertOutcome::Inserted)
    }

    pub async fn get_order(&self, quote_id: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT quote_id, user_id, token_leg_id, fiat_leg_id, quote, created_at
            FROM orders
            WHERE quote_id = ?
            "#,
        )
        .bind(quote_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let quote_json: String = row.get("quote");
        let quote: Quote = serde_json::from_str(&quote_json)
            .map_err(|e| StoreError::Corrupt(format!("order {} quote: {}", quote_id, e)))?;
        let token_leg_id: Option<String> = row.get("token_leg_id");
        let fiat_leg_id: Option<String> = row.get("fiat_leg_id");

        Ok(Some(Order {
            quote_id: row.get("quote_id"),
            user: UserId::new(row.get::<String, _>("user_id")),
            token_leg_id: token_leg_id.as_deref().map(parse_uuid).transpose()?,
            fiat_leg_id: fiat_leg_id.as_deref().map(parse_uuid).transpose()?,
            quote,
            created_at: TimeMs::new(row.get("created_at")),
        }))
    }

    /// Set a leg id unless the leg is already bound.
    pub async fn bind_leg(
        &self,
        quote_id: &str,
        leg: Leg,
        record_id: Uuid,
    ) -> Result<(), StoreError> {
        let sql = match leg {
            Leg::Token => {
                "UPDATE orders SET token_leg_id = COALESCE(token_leg_id, ?) WHERE quote_id = ?"
            }
            Leg::Fiat => {
                "UPDATE orders SET fiat_leg_id = COALESCE(fiat_leg_id, ?) WHERE quote_id = ?"
            }
        };
        let result = sqlx::query(sql)
            .bind(record_id.to_string())
            .bind(quote_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Corrupt(format!("order {} not found", quote_id)));
        }
        Ok(())
    }
}
