//! `PostgreSQL` implementation of the cart's remote store.
//!
//! Authenticated carts live in `storefront.cart_item` with a unique
//! `(user_id, product_id)` key. Rows are joined with `storefront.product` on
//! read so the cart gets the product snapshot it displays.

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::instrument;

use tienda_core::{CurrencyCode, Price, Product, ProductId, UserId};

use super::RepositoryError;
use super::products::ProductRepository;
use crate::cart::{CartRow, RemoteError, RemoteStore};

impl From<sqlx::Error> for RemoteError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db_err)
                if db_err.is_foreign_key_violation()
                    || db_err.is_unique_violation()
                    || db_err.is_check_violation() =>
            {
                Self::Constraint(db_err.to_string())
            }
            sqlx::Error::Database(db_err)
                if db_err.code().is_some_and(|code| is_auth_failure(&code)) =>
            {
                Self::Unauthorized
            }
            sqlx::Error::RowNotFound
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::Decode(_) => Self::Data(e.to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

/// SQLSTATE class 28 (invalid authorization) and `insufficient_privilege`.
fn is_auth_failure(code: &str) -> bool {
    code.starts_with("28") || code == "42501"
}

impl From<RepositoryError> for RemoteError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Database(e) => e.into(),
            RepositoryError::Conflict(msg) => Self::Constraint(msg),
            RepositoryError::DataCorruption(msg) => Self::Data(msg),
            RepositoryError::NotFound => Self::Data("not found".to_owned()),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CartRowRecord {
    product_id: i32,
    quantity: i32,
    name: String,
    price: Decimal,
    currency_code: String,
    image: String,
}

impl TryFrom<CartRowRecord> for CartRow {
    type Error = RemoteError;

    fn try_from(r: CartRowRecord) -> Result<Self, Self::Error> {
        let quantity = u32::try_from(r.quantity).map_err(|_| {
            RemoteError::Data(format!("negative quantity for product {}", r.product_id))
        })?;
        let currency: CurrencyCode = r
            .currency_code
            .parse()
            .map_err(|e| RemoteError::Data(format!("product {}: {e}", r.product_id)))?;
        Ok(Self {
            product_id: ProductId::new(r.product_id),
            quantity,
            name: r.name,
            unit_price: Price::new(r.price, currency),
            image: r.image,
        })
    }
}

const SELECT_ROWS: &str = r"
    SELECT c.product_id, c.quantity, p.name, p.price, p.currency_code, p.image
    FROM storefront.cart_item c
    JOIN storefront.product p ON p.id = c.product_id
";

/// Remote store backed by the storefront database.
#[derive(Debug, Clone)]
pub struct PgRemoteStore {
    pool: PgPool,
}

impl PgRemoteStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RemoteStore for PgRemoteStore {
    #[instrument(skip(self))]
    async fn fetch_catalog(&self) -> Result<Vec<Product>, RemoteError> {
        Ok(ProductRepository::new(&self.pool).list().await?)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn fetch_cart_rows(&self, user: UserId) -> Result<Vec<CartRow>, RemoteError> {
        let records = sqlx::query_as::<_, CartRowRecord>(&format!(
            "{SELECT_ROWS} WHERE c.user_id = $1 ORDER BY c.created_at, c.id"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .filter(|r| r.quantity > 0)
            .map(CartRow::try_from)
            .collect()
    }

    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    async fn find_cart_row(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<CartRow>, RemoteError> {
        let record = sqlx::query_as::<_, CartRowRecord>(&format!(
            "{SELECT_ROWS} WHERE c.user_id = $1 AND c.product_id = $2"
        ))
        .bind(user)
        .bind(product)
        .fetch_optional(&self.pool)
        .await?;

        record.map(CartRow::try_from).transpose()
    }

    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    async fn upsert_cart_row(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        let quantity = i32::try_from(quantity)
            .map_err(|_| RemoteError::Constraint(format!("quantity {quantity} out of range")))?;

        sqlx::query(
            r"
            INSERT INTO storefront.cart_item (user_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, product_id)
            DO UPDATE SET quantity = EXCLUDED.quantity, updated_at = NOW()
            ",
        )
        .bind(user)
        .bind(product)
        .bind(quantity)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    async fn delete_cart_row(&self, user: UserId, product: ProductId) -> Result<(), RemoteError> {
        sqlx::query(
            r"
            DELETE FROM storefront.cart_item
            WHERE user_id = $1 AND product_id = $2
            ",
        )
        .bind(user)
        .bind(product)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn delete_all_cart_rows(&self, user: UserId) -> Result<(), RemoteError> {
        sqlx::query("DELETE FROM storefront.cart_item WHERE user_id = $1")
            .bind(user)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(quantity: i32) -> CartRowRecord {
        CartRowRecord {
            product_id: 2,
            quantity,
            name: "Clases de Programación".to_string(),
            price: Decimal::from(1500),
            currency_code: "USD".to_string(),
            image: String::new(),
        }
    }

    #[test]
    fn test_record_converts_to_row() {
        let row = CartRow::try_from(record(3)).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(row.product_id, ProductId::new(2));
        assert_eq!(row.quantity, 3);
        assert_eq!(row.into_entry().line_total().amount, Decimal::from(4500));
    }

    #[test]
    fn test_negative_quantity_is_data_error() {
        assert!(matches!(
            CartRow::try_from(record(-1)),
            Err(RemoteError::Data(_))
        ));
    }

    #[test]
    fn test_sqlx_errors_map_to_remote_errors() {
        assert!(matches!(
            RemoteError::from(sqlx::Error::RowNotFound),
            RemoteError::Data(_)
        ));
        assert!(matches!(
            RemoteError::from(sqlx::Error::PoolTimedOut),
            RemoteError::Unavailable(_)
        ));
        assert!(matches!(
            RemoteError::from(RepositoryError::Conflict("dup".to_owned())),
            RemoteError::Constraint(_)
        ));
    }

    #[test]
    fn test_auth_sqlstates_are_unauthorized() {
        assert!(is_auth_failure("28P01"));
        assert!(is_auth_failure("28000"));
        assert!(is_auth_failure("42501"));
        assert!(!is_auth_failure("23505"));
        assert!(!is_auth_failure("08006"));
    }
}
