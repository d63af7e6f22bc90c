//! Product repository for the service catalog.

use rust_decimal::Decimal;
use sqlx::PgPool;

use tienda_core::{Category, CurrencyCode, Price, Product, ProductId};

use super::{RepositoryError, conflict_or_database};

/// Product row as stored in `storefront.product`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ProductRow {
    pub id: i32,
    pub name: String,
    pub description: String,
    pub price: Decimal,
    pub currency_code: String,
    pub image: String,
    pub category: String,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let category: Category = row.category.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;
        let currency: CurrencyCode = row.currency_code.parse().map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;
        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price: Price::new(row.price, currency),
            image: row.image,
            category,
        })
    }
}

/// A product to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub image: String,
    pub category: Category,
}

/// Repository for catalog database operations.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every product, ordered by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row has an unknown category or currency.
    pub async fn list(&self) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, currency_code, image, category
            FROM storefront.product
            ORDER BY id
            ",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Get a product by its ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            SELECT id, name, description, price, currency_code, image, category
            FROM storefront.product
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Insert a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a product with the same name exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, product: &NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(
            r"
            INSERT INTO storefront.product (name, description, price, currency_code, image, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, name, description, price, currency_code, image, category
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount)
        .bind(product.price.currency_code.as_str())
        .bind(&product.image)
        .bind(product.category.as_str())
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_or_database(e, "product"))?;

        Product::try_from(row)
    }

    /// Insert a product unless one with the same name exists. Returns whether a
    /// row was inserted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn create_if_missing(&self, product: &NewProduct) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO storefront.product (name, description, price, currency_code, image, category)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO NOTHING
            ",
        )
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price.amount)
        .bind(product.price.currency_code.as_str())
        .bind(&product.image)
        .bind(product.category.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(category: &str, currency: &str) -> ProductRow {
        ProductRow {
            id: 7,
            name: "Reparación de Electrodomésticos".to_string(),
            description: "Servicio a domicilio".to_string(),
            price: Decimal::new(9000, 2),
            currency_code: currency.to_string(),
            image: "https://img.example/7.jpg".to_string(),
            category: category.to_string(),
        }
    }

    #[test]
    fn test_row_converts_to_product() {
        let product = Product::try_from(row("hogar", "USD")).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(product.id, ProductId::new(7));
        assert_eq!(product.category, Category::Home);
        assert_eq!(product.price.to_string(), "$90.00");
    }

    #[test]
    fn test_unknown_category_is_corruption() {
        let err = Product::try_from(row("jardin", "USD")).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }

    #[test]
    fn test_unknown_currency_is_corruption() {
        let err = Product::try_from(row("hogar", "XXX")).unwrap_err();
        assert!(matches!(err, RepositoryError::DataCorruption(_)));
    }
}
