//! Catalog product commands.
//!
//! # Usage
//!
//! ```bash
//! tienda-cli product add -n "Soporte Técnico IT" -p 120 -c tecnologia
//! ```

use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;

use tienda_core::{Category, CurrencyCode, Price};
use tienda_storefront::db::{NewProduct, ProductRepository, RepositoryError};

use super::{CommandError, connect};

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The product fails validation.
    #[error("Invalid product {name:?}: {reason}")]
    Invalid { name: String, reason: &'static str },

    /// A product with this name already exists.
    #[error("Product already exists: {0}")]
    Exists(String),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// A product as entered on the command line or in a seed file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub currency: CurrencyCode,
    #[serde(default)]
    pub image: String,
    pub category: Category,
}

impl ProductInput {
    /// Validate and convert into an insertable product.
    ///
    /// # Errors
    ///
    /// Returns `ProductError::Invalid` for an empty name or a negative price.
    pub fn validate(self) -> Result<NewProduct, ProductError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(ProductError::Invalid {
                name,
                reason: "name is empty",
            });
        }
        if self.price.is_sign_negative() {
            return Err(ProductError::Invalid {
                name,
                reason: "price is negative",
            });
        }

        Ok(NewProduct {
            name,
            description: self.description.trim().to_owned(),
            price: Price::new(self.price.round_dp(2), self.currency),
            image: self.image.trim().to_owned(),
            category: self.category,
        })
    }
}

/// Add a product to the catalog.
///
/// # Returns
///
/// The ID of the created product.
///
/// # Errors
///
/// Returns an error if validation fails, the name is taken or the database
/// is unreachable.
pub async fn add(input: ProductInput) -> Result<i32, ProductError> {
    let product = input.validate()?;
    let pool = connect().await?;

    tracing::info!("Creating product: {} ({})", product.name, product.category);

    let created = ProductRepository::new(&pool)
        .create(&product)
        .await
        .map_err(|e| match e {
            RepositoryError::Conflict(_) => ProductError::Exists(product.name.clone()),
            other => ProductError::Repository(other),
        })?;

    tracing::info!(
        id = created.id.as_i32(),
        price = %created.price,
        "Product created"
    );
    Ok(created.id.as_i32())
}
