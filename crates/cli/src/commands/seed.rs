//! Seed the catalog from a YAML file.
//!
//! Products whose name already exists are skipped, so the command can be run
//! repeatedly.
//!
//! ```yaml
//! products:
//!   - name: Clases de Guitarra
//!     description: Aprende a tocar desde cero.
//!     price: "50.00"
//!     image: https://img.example/guitarra.jpg
//!     category: educacion
//! ```

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};

use tienda_storefront::db::{NewProduct, ProductRepository, RepositoryError};

use super::product::ProductInput;
use super::{CommandError, connect};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("{0} invalid products found")]
    Invalid(usize),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Top-level layout of a seed file.
#[derive(Debug, Deserialize)]
pub struct CatalogFile {
    pub products: Vec<ProductInput>,
}

/// Parse and validate a seed file's contents.
///
/// Every invalid product is reported, not only the first.
fn parse(content: &str) -> Result<Vec<NewProduct>, SeedError> {
    let file: CatalogFile = serde_yaml::from_str(content)?;

    let (valid, invalid): (Vec<_>, Vec<_>) = file
        .products
        .into_iter()
        .map(ProductInput::validate)
        .partition(Result::is_ok);

    if !invalid.is_empty() {
        error!("Seed file validation failed:");
        for err in invalid.iter().filter_map(|r| r.as_ref().err()) {
            error!("  - {err}");
        }
        return Err(SeedError::Invalid(invalid.len()));
    }

    Ok(valid.into_iter().filter_map(Result::ok).collect())
}

/// Seed catalog products from `file_path`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, any product is
/// invalid, or database operations fail.
pub async fn catalog(file_path: &str) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::NotFound(file_path.to_owned()));
    }

    info!(path = %file_path, "Loading catalog from file");

    // Validate before connecting to the database
    let content = tokio::fs::read_to_string(path).await?;
    let products = parse(&content)?;
    info!(products = products.len(), "Parsed catalog");

    let pool = connect().await?;
    let repo = ProductRepository::new(&pool);

    let mut inserted = 0_usize;
    let mut skipped = 0_usize;
    for product in &products {
        if repo.create_if_missing(product).await? {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    info!("Seeding complete!");
    info!("  Products inserted: {inserted}");
    info!("  Products skipped (already exist): {skipped}");

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tienda_core::{Category, CurrencyCode};

    use super::*;

    #[test]
    fn test_parse_catalog() {
        let yaml = r#"
products:
  - name: Desarrollo Web Pro
    description: Creación de sitios web a medida.
    price: "1500.00"
    category: tecnologia
  - name: Jardinería a Domicilio
    price: "75"
    currency: USD
    image: https://img.example/jardin.jpg
    category: hogar
"#;
        let products = parse(yaml).unwrap();

        assert_eq!(products.len(), 2);
        assert_eq!(products[0].category, Category::Technology);
        assert_eq!(products[0].price.to_string(), "$1500.00");
        assert_eq!(products[1].price.currency_code, CurrencyCode::USD);
        assert!(products[1].description.is_empty());
    }

    #[test]
    fn test_parse_reports_every_invalid_product() {
        let yaml = r#"
products:
  - name: ""
    price: "10"
    category: hogar
  - name: Limpieza Profesional
    price: "-90"
    category: hogar
  - name: Soporte Técnico IT
    price: "120"
    category: tecnologia
"#;
        assert!(matches!(parse(yaml), Err(SeedError::Invalid(2))));
    }

    #[test]
    fn test_parse_rejects_unknown_category() {
        let yaml = r#"
products:
  - name: Clases de Cocina
    price: "40"
    category: cocina
"#;
        assert!(matches!(parse(yaml), Err(SeedError::Yaml(_))));
    }

    #[test]
    fn test_bundled_catalog_is_valid() {
        let content = include_str!("../../data/catalog.yaml");
        assert_eq!(parse(content).unwrap().len(), 7);
    }
}
