//! Anonymous carts stored as JSON files, one per cart token.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tienda_core::CartEntry;
use uuid::Uuid;

use super::ports::{LocalCartStore, LocalStoreError};

/// Stores one anonymous cart at `<dir>/<token>.json`.
///
/// Writes go to a temporary file first and are renamed into place, so a crash
/// mid-write leaves the previous cart intact.
#[derive(Debug, Clone)]
pub struct JsonFileCartStore {
    path: PathBuf,
}

impl JsonFileCartStore {
    #[must_use]
    pub fn new(dir: &Path, token: Uuid) -> Self {
        Self {
            path: dir.join(format!("{token}.json")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LocalCartStore for JsonFileCartStore {
    async fn read(&self) -> Result<Option<Vec<CartEntry>>, LocalStoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    async fn write(&self, entries: &[CartEntry]) -> Result<(), LocalStoreError> {
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        let json = serde_json::to_vec(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use tienda_core::{CurrencyCode, Price, ProductId};

    use super::*;

    fn entry(id: i32, quantity: u32) -> CartEntry {
        CartEntry {
            product_id: ProductId::new(id),
            name: "Instalación de software".to_string(),
            unit_price: Price::new(Decimal::new(4999, 2), CurrencyCode::USD),
            image: "https://img.example/software.jpg".to_string(),
            quantity,
        }
    }

    #[tokio::test]
    async fn test_missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartStore::new(dir.path(), Uuid::new_v4());
        assert!(store.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartStore::new(&dir.path().join("carts"), Uuid::new_v4());

        store.write(&[entry(1, 2), entry(4, 1)]).await.unwrap();
        let entries = store.read().await.unwrap().unwrap();

        assert_eq!(entries, vec![entry(1, 2), entry(4, 1)]);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileCartStore::new(dir.path(), Uuid::new_v4());
        tokio::fs::write(store.path(), b"[{\"product_id\":").await.unwrap();

        let err = store.read().await.unwrap_err();
        assert!(matches!(err, LocalStoreError::Corrupt(_)));
    }
}
