//! Integration tests for Tienda.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tienda-integration-tests
//! ```
//!
//! The tests drive [`CartSynchronizer`] through the in-memory remote and
//! local stores, so no database is needed.
//!
//! # Test Categories
//!
//! - `cart_properties` - Invariants that hold after any command sequence
//! - `cart_scenarios` - Ownership transitions and remote mutations
//! - `cart_sessions` - Per-browser carts backed by JSON files

#![allow(clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tienda_core::{Category, CurrencyCode, Price, Product, ProductId};
use tienda_storefront::cart::memory::{MemoryCartStore, MemoryRemoteStore, RecordingObserver};
use tienda_storefront::cart::{CartSynchronizer, SyncingPolicy};
use tienda_storefront::catalog::Catalog;

/// A catalog product with a whole-unit price.
#[must_use]
pub fn product(id: i32, name: &str, price: i64, category: Category) -> Product {
    Product {
        id: ProductId::new(id),
        name: name.to_string(),
        description: String::new(),
        price: Price::new(Decimal::from(price), CurrencyCode::USD),
        image: format!("https://img.example/{id}.jpg"),
        category,
    }
}

/// The storefront's service catalog.
#[must_use]
pub fn services() -> Vec<Product> {
    vec![
        product(1, "Desarrollo Web Pro", 1500, Category::Technology),
        product(2, "Marketing Digital", 800, Category::Technology),
        product(3, "Clases de Guitarra", 50, Category::Education),
        product(4, "Asesoría Financiera", 200, Category::Education),
        product(5, "Jardinería a Domicilio", 75, Category::Home),
        product(6, "Limpieza Profesional", 90, Category::Home),
        product(7, "Soporte Técnico IT", 120, Category::Technology),
    ]
}

/// A synchronizer wired to in-memory stores the test can inspect.
pub struct TestContext {
    pub remote: Arc<MemoryRemoteStore>,
    pub local: Arc<MemoryCartStore>,
    pub observer: Arc<RecordingObserver>,
    pub sync: Arc<CartSynchronizer>,
}

impl TestContext {
    #[must_use]
    pub fn new(policy: SyncingPolicy) -> Self {
        Self::with_catalog(services(), policy)
    }

    #[must_use]
    pub fn with_catalog(products: Vec<Product>, policy: SyncingPolicy) -> Self {
        let remote = Arc::new(MemoryRemoteStore::new(products.clone()));
        let local = Arc::new(MemoryCartStore::new());
        let observer = Arc::new(RecordingObserver::new());
        let sync = Arc::new(
            CartSynchronizer::new(
                remote.clone(),
                local.clone(),
                Arc::new(Catalog::new(products)),
            )
            .with_observer(observer.clone())
            .with_policy(policy),
        );
        Self {
            remote,
            local,
            observer,
            sync,
        }
    }
}

/// Yield until `condition` holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let reached = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::task::yield_now().await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition not reached in time");
}
