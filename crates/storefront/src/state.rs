//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::cart::RemoteStore;
use crate::catalog::CatalogService;
use crate::config::StorefrontConfig;
use crate::db::PgRemoteStore;
use crate::sessions::CartSessions;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    pool: PgPool,
    catalog: CatalogService,
    carts: CartSessions,
}

impl AppState {
    /// Create a new application state backed by `pool`.
    #[must_use]
    pub fn new(config: StorefrontConfig, pool: PgPool) -> Self {
        let remote: Arc<dyn RemoteStore> = Arc::new(PgRemoteStore::new(pool.clone()));
        let catalog = CatalogService::new(Arc::clone(&remote), config.catalog_ttl);
        let carts = CartSessions::new(remote, catalog.clone(), &config.cart);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                catalog,
                carts,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get the cached product catalog service.
    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    /// Get the per-browser cart registry.
    #[must_use]
    pub fn carts(&self) -> &CartSessions {
        &self.inner.carts
    }
}
