//! In-memory registry of cart synchronizers, one per browser.
//!
//! Each browser session carries a random cart token. The token names both the
//! anonymous cart file and the entry in this registry. Entries are evicted
//! after a period of inactivity; the next request rebuilds the synchronizer
//! from the cart file or the remote store.

use std::path::PathBuf;
use std::sync::Arc;

use moka::future::Cache;
use tienda_core::UserId;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cart::{
    CartOwner, CartState, CartSynchronizer, JsonFileCartStore, RemoteError, RemoteStore,
    SyncingPolicy,
};
use crate::catalog::CatalogService;
use crate::config::CartConfig;

/// A shopper's synchronizer plus a receiver of its latest state.
#[derive(Clone)]
pub struct CartHandle {
    sync: Arc<CartSynchronizer>,
    view: watch::Receiver<CartState>,
}

impl CartHandle {
    #[must_use]
    pub fn sync(&self) -> &CartSynchronizer {
        &self.sync
    }

    /// The state most recently published by the synchronizer.
    #[must_use]
    pub fn latest(&self) -> CartState {
        self.view.borrow().clone()
    }
}

/// Registry of cart synchronizers keyed by cart token.
#[derive(Clone)]
pub struct CartSessions {
    inner: Arc<CartSessionsInner>,
}

struct CartSessionsInner {
    remote: Arc<dyn RemoteStore>,
    catalog: CatalogService,
    dir: PathBuf,
    policy: SyncingPolicy,
    carts: Cache<Uuid, CartHandle>,
}

impl CartSessions {
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteStore>, catalog: CatalogService, config: &CartConfig) -> Self {
        let carts = Cache::builder()
            .max_capacity(config.session_capacity)
            .time_to_idle(config.session_idle)
            .build();

        Self {
            inner: Arc::new(CartSessionsInner {
                remote,
                catalog,
                dir: config.dir.clone(),
                policy: config.syncing_policy,
                carts,
            }),
        }
    }

    /// The cart for `token`.
    ///
    /// On first use the synchronizer is created, the anonymous cart is restored
    /// from disk and the cart signs in as `user`. An existing cart is returned
    /// as it is: only [`Self::switch`] moves it between owners, so a sign-in
    /// that failed is not retried until the next login.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    #[instrument(skip(self), fields(cart_token = %token))]
    pub async fn open(&self, token: Uuid, user: Option<UserId>) -> Result<CartHandle, RemoteError> {
        Ok(self.entry(token, user).await?.0)
    }

    /// The cart for `token`, moved to `user`.
    ///
    /// Called when the session's identity changes (login, logout). A failed
    /// sign-in leaves an empty anonymous cart and is logged.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be loaded.
    #[instrument(skip(self), fields(cart_token = %token))]
    pub async fn switch(&self, token: Uuid, user: Option<UserId>) -> Result<CartHandle, RemoteError> {
        let (handle, created) = self.entry(token, user).await?;
        if !created {
            align_owner(&handle.sync, user).await;
        }
        Ok(handle)
    }

    /// Drop the in-memory cart for `token`. The anonymous cart file is kept.
    pub async fn forget(&self, token: Uuid) {
        self.inner.carts.invalidate(&token).await;
    }

    /// Look up the cart for `token`, creating it for `user` if needed. The
    /// flag is true when this call created it.
    async fn entry(
        &self,
        token: Uuid,
        user: Option<UserId>,
    ) -> Result<(CartHandle, bool), RemoteError> {
        let catalog = self.inner.catalog.get().await?;

        let entry = self
            .inner
            .carts
            .entry(token)
            .or_insert_with(async {
                debug!("creating cart synchronizer");
                let (tx, rx) = watch::channel(CartState::new());
                let local = JsonFileCartStore::new(&self.inner.dir, token);
                let sync = CartSynchronizer::new(
                    Arc::clone(&self.inner.remote),
                    Arc::new(local),
                    Arc::clone(&catalog),
                )
                .with_observer(Arc::new(tx))
                .with_policy(self.inner.policy);
                sync.restore().await;
                align_owner(&sync, user).await;
                CartHandle {
                    sync: Arc::new(sync),
                    view: rx,
                }
            })
            .await;

        let created = entry.is_fresh();
        let handle = entry.into_value();
        handle.sync.set_catalog(catalog);
        Ok((handle, created))
    }
}

/// Sign the cart in or out so it belongs to `user`.
async fn align_owner(sync: &CartSynchronizer, user: Option<UserId>) {
    let target = user.map_or(CartOwner::Anonymous, CartOwner::User);
    if sync.owner() == target {
        return;
    }
    match user {
        Some(id) => {
            if let Err(e) = sync.sign_in(id).await {
                warn!(user_id = %id, error = %e, "cart sign-in failed");
            }
        }
        None => {
            sync.sign_out().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;
    use tienda_core::{Category, CurrencyCode, Price, Product, ProductId};

    use super::*;
    use crate::cart::CartPhase;
    use crate::cart::memory::{MemoryRemoteStore, RemoteOp};

    fn products() -> Vec<Product> {
        vec![Product {
            id: ProductId::new(1),
            name: "Mantenimiento de Computadoras".to_string(),
            description: String::new(),
            price: Price::new(Decimal::from(50), CurrencyCode::USD),
            image: String::new(),
            category: Category::Technology,
        }]
    }

    fn sessions(dir: &std::path::Path) -> (Arc<MemoryRemoteStore>, CartSessions) {
        let remote = Arc::new(MemoryRemoteStore::new(products()));
        let catalog = CatalogService::new(remote.clone(), Duration::from_secs(60));
        let config = CartConfig {
            dir: dir.to_path_buf(),
            ..CartConfig::default()
        };
        (remote.clone(), CartSessions::new(remote, catalog, &config))
    }

    #[tokio::test]
    async fn test_same_token_reuses_cart() {
        let dir = tempfile::tempdir().unwrap();
        let (_, carts) = sessions(dir.path());
        let token = Uuid::new_v4();

        let first = carts.open(token, None).await.unwrap();
        first.sync().add_item(ProductId::new(1)).await.unwrap();

        let second = carts.open(token, None).await.unwrap();
        assert_eq!(second.sync().snapshot().item_count(), 1);
        assert_eq!(second.latest().item_count(), 1);
    }

    #[tokio::test]
    async fn test_anonymous_cart_survives_eviction() {
        let dir = tempfile::tempdir().unwrap();
        let (_, carts) = sessions(dir.path());
        let token = Uuid::new_v4();

        let handle = carts.open(token, None).await.unwrap();
        handle.sync().add_item(ProductId::new(1)).await.unwrap();
        handle.sync().add_item(ProductId::new(1)).await.unwrap();
        carts.forget(token).await;

        let restored = carts.open(token, None).await.unwrap();
        assert_eq!(restored.sync().snapshot().item_count(), 2);
    }

    #[tokio::test]
    async fn test_switch_follows_session_user() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, carts) = sessions(dir.path());
        let token = Uuid::new_v4();
        let user = UserId::new(5);
        remote.seed_row(user, ProductId::new(1), 3);

        let handle = carts.open(token, None).await.unwrap();
        handle.sync().add_item(ProductId::new(1)).await.unwrap();

        let handle = carts.switch(token, Some(user)).await.unwrap();
        assert_eq!(handle.sync().phase(), CartPhase::Authenticated(user));
        assert_eq!(handle.latest().item_count(), 3);

        let handle = carts.switch(token, None).await.unwrap();
        assert_eq!(handle.sync().phase(), CartPhase::Anonymous);
        assert!(handle.latest().is_empty());
    }

    #[tokio::test]
    async fn test_new_cart_signs_in_session_user() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, carts) = sessions(dir.path());
        let user = UserId::new(5);
        remote.seed_row(user, ProductId::new(1), 2);

        let handle = carts.open(Uuid::new_v4(), Some(user)).await.unwrap();
        assert_eq!(handle.sync().owner(), CartOwner::User(user));
        assert_eq!(handle.latest().item_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_sign_in_is_not_retried_by_later_requests() {
        let dir = tempfile::tempdir().unwrap();
        let (remote, carts) = sessions(dir.path());
        let token = Uuid::new_v4();
        let user = UserId::new(5);
        let fetches = |remote: &MemoryRemoteStore| {
            remote
                .calls()
                .into_iter()
                .filter(|op| *op == RemoteOp::FetchRows)
                .count()
        };

        remote.fail(RemoteOp::FetchRows);
        let handle = carts.switch(token, Some(user)).await.unwrap();
        assert_eq!(handle.sync().phase(), CartPhase::Anonymous);

        handle.sync().add_item(ProductId::new(1)).await.unwrap();
        assert_eq!(handle.latest().item_count(), 1);

        let handle = carts.open(token, Some(user)).await.unwrap();
        assert_eq!(handle.sync().phase(), CartPhase::Anonymous);
        assert_eq!(handle.latest().item_count(), 1);
        assert_eq!(fetches(&remote), 1);

        // The next login tries again
        remote.recover(RemoteOp::FetchRows);
        let handle = carts.switch(token, Some(user)).await.unwrap();
        assert_eq!(handle.sync().phase(), CartPhase::Authenticated(user));
        assert_eq!(fetches(&remote), 2);
    }
}
