//! Collaborators the cart synchronizer talks to.
//!
//! The synchronizer only sees these traits. Implementations live in
//! [`crate::db::cart_rows`] (Postgres), [`super::local_file`] (JSON files) and
//! `memory` (in-process, for tests).

use async_trait::async_trait;
use thiserror::Error;
use tienda_core::{CartEntry, Price, Product, ProductId, UserId};

use super::state::CartState;

/// Errors raised by the remote store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The store could not be reached or the call failed in transit.
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the caller's identity.
    #[error("remote store rejected credentials")]
    Unauthorized,

    /// A constraint rejected the write (e.g. unknown product).
    #[error("remote constraint violated: {0}")]
    Constraint(String),

    /// The store returned data that cannot be mapped.
    #[error("remote data invalid: {0}")]
    Data(String),
}

/// Errors raised by the local durable store.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    #[error("local cart I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("local cart is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A persisted cart row with the product snapshot joined in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartRow {
    pub product_id: ProductId,
    pub quantity: u32,
    pub name: String,
    pub unit_price: Price,
    pub image: String,
}

impl CartRow {
    /// Line item for this row.
    #[must_use]
    pub fn into_entry(self) -> CartEntry {
        CartEntry {
            product_id: self.product_id,
            name: self.name,
            unit_price: self.unit_price,
            image: self.image,
            quantity: self.quantity,
        }
    }
}

/// Remote persistence for the catalog and authenticated carts.
///
/// Cart rows are keyed by `(user, product)`; there is at most one row per key.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every product in the catalog.
    async fn fetch_catalog(&self) -> Result<Vec<Product>, RemoteError>;

    /// Every cart row of `user`.
    async fn fetch_cart_rows(&self, user: UserId) -> Result<Vec<CartRow>, RemoteError>;

    /// The row for `(user, product)`, if any.
    async fn find_cart_row(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<CartRow>, RemoteError>;

    /// Insert the row or overwrite its quantity.
    async fn upsert_cart_row(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError>;

    /// Delete the row for `(user, product)`. Deleting a missing row succeeds.
    async fn delete_cart_row(&self, user: UserId, product: ProductId) -> Result<(), RemoteError>;

    /// Delete every row of `user`.
    async fn delete_all_cart_rows(&self, user: UserId) -> Result<(), RemoteError>;
}

/// Durable storage for the anonymous cart.
#[async_trait]
pub trait LocalCartStore: Send + Sync {
    /// The stored cart, or `None` if nothing has been stored yet.
    async fn read(&self) -> Result<Option<Vec<CartEntry>>, LocalStoreError>;

    /// Replace the stored cart.
    async fn write(&self, entries: &[CartEntry]) -> Result<(), LocalStoreError>;
}

/// Rendering hook invoked after every change to the cart.
///
/// Called while the synchronizer holds its state lock, so notifications arrive
/// in order. Implementations must be cheap and must not call back into the
/// synchronizer.
pub trait CartObserver: Send + Sync {
    fn on_cart_changed(&self, state: &CartState);
}

/// Publishes the latest cart to `watch` receivers.
impl CartObserver for tokio::sync::watch::Sender<CartState> {
    fn on_cart_changed(&self, state: &CartState) {
        self.send_replace(state.clone());
    }
}

/// Observer that ignores every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CartObserver for NoopObserver {
    fn on_cart_changed(&self, _state: &CartState) {}
}
