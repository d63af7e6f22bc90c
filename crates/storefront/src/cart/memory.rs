//! In-process cart stores and a recording observer.
//!
//! Used by the unit and integration tests to drive the synchronizer without a
//! database. Only built for this crate's tests and with the `test-util`
//! feature. [`MemoryRemoteStore`] can fail or hold any call on demand, which
//! is how the tests reproduce slow and failing backends.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tienda_core::{CartEntry, Product, ProductId, UserId};
use tokio::sync::watch;

use super::ports::{
    CartObserver, CartRow, LocalCartStore, LocalStoreError, RemoteError, RemoteStore,
};
use super::state::CartState;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`RemoteStore`] operation, for failure injection and call recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    FetchCatalog,
    FetchRows,
    FindRow,
    Upsert,
    Delete,
    DeleteAll,
}

/// Remote store backed by a map of `(user, product) -> quantity`.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    catalog: Mutex<Vec<Product>>,
    rows: Mutex<BTreeMap<(UserId, ProductId), u32>>,
    failing: Mutex<HashSet<RemoteOp>>,
    gates: Mutex<HashMap<RemoteOp, watch::Sender<bool>>>,
    calls: Mutex<Vec<RemoteOp>>,
}

impl MemoryRemoteStore {
    #[must_use]
    pub fn new(catalog: Vec<Product>) -> Self {
        Self {
            catalog: Mutex::new(catalog),
            ..Self::default()
        }
    }

    /// Store a row directly, bypassing failure injection.
    pub fn seed_row(&self, user: UserId, product: ProductId, quantity: u32) {
        lock(&self.rows).insert((user, product), quantity);
    }

    /// Quantity stored for `(user, product)`.
    #[must_use]
    pub fn quantity(&self, user: UserId, product: ProductId) -> Option<u32> {
        lock(&self.rows).get(&(user, product)).copied()
    }

    /// Every `(product, quantity)` stored for `user`.
    #[must_use]
    pub fn rows(&self, user: UserId) -> Vec<(ProductId, u32)> {
        lock(&self.rows)
            .iter()
            .filter(|((owner, _), _)| *owner == user)
            .map(|((_, product), quantity)| (*product, *quantity))
            .collect()
    }

    /// Make every call of `op` fail until [`Self::recover`] is called.
    pub fn fail(&self, op: RemoteOp) {
        lock(&self.failing).insert(op);
    }

    pub fn recover(&self, op: RemoteOp) {
        lock(&self.failing).remove(&op);
    }

    /// Hold every call of `op` until [`Self::resume`] is called.
    pub fn pause(&self, op: RemoteOp) {
        lock(&self.gates).insert(op, watch::channel(false).0);
    }

    /// Release calls held by [`Self::pause`].
    pub fn resume(&self, op: RemoteOp) {
        if let Some(gate) = lock(&self.gates).remove(&op) {
            gate.send_replace(true);
        }
    }

    /// Operations called so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<RemoteOp> {
        lock(&self.calls).clone()
    }

    async fn checkpoint(&self, op: RemoteOp) -> Result<(), RemoteError> {
        lock(&self.calls).push(op);
        let gate = lock(&self.gates).get(&op).map(watch::Sender::subscribe);
        if let Some(mut gate) = gate {
            // A closed gate means it was resumed; either way the call proceeds.
            let _ = gate.wait_for(|open| *open).await;
        }
        if lock(&self.failing).contains(&op) {
            return Err(RemoteError::Unavailable(format!("{op:?} failed")));
        }
        Ok(())
    }

    /// Join a stored quantity with its product, like the SQL adapter does.
    fn row(&self, product: ProductId, quantity: u32) -> Option<CartRow> {
        let catalog = lock(&self.catalog);
        let item = catalog.iter().find(|p| p.id == product)?;
        Some(CartRow {
            product_id: product,
            quantity,
            name: item.name.clone(),
            unit_price: item.price,
            image: item.image.clone(),
        })
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn fetch_catalog(&self) -> Result<Vec<Product>, RemoteError> {
        self.checkpoint(RemoteOp::FetchCatalog).await?;
        Ok(lock(&self.catalog).clone())
    }

    async fn fetch_cart_rows(&self, user: UserId) -> Result<Vec<CartRow>, RemoteError> {
        self.checkpoint(RemoteOp::FetchRows).await?;
        Ok(self
            .rows(user)
            .into_iter()
            .filter_map(|(product, quantity)| self.row(product, quantity))
            .collect())
    }

    async fn find_cart_row(
        &self,
        user: UserId,
        product: ProductId,
    ) -> Result<Option<CartRow>, RemoteError> {
        self.checkpoint(RemoteOp::FindRow).await?;
        Ok(self
            .quantity(user, product)
            .and_then(|quantity| self.row(product, quantity)))
    }

    async fn upsert_cart_row(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<(), RemoteError> {
        self.checkpoint(RemoteOp::Upsert).await?;
        if !lock(&self.catalog).iter().any(|p| p.id == product) {
            return Err(RemoteError::Constraint(format!("unknown product {product}")));
        }
        self.seed_row(user, product, quantity);
        Ok(())
    }

    async fn delete_cart_row(&self, user: UserId, product: ProductId) -> Result<(), RemoteError> {
        self.checkpoint(RemoteOp::Delete).await?;
        lock(&self.rows).remove(&(user, product));
        Ok(())
    }

    async fn delete_all_cart_rows(&self, user: UserId) -> Result<(), RemoteError> {
        self.checkpoint(RemoteOp::DeleteAll).await?;
        lock(&self.rows).retain(|(owner, _), _| *owner != user);
        Ok(())
    }
}

/// Local store holding the anonymous cart in memory.
#[derive(Debug, Default)]
pub struct MemoryCartStore {
    stored: Mutex<Option<Vec<CartEntry>>>,
    fail_reads: Mutex<bool>,
    fail_writes: Mutex<bool>,
    writes: Mutex<usize>,
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored cart directly.
    pub fn set(&self, entries: Vec<CartEntry>) {
        *lock(&self.stored) = Some(entries);
    }

    /// The stored cart, or `None` if nothing was written.
    #[must_use]
    pub fn stored(&self) -> Option<Vec<CartEntry>> {
        lock(&self.stored).clone()
    }

    /// Number of successful writes.
    #[must_use]
    pub fn writes(&self) -> usize {
        *lock(&self.writes)
    }

    /// Make reads report a corrupt cart.
    pub fn fail_reads(&self, fail: bool) {
        *lock(&self.fail_reads) = fail;
    }

    pub fn fail_writes(&self, fail: bool) {
        *lock(&self.fail_writes) = fail;
    }
}

#[async_trait]
impl LocalCartStore for MemoryCartStore {
    async fn read(&self) -> Result<Option<Vec<CartEntry>>, LocalStoreError> {
        if *lock(&self.fail_reads) {
            let corrupt = serde_json::from_str::<Vec<CartEntry>>("{")?;
            return Ok(Some(corrupt));
        }
        Ok(self.stored())
    }

    async fn write(&self, entries: &[CartEntry]) -> Result<(), LocalStoreError> {
        if *lock(&self.fail_writes) {
            return Err(std::io::Error::other("disk full").into());
        }
        *lock(&self.stored) = Some(entries.to_vec());
        *lock(&self.writes) += 1;
        Ok(())
    }
}

/// Observer keeping every state it was shown.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    states: Mutex<Vec<CartState>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        lock(&self.states).len()
    }

    #[must_use]
    pub fn last(&self) -> Option<CartState> {
        lock(&self.states).last().cloned()
    }

    #[must_use]
    pub fn states(&self) -> Vec<CartState> {
        lock(&self.states).clone()
    }
}

impl CartObserver for RecordingObserver {
    fn on_cart_changed(&self, state: &CartState) {
        lock(&self.states).push(state.clone());
    }
}
