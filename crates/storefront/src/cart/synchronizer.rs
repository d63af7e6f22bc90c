//! Cart synchronizer.
//!
//! Owns one cart session and keeps it consistent with whichever store is
//! authoritative for the current owner:
//!
//! ```text
//!            sign_in(user)                fetch ok
//! Anonymous ──────────────▶ Syncing(user) ─────────▶ Authenticated(user)
//!     ▲                         │                          │
//!     │   fetch failed /        │                          │
//!     └──── sign_out ◀──────────┘◀──────── sign_out ───────┘
//! ```
//!
//! Anonymous carts are persisted to the local store on every mutation.
//! Authenticated mutations are applied optimistically, forwarded to the remote
//! store and then reconciled with the quantity actually written.
//!
//! Every ownership transition bumps an epoch. Remote calls remember the epoch
//! they were issued under and their results are dropped if it has moved, so a
//! late response can never land in another identity's cart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tienda_core::{CartEntry, OrderSummary, ProductId, UserId};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, instrument, warn};

use super::command::{CartCommand, Outcome, SyncingPolicy};
use super::error::CartError;
use super::keyed::KeyedLocks;
use super::ports::{CartObserver, CartRow, LocalCartStore, NoopObserver, RemoteError, RemoteStore};
use super::state::{CartOwner, CartPhase, CartState};
use crate::catalog::Catalog;

/// Per-session cart state machine.
pub struct CartSynchronizer {
    remote: Arc<dyn RemoteStore>,
    local: Arc<dyn LocalCartStore>,
    observer: Arc<dyn CartObserver>,
    policy: SyncingPolicy,
    inner: Mutex<Inner>,
    product_locks: KeyedLocks<ProductId>,
    local_writes: AsyncMutex<()>,
}

struct Inner {
    state: CartState,
    epoch: u64,
    catalog: Arc<Catalog>,
    pending: VecDeque<CartCommand>,
}

enum Target {
    Local,
    Remote { user: UserId, epoch: u64 },
}

impl CartSynchronizer {
    /// Create an empty anonymous cart. Call [`Self::restore`] to load the
    /// stored anonymous cart.
    #[must_use]
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalCartStore>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            remote,
            local,
            observer: Arc::new(NoopObserver),
            policy: SyncingPolicy::default(),
            inner: Mutex::new(Inner {
                state: CartState::new(),
                epoch: 0,
                catalog,
                pending: VecDeque::new(),
            }),
            product_locks: KeyedLocks::new(),
            local_writes: AsyncMutex::new(()),
        }
    }

    /// Notify `observer` after every change.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CartObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Set what happens to commands issued while syncing.
    #[must_use]
    pub const fn with_policy(mut self, policy: SyncingPolicy) -> Self {
        self.policy = policy;
        self
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A copy of the current cart.
    #[must_use]
    pub fn snapshot(&self) -> CartState {
        self.lock().state.clone()
    }

    #[must_use]
    pub fn phase(&self) -> CartPhase {
        self.lock().state.phase()
    }

    #[must_use]
    pub fn owner(&self) -> CartOwner {
        self.lock().state.owner()
    }

    /// Order summary for checkout. Pure read.
    #[must_use]
    pub fn checkout(&self) -> OrderSummary {
        self.lock().state.summary()
    }

    /// Whether a mutation of `product_id` is in flight. A UI should disable
    /// the product's controls while this is true.
    #[must_use]
    pub fn is_busy(&self, product_id: ProductId) -> bool {
        self.product_locks.is_locked(&product_id)
    }

    /// Number of commands waiting for a transition to settle.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Catalog used to resolve new entries.
    #[must_use]
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.lock().catalog)
    }

    /// Replace the catalog used to resolve new entries. Existing entries keep
    /// the attributes they were created with.
    pub fn set_catalog(&self, catalog: Arc<Catalog>) {
        self.lock().catalog = catalog;
    }

    // =========================================================================
    // Ownership transitions
    // =========================================================================

    /// Load the anonymous cart from the local store.
    ///
    /// An unreadable or corrupt stored cart is logged and replaced by an empty
    /// one. Does nothing once a user has signed in.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> CartState {
        let stored = match self.local.read().await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "failed to read local cart, starting empty");
                Vec::new()
            }
        };

        let mut inner = self.lock();
        if inner.state.phase() == CartPhase::Anonymous {
            inner.state.replace_entries(stored);
            debug!(entries = inner.state.entries().len(), "local cart restored");
            self.publish(&inner.state);
        }
        inner.state.clone()
    }

    /// Switch the cart to `user`, replacing its contents with the user's
    /// remote cart.
    ///
    /// The anonymous cart is abandoned, not merged. If the fetch fails the
    /// cart falls back to an empty anonymous cart and the error is returned.
    /// Commands queued while syncing are replayed afterwards.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn sign_in(&self, user: UserId) -> Result<Outcome, CartError> {
        let (epoch, was_anonymous) = {
            let mut inner = self.lock();
            inner.epoch += 1;
            let was_anonymous = inner.state.phase() == CartPhase::Anonymous;
            if !was_anonymous {
                inner.state.clear();
                inner.pending.clear();
            }
            inner.state.set_phase(CartPhase::Syncing(user));
            self.publish(&inner.state);
            (inner.epoch, was_anonymous)
        };
        info!(epoch, "cart syncing");

        if was_anonymous {
            self.discard_local().await;
        }

        let fetched = self.remote.fetch_cart_rows(user).await;

        let failure = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                debug!(epoch, "sign-in superseded by a later transition");
                return Ok(Outcome::Superseded);
            }
            match fetched {
                Ok(rows) => {
                    inner
                        .state
                        .replace_entries(rows.into_iter().map(CartRow::into_entry));
                    inner.state.set_phase(CartPhase::Authenticated(user));
                    info!(entries = inner.state.entries().len(), "cart synced");
                    self.publish(&inner.state);
                    None
                }
                Err(e) => {
                    inner.state.clear();
                    inner.state.set_phase(CartPhase::Anonymous);
                    self.publish(&inner.state);
                    Some(e)
                }
            }
        };

        if let Some(e) = failure {
            warn!(error = %e, "cart sync failed, continuing with an empty anonymous cart");
            self.persist_local().await;
            self.replay_pending().await;
            return Err(e.into());
        }

        self.replay_pending().await;
        Ok(Outcome::Applied(self.snapshot()))
    }

    /// Switch back to an empty anonymous cart.
    ///
    /// In-flight remote calls for the previous user are dropped when they
    /// return, and commands queued for them are discarded.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) -> CartState {
        let state = {
            let mut inner = self.lock();
            if inner.state.phase() == CartPhase::Anonymous {
                return inner.state.clone();
            }
            inner.epoch += 1;
            let dropped = inner.pending.len();
            if dropped > 0 {
                warn!(dropped, "discarding queued cart commands on sign-out");
            }
            inner.pending.clear();
            inner.state.clear();
            inner.state.set_phase(CartPhase::Anonymous);
            self.publish(&inner.state);
            inner.state.clone()
        };
        info!("cart signed out");

        self.persist_local().await;
        state
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Add one unit of a catalog product.
    ///
    /// # Errors
    ///
    /// [`CartError::NotFound`] if the product is not in the catalog,
    /// [`CartError::Remote`] if the remote write fails (the optimistic entry
    /// stays), [`CartError::TransitionInProgress`] when syncing under
    /// [`SyncingPolicy::Reject`].
    pub async fn add_item(&self, product_id: ProductId) -> Result<Outcome, CartError> {
        self.dispatch(CartCommand::Add(product_id)).await
    }

    /// Change a line's quantity by `delta`; a result of zero or less removes
    /// the line. Changing a product that is not in the cart does nothing.
    ///
    /// # Errors
    ///
    /// As for [`Self::add_item`], except that the catalog is not consulted.
    pub async fn change_quantity(
        &self,
        product_id: ProductId,
        delta: i32,
    ) -> Result<Outcome, CartError> {
        self.dispatch(CartCommand::ChangeQuantity { product_id, delta })
            .await
    }

    /// Remove a line. Removing a missing line is a no-op.
    ///
    /// # Errors
    ///
    /// [`CartError::Remote`] if the remote delete fails; the line is kept.
    pub async fn remove_item(&self, product_id: ProductId) -> Result<Outcome, CartError> {
        self.dispatch(CartCommand::Remove(product_id)).await
    }

    /// Empty the cart after the order summary has been confirmed.
    ///
    /// # Errors
    ///
    /// [`CartError::Remote`] if the remote bulk delete fails; the cart is kept.
    pub async fn confirm_purchase(&self) -> Result<Outcome, CartError> {
        self.dispatch(CartCommand::ConfirmPurchase).await
    }

    /// Run a command against the current owner's store.
    ///
    /// Commands touching the same product are serialized.
    ///
    /// # Errors
    ///
    /// See the named wrappers above.
    #[instrument(skip(self), fields(command = command.name()))]
    pub async fn dispatch(&self, command: CartCommand) -> Result<Outcome, CartError> {
        let _product_guard = match command.product_id() {
            Some(id) => Some(self.product_locks.acquire(&id).await),
            None => None,
        };

        let target = {
            let mut inner = self.lock();
            if let CartCommand::Add(id) = command
                && inner.catalog.find(id).is_none()
            {
                return Err(CartError::NotFound(id));
            }
            match inner.state.phase() {
                CartPhase::Syncing(_) => return self.defer(&mut inner, command),
                CartPhase::Anonymous => Target::Local,
                CartPhase::Authenticated(user) => Target::Remote {
                    user,
                    epoch: inner.epoch,
                },
            }
        };

        match target {
            Target::Local => self.apply_local(command).await,
            Target::Remote { user, epoch } => match command {
                CartCommand::Add(id) => self.remote_add(user, epoch, id).await,
                CartCommand::ChangeQuantity { product_id, delta } => {
                    self.remote_change(user, epoch, product_id, delta).await
                }
                CartCommand::Remove(id) => self.remote_remove(user, epoch, id).await,
                CartCommand::ConfirmPurchase => self.remote_clear(user, epoch).await,
            },
        }
    }

    fn defer(&self, inner: &mut Inner, command: CartCommand) -> Result<Outcome, CartError> {
        match self.policy {
            SyncingPolicy::Queue => {
                inner.pending.push_back(command);
                debug!(queued = inner.pending.len(), "command deferred until sync settles");
                Ok(Outcome::Queued)
            }
            SyncingPolicy::Reject => Err(CartError::TransitionInProgress),
        }
    }

    async fn replay_pending(&self) {
        let pending: Vec<CartCommand> = {
            let mut inner = self.lock();
            if inner.state.phase().is_syncing() {
                return;
            }
            inner.pending.drain(..).collect()
        };
        for command in pending {
            if let Err(e) = self.dispatch(command).await {
                warn!(command = command.name(), error = %e, "queued cart command failed");
            }
        }
    }

    // =========================================================================
    // Anonymous carts
    // =========================================================================

    async fn apply_local(&self, command: CartCommand) -> Result<Outcome, CartError> {
        let changed = {
            let mut inner = self.lock();
            let Inner { state, catalog, .. } = &mut *inner;
            let changed = match command {
                CartCommand::Add(id) => {
                    let product = catalog.find(id).ok_or(CartError::NotFound(id))?;
                    state.increment(product);
                    true
                }
                CartCommand::ChangeQuantity { product_id, delta } => {
                    match state.get(product_id).cloned() {
                        Some(entry) => {
                            state.put(&entry, apply_delta(entry.quantity, delta));
                            true
                        }
                        None => false,
                    }
                }
                CartCommand::Remove(id) => state.remove(id).is_some(),
                CartCommand::ConfirmPurchase => {
                    state.clear();
                    true
                }
            };
            if changed {
                self.publish(state);
            }
            changed
        };

        if changed {
            self.persist_local().await;
        }
        Ok(Outcome::Applied(self.snapshot()))
    }

    /// Write the anonymous cart as it is now. Writes are serialized and always
    /// read the latest entries, so an older cart never overwrites a newer one.
    async fn persist_local(&self) {
        let _write = self.local_writes.lock().await;
        let entries: Vec<CartEntry> = {
            let inner = self.lock();
            if inner.state.phase() != CartPhase::Anonymous {
                return;
            }
            inner.state.entries().to_vec()
        };
        if let Err(e) = self.local.write(&entries).await {
            warn!(error = %e, "failed to persist local cart");
        }
    }

    /// Empty the local store when the anonymous cart is abandoned.
    async fn discard_local(&self) {
        let _write = self.local_writes.lock().await;
        if let Err(e) = self.local.write(&[]).await {
            warn!(error = %e, "failed to discard local cart");
        }
    }

    // =========================================================================
    // Authenticated carts
    // =========================================================================

    async fn remote_add(
        &self,
        user: UserId,
        epoch: u64,
        product_id: ProductId,
    ) -> Result<Outcome, CartError> {
        let template = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return Ok(Outcome::Superseded);
            }
            let Inner { state, catalog, .. } = &mut *inner;
            let product = catalog
                .find(product_id)
                .ok_or(CartError::NotFound(product_id))?;
            state.increment(product);
            self.publish(state);
            CartEntry::from_product(product, 1)
        };

        let written: Result<u32, RemoteError> = async {
            let existing = self.remote.find_cart_row(user, product_id).await?;
            let quantity = existing.map_or(1, |row| row.quantity.saturating_add(1));
            self.remote
                .upsert_cart_row(user, product_id, quantity)
                .await?;
            Ok(quantity)
        }
        .await;

        match written {
            Ok(quantity) => Ok(self.reconcile(epoch, &template, quantity)),
            Err(e) => {
                warn!(%user, %product_id, error = %e, "remote add failed, optimistic entry kept");
                Err(e.into())
            }
        }
    }

    async fn remote_change(
        &self,
        user: UserId,
        epoch: u64,
        product_id: ProductId,
        delta: i32,
    ) -> Result<Outcome, CartError> {
        let current = self.lock().state.get(product_id).cloned();
        let Some(entry) = current else {
            return Ok(Outcome::Applied(self.snapshot()));
        };

        let quantity = apply_delta(entry.quantity, delta);
        if quantity == 0 {
            return self.remote_remove(user, epoch, product_id).await;
        }

        {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return Ok(Outcome::Superseded);
            }
            inner.state.put(&entry, quantity);
            self.publish(&inner.state);
        }

        match self
            .remote
            .upsert_cart_row(user, product_id, quantity)
            .await
        {
            Ok(()) => Ok(self.reconcile(epoch, &entry, quantity)),
            Err(e) => {
                warn!(%user, %product_id, quantity, error = %e, "remote quantity update failed, optimistic quantity kept");
                Err(e.into())
            }
        }
    }

    async fn remote_remove(
        &self,
        user: UserId,
        epoch: u64,
        product_id: ProductId,
    ) -> Result<Outcome, CartError> {
        let present = self.lock().state.get(product_id).is_some();
        if !present {
            return Ok(Outcome::Applied(self.snapshot()));
        }

        if let Err(e) = self.remote.delete_cart_row(user, product_id).await {
            warn!(%user, %product_id, error = %e, "remote delete failed, entry kept");
            return Err(e.into());
        }

        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(epoch, "dropping remove response for a previous owner");
            return Ok(Outcome::Superseded);
        }
        inner.state.remove(product_id);
        self.publish(&inner.state);
        Ok(Outcome::Applied(inner.state.clone()))
    }

    async fn remote_clear(&self, user: UserId, epoch: u64) -> Result<Outcome, CartError> {
        if let Err(e) = self.remote.delete_all_cart_rows(user).await {
            warn!(%user, error = %e, "remote cart clear failed, cart kept");
            return Err(e.into());
        }

        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(epoch, "dropping clear response for a previous owner");
            return Ok(Outcome::Superseded);
        }
        inner.state.clear();
        info!(%user, "cart cleared after purchase");
        self.publish(&inner.state);
        Ok(Outcome::Applied(inner.state.clone()))
    }

    /// Apply the quantity the remote store confirmed, unless the owner changed
    /// while the call was in flight.
    fn reconcile(&self, epoch: u64, template: &CartEntry, quantity: u32) -> Outcome {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(epoch, product_id = %template.product_id, "dropping response for a previous owner");
            return Outcome::Superseded;
        }
        inner.state.put(template, quantity);
        self.publish(&inner.state);
        Outcome::Applied(inner.state.clone())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called with the state lock held so observers see changes in order.
    fn publish(&self, state: &CartState) {
        self.observer.on_cart_changed(state);
    }
}

/// `quantity + delta`, floored at zero.
fn apply_delta(quantity: u32, delta: i32) -> u32 {
    let next = i64::from(quantity) + i64::from(delta);
    u32::try_from(next.max(0)).unwrap_or(u32::MAX)
}
