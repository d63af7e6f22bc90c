//! Cart state: the ownership phase plus the line items.

use tienda_core::{CartEntry, CurrencyCode, OrderSummary, Price, Product, ProductId, UserId};

/// Which identity the cart tracks and whether it has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartPhase {
    /// No signed-in user; entries come from the local durable store.
    Anonymous,
    /// A fetch of this user's remote cart is in flight.
    Syncing(UserId),
    /// Entries come from, and mutations go to, this user's remote cart.
    Authenticated(UserId),
}

impl CartPhase {
    /// Short name used in logs and templates.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Syncing(_) => "syncing",
            Self::Authenticated(_) => "authenticated",
        }
    }

    /// Whether an ownership transition is in flight.
    #[must_use]
    pub const fn is_syncing(&self) -> bool {
        matches!(self, Self::Syncing(_))
    }
}

/// Owner of the cart contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CartOwner {
    Anonymous,
    User(UserId),
}

/// Authoritative in-memory cart.
///
/// Entries are unique per product and every entry has `quantity >= 1`. Both
/// rules are enforced here; the mutators are crate-private so only the
/// synchronizer can change a cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartState {
    phase: CartPhase,
    entries: Vec<CartEntry>,
}

impl Default for CartState {
    fn default() -> Self {
        Self::new()
    }
}

impl CartState {
    /// An empty anonymous cart.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: CartPhase::Anonymous,
            entries: Vec::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> CartPhase {
        self.phase
    }

    /// Owner derived from the phase. A cart that is syncing already belongs to
    /// the user being signed in.
    #[must_use]
    pub const fn owner(&self) -> CartOwner {
        match self.phase {
            CartPhase::Anonymous => CartOwner::Anonymous,
            CartPhase::Syncing(user) | CartPhase::Authenticated(user) => CartOwner::User(user),
        }
    }

    /// Line items in the order they were first added.
    #[must_use]
    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&CartEntry> {
        self.entries.iter().find(|e| e.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of units across all entries (the cart badge).
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.entries
            .iter()
            .fold(0_u32, |acc, e| acc.saturating_add(e.quantity))
    }

    /// Σ unit price × quantity, recomputed on every call.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        let currency = self
            .entries
            .first()
            .map_or(CurrencyCode::default(), |e| e.unit_price.currency_code);
        self.entries
            .iter()
            .fold(Price::zero(currency), |acc, e| acc.plus(&e.line_total()))
    }

    /// Order summary for checkout.
    #[must_use]
    pub fn summary(&self) -> OrderSummary {
        OrderSummary::from_entries(&self.entries)
    }

    pub(crate) fn set_phase(&mut self, phase: CartPhase) {
        self.phase = phase;
    }

    /// Add one unit of `product`, creating the entry if needed. Returns the new
    /// quantity.
    pub(crate) fn increment(&mut self, product: &Product) -> u32 {
        if let Some(entry) = self.entry_mut(product.id) {
            entry.quantity = entry.quantity.saturating_add(1);
            return entry.quantity;
        }
        self.entries.push(CartEntry::from_product(product, 1));
        1
    }

    /// Set the quantity of the product in `template`, inserting `template` if the
    /// cart has no entry for it. A quantity of zero removes the entry.
    pub(crate) fn put(&mut self, template: &CartEntry, quantity: u32) {
        if quantity == 0 {
            self.remove(template.product_id);
            return;
        }
        if let Some(entry) = self.entry_mut(template.product_id) {
            entry.quantity = quantity;
        } else {
            let mut entry = template.clone();
            entry.quantity = quantity;
            self.entries.push(entry);
        }
    }

    pub(crate) fn remove(&mut self, product_id: ProductId) -> Option<CartEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| e.product_id == product_id)?;
        Some(self.entries.remove(index))
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace every entry. Entries with quantity zero are dropped and a later
    /// entry for the same product overrides an earlier one.
    pub(crate) fn replace_entries(&mut self, entries: impl IntoIterator<Item = CartEntry>) {
        self.entries.clear();
        for entry in entries {
            let template = entry.clone();
            self.put(&template, entry.quantity);
        }
    }

    fn entry_mut(&mut self, product_id: ProductId) -> Option<&mut CartEntry> {
        self.entries.iter_mut().find(|e| e.product_id == product_id)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use tienda_core::Category;

    use super::*;

    fn product(id: i32, price: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Service {id}"),
            description: String::new(),
            price: Price::new(Decimal::from(price), CurrencyCode::USD),
            image: String::new(),
            category: Category::Home,
        }
    }

    #[test]
    fn test_increment_creates_then_bumps() {
        let mut state = CartState::new();
        assert_eq!(state.increment(&product(1, 10)), 1);
        assert_eq!(state.increment(&product(1, 10)), 2);
        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.subtotal().amount, Decimal::from(20));
    }

    #[test]
    fn test_put_zero_removes() {
        let mut state = CartState::new();
        state.increment(&product(1, 10));
        let template = state.entries()[0].clone();
        state.put(&template, 0);
        assert!(state.is_empty());
    }

    #[test]
    fn test_replace_entries_dedupes_and_drops_zero() {
        let mut state = CartState::new();
        let a = CartEntry::from_product(&product(1, 10), 2);
        let b = CartEntry::from_product(&product(2, 5), 0);
        let a_again = CartEntry::from_product(&product(1, 10), 5);
        state.replace_entries([a, b, a_again]);

        assert_eq!(state.entries().len(), 1);
        assert_eq!(state.get(ProductId::new(1)).map(|e| e.quantity), Some(5));
    }

    #[test]
    fn test_item_count_sums_quantities() {
        let mut state = CartState::new();
        state.increment(&product(1, 10));
        state.increment(&product(1, 10));
        state.increment(&product(2, 10));
        assert_eq!(state.item_count(), 3);
    }

    #[test]
    fn test_owner_follows_phase() {
        let mut state = CartState::new();
        assert_eq!(state.owner(), CartOwner::Anonymous);
        state.set_phase(CartPhase::Syncing(UserId::new(9)));
        assert_eq!(state.owner(), CartOwner::User(UserId::new(9)));
    }
}
