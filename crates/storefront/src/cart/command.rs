//! Typed cart commands and their outcomes.

use std::str::FromStr;

use tienda_core::ProductId;

use super::state::CartState;

/// A user action delivered to the synchronizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartCommand {
    /// Add one unit of a catalog product.
    Add(ProductId),
    /// Change a line's quantity by a signed amount; reaching zero removes it.
    ChangeQuantity { product_id: ProductId, delta: i32 },
    /// Remove a line. Removing a missing line is a no-op.
    Remove(ProductId),
    /// Empty the whole cart after the order is confirmed.
    ConfirmPurchase,
}

impl CartCommand {
    /// The product this command mutates, if it targets a single line.
    #[must_use]
    pub const fn product_id(&self) -> Option<ProductId> {
        match self {
            Self::Add(id) | Self::Remove(id) | Self::ChangeQuantity { product_id: id, .. } => {
                Some(*id)
            }
            Self::ConfirmPurchase => None,
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Add(_) => "add",
            Self::ChangeQuantity { .. } => "change_quantity",
            Self::Remove(_) => "remove",
            Self::ConfirmPurchase => "confirm_purchase",
        }
    }
}

/// What became of a dispatched command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command ran; this is the cart afterwards.
    Applied(CartState),
    /// An ownership transition is in flight; the command will run once it
    /// settles.
    Queued,
    /// The cart changed owners while the remote call was in flight, so its
    /// result was dropped.
    Superseded,
}

impl Outcome {
    /// The resulting cart, if the command ran.
    #[must_use]
    pub const fn state(&self) -> Option<&CartState> {
        match self {
            Self::Applied(state) => Some(state),
            Self::Queued | Self::Superseded => None,
        }
    }

    #[must_use]
    pub fn into_state(self) -> Option<CartState> {
        match self {
            Self::Applied(state) => Some(state),
            Self::Queued | Self::Superseded => None,
        }
    }
}

/// What to do with commands that arrive while the cart is syncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncingPolicy {
    /// Hold the command and replay it once the transition settles.
    #[default]
    Queue,
    /// Refuse with [`super::CartError::TransitionInProgress`].
    Reject,
}

impl FromStr for SyncingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "queue" => Ok(Self::Queue),
            "reject" => Ok(Self::Reject),
            other => Err(format!("expected 'queue' or 'reject', got '{other}'")),
        }
    }
}
