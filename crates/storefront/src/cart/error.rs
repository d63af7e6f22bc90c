//! Cart error types.

use thiserror::Error;
use tienda_core::ProductId;

use super::ports::RemoteError;

/// Errors returned by cart operations.
///
/// None of these are fatal: the synchronizer logs them and keeps serving the
/// cart it has.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product is not in the catalog. Nothing was changed.
    #[error("product {0} not found in catalog")]
    NotFound(ProductId),

    /// The remote store failed. In-memory state is left as it was, except for
    /// an optimistic update already applied by the operation.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// An ownership transition is in flight and the command was rejected.
    #[error("cart is switching owners, try again")]
    TransitionInProgress,
}
