//! Cart synchronization.
//!
//! A [`CartSynchronizer`] owns one shopper's cart. Anonymous carts live in a
//! [`LocalCartStore`]; once the shopper signs in the cart follows their rows in
//! the [`RemoteStore`] instead. See [`synchronizer`] for the state machine.

mod command;
mod error;
mod keyed;
pub mod local_file;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;
mod ports;
mod state;
pub mod synchronizer;

pub use command::{CartCommand, Outcome, SyncingPolicy};
pub use error::CartError;
pub use keyed::{KeyGuard, KeyedLocks};
pub use local_file::JsonFileCartStore;
pub use ports::{
    CartObserver, CartRow, LocalCartStore, LocalStoreError, NoopObserver, RemoteError,
    RemoteStore,
};
pub use state::{CartOwner, CartPhase, CartState};
pub use synchronizer::CartSynchronizer;
