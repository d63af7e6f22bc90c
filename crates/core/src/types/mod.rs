//! Core types for Tienda.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod catalog;
pub mod email;
pub mod id;
pub mod price;

pub use cart::{CartEntry, OrderLine, OrderSummary};
pub use catalog::{Category, CategoryError, Product};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, CurrencyError, Price};
