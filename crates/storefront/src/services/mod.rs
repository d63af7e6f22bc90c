//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `auth` - Email and password authentication

pub mod auth;
