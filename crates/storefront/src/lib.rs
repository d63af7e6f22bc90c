//! Tienda Storefront library.
//!
//! This crate provides the storefront functionality as a library,
//! allowing it to be tested and reused.
//!
//! The heart of the crate is [`cart::CartSynchronizer`], which keeps a
//! shopper's cart consistent while they browse anonymously, sign in and sign
//! out. Everything else (routes, sessions, database adapters) wires that
//! state machine into an HTTP storefront.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod sessions;
pub mod state;
