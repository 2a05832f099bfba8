//! Core types and trait definitions for Aula's identity layer.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it only knows about roles, principals,
//! identity lifecycle events, guard policies and the provider traits the
//! session layer consumes.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod error;
pub mod event;
pub mod policy;
pub mod principal;
pub mod provider;
pub mod role;
pub mod snapshot;

pub use error::{Error, Result};
