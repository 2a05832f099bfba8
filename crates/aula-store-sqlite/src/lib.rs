//! SQLite backend for Aula.
//!
//! [`SqliteBackend`] plays all three collaborator roles the session layer
//! consumes: identity provider (password sign-in, sessions, lifecycle
//! events), directory store (profiles and role assignments, with writes
//! restricted to administrators) and snapshot storage.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod encode;
mod schema;
mod secret;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{BackendSettings, SqliteBackend};

#[cfg(test)]
mod tests;
