//! Session layer for Aula.
//!
//! Three cooperating pieces keep the UI's view of "who is signed in, and in
//! which role" consistent with the identity and data providers:
//!
//! - [`SessionStore`]: the single mutable snapshot of the current identity.
//! - [`IdentitySynchronizer`]: turns identity-provider lifecycle events into
//!   snapshot updates, discarding results overtaken by a sign-out.
//! - [`AccessGate`]: per-view allow/deny/redirect decisions.

pub mod gate;
pub mod persist;
pub mod store;
pub mod sync;
pub mod timeout;

pub use gate::{AccessGate, FallbackView, GateDecision, GateStatus};
pub use persist::MemoryStorage;
pub use store::SessionStore;
pub use sync::{IdentitySynchronizer, SyncConfig};
pub use timeout::with_timeout;

#[cfg(test)]
mod testing;
