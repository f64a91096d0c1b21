//! Append-only event store boundary.
//!
//! This module defines the storage backend contract the repository builds on,
//! plus an in-memory backend for tests/dev. Concrete database engines plug in
//! by implementing [`EventStore`].

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use r#trait::{EventStore, EventStoreError};
