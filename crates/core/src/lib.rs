//! `chronicle-core`: foundation building blocks shared by every layer.
//!
//! This crate contains identifiers, version expectations and the domain error
//! model. It has no storage or transport concerns.

pub mod aggregate;
pub mod error;
pub mod id;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, TenantId, UserId};
