//! `checkout-core`: domain building blocks shared by the checkout crates.
//!
//! Pure domain primitives only: identifiers, errors, versioning and money.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use aggregate::{AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AggregateId, UserId};
pub use money::Money;
pub use value_object::ValueObject;
