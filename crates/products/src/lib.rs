//! Products domain module.
//!
//! Catalog entries together with their stock level. Pure domain logic: no IO,
//! no storage.

pub mod product;

pub use product::{Product, ProductDetails, ProductId};
