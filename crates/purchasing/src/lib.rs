//! Purchasing domain module: buyer purchases against shared inventory.
//!
//! - `purchase`: the `Purchase` record and its line items.
//! - `store`: collaborator traits implemented by storage backends.
//! - `processor`: validate-then-commit submission of a purchase.
//! - `query`: read-only lookups over the purchase ledger.

pub mod error;
pub mod processor;
pub mod purchase;
pub mod query;
pub mod store;

pub use error::{PurchaseError, StoreError};
pub use processor::PurchaseProcessor;
pub use purchase::{
    BuyerId, LineItemRequest, NewPurchase, Purchase, PurchaseId, PurchaseLineItem, PurchaseStatus,
};
pub use query::{PurchaseLookup, PurchaseQueries};
pub use store::{InventoryStore, PurchaseLedger, PurchaseTransaction, TransactionalStore};
