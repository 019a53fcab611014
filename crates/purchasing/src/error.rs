//! Error types for purchase submission and for the store collaborators.

use thiserror::Error;

use checkout_products::ProductId;

/// Failure reported by a store backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A versioned write found the row changed since it was read.
    #[error("write conflict: {0}")]
    Conflict(String),

    /// Any other backend failure (connection, constraint, decoding).
    #[error("store failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }
}

/// Why a purchase submission was rejected.
///
/// Every variant leaves inventory and ledger exactly as they were.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    #[error("no line items were provided for the purchase")]
    EmptyOrder,

    #[error("quantity must be positive (product {product_id})")]
    InvalidQuantity { product_id: ProductId },

    #[error("product not found: {product_id}")]
    ProductNotFound { product_id: ProductId },

    #[error(
        "insufficient stock for product {product_name}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_name: String,
        requested: u64,
        available: u64,
    },

    #[error("persistence failure: {message}")]
    PersistenceFailure { message: String },

    #[error("stock changed while the purchase was being committed; resubmit")]
    ConcurrencyConflict,

    #[error("purchase amount exceeds the representable range")]
    AmountOverflow,
}

impl PurchaseError {
    /// Only a concurrency conflict can succeed on an unchanged resubmission.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PurchaseError::ConcurrencyConflict)
    }

    /// Stable short name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            PurchaseError::EmptyOrder => "empty_order",
            PurchaseError::InvalidQuantity { .. } => "invalid_quantity",
            PurchaseError::ProductNotFound { .. } => "product_not_found",
            PurchaseError::InsufficientStock { .. } => "insufficient_stock",
            PurchaseError::PersistenceFailure { .. } => "persistence_failure",
            PurchaseError::ConcurrencyConflict => "concurrency_conflict",
            PurchaseError::AmountOverflow => "amount_overflow",
        }
    }
}

impl From<StoreError> for PurchaseError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(_) => PurchaseError::ConcurrencyConflict,
            StoreError::Backend(message) => PurchaseError::PersistenceFailure { message },
        }
    }
}
