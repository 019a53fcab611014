//! Collaborator boundary: inventory reads, ledger reads, and the write
//! transaction a purchase commits through.
//!
//! The processor never sees a concrete backend. Implementations live in
//! `checkout-infra` (in-memory for tests/dev, Postgres for production).
//!
//! ## Transaction contract
//!
//! Every write a submission makes goes through one `PurchaseTransaction`:
//!
//! - writes are invisible to other readers until `commit()` returns `Ok`
//! - dropping a transaction without committing discards all of its writes
//! - `update_product` is checked against `ExpectedVersion`; a stale version is
//!   reported as `StoreError::Conflict`, either immediately or at `commit()`
//! - reads through the transaction observe its own earlier writes

use std::sync::Arc;

use async_trait::async_trait;

use checkout_core::ExpectedVersion;
use checkout_products::{Product, ProductId};

use crate::error::StoreError;
use crate::purchase::{BuyerId, NewPurchase, Purchase, PurchaseId, PurchaseLineItem};

/// Read access to products and their stock.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError>;
}

/// Read access to committed purchases.
///
/// Lists are ordered by ascending purchase id.
#[async_trait]
pub trait PurchaseLedger: Send + Sync {
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError>;
    async fn find_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError>;
    async fn find_all(&self) -> Result<Vec<Purchase>, StoreError>;
}

/// One atomic unit of writes against inventory and ledger.
#[async_trait]
pub trait PurchaseTransaction: Send {
    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn update_product(
        &mut self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError>;

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> Result<PurchaseId, StoreError>;

    async fn insert_line_item(
        &mut self,
        purchase_id: PurchaseId,
        line: &PurchaseLineItem,
    ) -> Result<(), StoreError>;

    async fn commit(self) -> Result<(), StoreError>;
}

/// A store that can open write transactions.
#[async_trait]
pub trait TransactionalStore: InventoryStore {
    type Transaction: PurchaseTransaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).get(product_id).await
    }
}

#[async_trait]
impl<S> PurchaseLedger for Arc<S>
where
    S: PurchaseLedger + ?Sized,
{
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        (**self).find_by_id(id).await
    }

    async fn find_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError> {
        (**self).find_by_buyer(buyer_id).await
    }

    async fn find_all(&self) -> Result<Vec<Purchase>, StoreError> {
        (**self).find_all().await
    }
}

#[async_trait]
impl<S> TransactionalStore for Arc<S>
where
    S: TransactionalStore,
{
    type Transaction = S::Transaction;

    async fn begin(&self) -> Result<Self::Transaction, StoreError> {
        (**self).begin().await
    }
}
