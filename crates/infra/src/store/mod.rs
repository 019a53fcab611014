//! Inventory + ledger backends behind the purchasing collaborator traits.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryCommerceStore, InMemoryTransaction};
pub use postgres::{PostgresCommerceStore, PostgresTransaction};

use async_trait::async_trait;
use tracing::info;

use checkout_core::ExpectedVersion;
use checkout_products::{Product, ProductId};
use checkout_purchasing::{
    BuyerId, InventoryStore, NewPurchase, Purchase, PurchaseId, PurchaseLedger, PurchaseLineItem,
    PurchaseTransaction, StoreError, TransactionalStore,
};

use crate::config::{StoreBackend, StoreConfig};

/// Backend chosen at startup from `StoreConfig`.
#[derive(Debug, Clone)]
pub enum CommerceStore {
    InMemory(InMemoryCommerceStore),
    Postgres(PostgresCommerceStore),
}

impl CommerceStore {
    /// Open the configured backend. Postgres schemas are migrated on open.
    pub async fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        match &config.backend {
            StoreBackend::InMemory => {
                info!(backend = "in_memory", "opening store");
                Ok(CommerceStore::InMemory(InMemoryCommerceStore::new()))
            }
            StoreBackend::Postgres(pg) => {
                info!(backend = "postgres", max_connections = pg.max_connections, "opening store");
                let store = PostgresCommerceStore::connect(pg).await?;
                store.migrate().await?;
                Ok(CommerceStore::Postgres(store))
            }
        }
    }

    /// Insert or replace a catalog product (seeding / external catalog sync).
    pub async fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        match self {
            CommerceStore::InMemory(s) => s.upsert_product(product),
            CommerceStore::Postgres(s) => s.upsert_product(&product).await,
        }
    }
}

#[async_trait]
impl InventoryStore for CommerceStore {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        match self {
            CommerceStore::InMemory(s) => s.get(product_id).await,
            CommerceStore::Postgres(s) => s.get(product_id).await,
        }
    }
}

#[async_trait]
impl PurchaseLedger for CommerceStore {
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        match self {
            CommerceStore::InMemory(s) => s.find_by_id(id).await,
            CommerceStore::Postgres(s) => s.find_by_id(id).await,
        }
    }

    async fn find_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError> {
        match self {
            CommerceStore::InMemory(s) => s.find_by_buyer(buyer_id).await,
            CommerceStore::Postgres(s) => s.find_by_buyer(buyer_id).await,
        }
    }

    async fn find_all(&self) -> Result<Vec<Purchase>, StoreError> {
        match self {
            CommerceStore::InMemory(s) => s.find_all().await,
            CommerceStore::Postgres(s) => s.find_all().await,
        }
    }
}

#[derive(Debug)]
pub enum CommerceTransaction {
    InMemory(InMemoryTransaction),
    Postgres(PostgresTransaction),
}

#[async_trait]
impl TransactionalStore for CommerceStore {
    type Transaction = CommerceTransaction;

    async fn begin(&self) -> Result<CommerceTransaction, StoreError> {
        Ok(match self {
            CommerceStore::InMemory(s) => CommerceTransaction::InMemory(s.begin().await?),
            CommerceStore::Postgres(s) => CommerceTransaction::Postgres(s.begin().await?),
        })
    }
}

#[async_trait]
impl PurchaseTransaction for CommerceTransaction {
    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        match self {
            CommerceTransaction::InMemory(tx) => tx.product(product_id).await,
            CommerceTransaction::Postgres(tx) => tx.product(product_id).await,
        }
    }

    async fn update_product(
        &mut self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        match self {
            CommerceTransaction::InMemory(tx) => tx.update_product(product, expected).await,
            CommerceTransaction::Postgres(tx) => tx.update_product(product, expected).await,
        }
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> Result<PurchaseId, StoreError> {
        match self {
            CommerceTransaction::InMemory(tx) => tx.insert_purchase(purchase).await,
            CommerceTransaction::Postgres(tx) => tx.insert_purchase(purchase).await,
        }
    }

    async fn insert_line_item(
        &mut self,
        purchase_id: PurchaseId,
        line: &PurchaseLineItem,
    ) -> Result<(), StoreError> {
        match self {
            CommerceTransaction::InMemory(tx) => tx.insert_line_item(purchase_id, line).await,
            CommerceTransaction::Postgres(tx) => tx.insert_line_item(purchase_id, line).await,
        }
    }

    async fn commit(self) -> Result<(), StoreError> {
        match self {
            CommerceTransaction::InMemory(tx) => tx.commit().await,
            CommerceTransaction::Postgres(tx) => tx.commit().await,
        }
    }
}
