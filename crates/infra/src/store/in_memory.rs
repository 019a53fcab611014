use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use checkout_core::{AggregateRoot, ExpectedVersion};
use checkout_products::{Product, ProductId};
use checkout_purchasing::{
    BuyerId, InventoryStore, NewPurchase, Purchase, PurchaseId, PurchaseLedger, PurchaseLineItem,
    PurchaseTransaction, StoreError, TransactionalStore,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    purchases: BTreeMap<PurchaseId, Purchase>,
}

#[derive(Debug, Default)]
struct Shared {
    state: RwLock<State>,
    last_purchase_id: AtomicU64,
}

/// In-memory inventory + ledger.
///
/// Intended for tests/dev. Cloning shares the same underlying data.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommerceStore {
    shared: Arc<Shared>,
}

impl InMemoryCommerceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a catalog product.
    ///
    /// A replacement is stored past the current version, so open transactions
    /// that staged writes against the old row conflict at commit.
    pub fn upsert_product(&self, product: Product) -> Result<(), StoreError> {
        let mut state = self.shared.write()?;
        let product = match state.products.get(&product.id_typed()) {
            Some(existing) => product.supersede(existing),
            None => product,
        };
        state.products.insert(product.id_typed(), product);
        Ok(())
    }
}

impl Shared {
    fn read(&self) -> Result<RwLockReadGuard<'_, State>, StoreError> {
        self.state
            .read()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>, StoreError> {
        self.state
            .write()
            .map_err(|_| StoreError::backend("lock poisoned"))
    }
}

#[async_trait]
impl InventoryStore for InMemoryCommerceStore {
    async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.products.get(&product_id).cloned())
    }
}

#[async_trait]
impl PurchaseLedger for InMemoryCommerceStore {
    async fn find_by_id(&self, id: PurchaseId) -> Result<Option<Purchase>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.purchases.get(&id).cloned())
    }

    async fn find_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError> {
        let state = self.shared.read()?;
        Ok(state
            .purchases
            .values()
            .filter(|p| p.buyer_id() == buyer_id)
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<Purchase>, StoreError> {
        let state = self.shared.read()?;
        Ok(state.purchases.values().cloned().collect())
    }
}

#[async_trait]
impl TransactionalStore for InMemoryCommerceStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            products: HashMap::new(),
            purchases: Vec::new(),
        })
    }
}

#[derive(Debug)]
struct StagedProduct {
    /// Committed version this transaction's writes are based on.
    base_version: u64,
    product: Product,
}

#[derive(Debug)]
struct StagedPurchase {
    id: PurchaseId,
    header: NewPurchase,
    lines: Vec<PurchaseLineItem>,
}

/// Buffered writes against an `InMemoryCommerceStore`.
///
/// Nothing is visible to other readers until `commit`, which re-checks every
/// staged product version under the write lock and applies all writes at once.
/// Dropping the transaction discards the buffer.
#[derive(Debug)]
pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    products: HashMap<ProductId, StagedProduct>,
    purchases: Vec<StagedPurchase>,
}

#[async_trait]
impl PurchaseTransaction for InMemoryTransaction {
    async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
        if let Some(staged) = self.products.get(&product_id) {
            return Ok(Some(staged.product.clone()));
        }
        let state = self.shared.read()?;
        Ok(state.products.get(&product_id).cloned())
    }

    async fn update_product(
        &mut self,
        product: &Product,
        expected: ExpectedVersion,
    ) -> Result<(), StoreError> {
        let product_id = product.id_typed();

        if let Some(staged) = self.products.get_mut(&product_id) {
            expected
                .check(staged.product.version())
                .map_err(|e| StoreError::conflict(format!("product {product_id}: {e}")))?;
            staged.product = product.clone();
            return Ok(());
        }

        let base_version = {
            let state = self.shared.read()?;
            let committed = state
                .products
                .get(&product_id)
                .ok_or_else(|| StoreError::backend(format!("unknown product {product_id}")))?;
            committed.version()
        };
        expected
            .check(base_version)
            .map_err(|e| StoreError::conflict(format!("product {product_id}: {e}")))?;

        self.products.insert(
            product_id,
            StagedProduct {
                base_version,
                product: product.clone(),
            },
        );
        Ok(())
    }

    async fn insert_purchase(&mut self, purchase: &NewPurchase) -> Result<PurchaseId, StoreError> {
        // Ids are never reused; a rolled-back transaction leaves a gap.
        let id = PurchaseId(self.shared.last_purchase_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.purchases.push(StagedPurchase {
            id,
            header: purchase.clone(),
            lines: Vec::new(),
        });
        Ok(id)
    }

    async fn insert_line_item(
        &mut self,
        purchase_id: PurchaseId,
        line: &PurchaseLineItem,
    ) -> Result<(), StoreError> {
        let staged = self
            .purchases
            .iter_mut()
            .find(|p| p.id == purchase_id)
            .ok_or_else(|| {
                StoreError::backend(format!("purchase {purchase_id} not inserted in this transaction"))
            })?;
        staged.lines.push(line.clone());
        Ok(())
    }

    async fn commit(self) -> Result<(), StoreError> {
        let mut purchases = Vec::with_capacity(self.purchases.len());
        for staged in self.purchases {
            let header = staged.header;
            let purchase = Purchase::restore(
                staged.id,
                header.buyer_id(),
                header.created_at(),
                header.status(),
                header.total(),
                staged.lines,
            )
            .map_err(|e| StoreError::backend(format!("purchase {}: {e}", staged.id)))?;
            purchases.push(purchase);
        }

        let mut state = self.shared.write()?;

        for (product_id, staged) in &self.products {
            let current = state
                .products
                .get(product_id)
                .map(Product::version)
                .ok_or_else(|| StoreError::conflict(format!("product {product_id} was removed")))?;
            if current != staged.base_version {
                return Err(StoreError::conflict(format!(
                    "product {product_id}: expected {}, found {current}",
                    staged.base_version
                )));
            }
        }

        for (product_id, staged) in self.products {
            state.products.insert(product_id, staged.product);
        }
        for purchase in purchases {
            state.purchases.insert(purchase.id_typed(), purchase);
        }
        Ok(())
    }
}
