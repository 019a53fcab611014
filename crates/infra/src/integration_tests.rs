//! End-to-end tests for purchase submission and lookup.
//!
//! Tests: PurchaseProcessor → store transaction → ledger → PurchaseQueries
//!
//! Verifies:
//! - Accepted purchases decrement stock and are recorded with their lines
//! - Rejected purchases leave inventory and ledger untouched
//! - Failures inside the commit roll back every write of the submission
//! - Concurrent submissions never oversell

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use proptest::prelude::*;

    use checkout_core::{AggregateId, AggregateRoot, ExpectedVersion, Money};
    use checkout_products::{Product, ProductId};
    use checkout_purchasing::{
        BuyerId, InventoryStore, LineItemRequest, NewPurchase, PurchaseError, PurchaseId,
        PurchaseLedger, PurchaseLineItem, PurchaseLookup, PurchaseProcessor, PurchaseQueries,
        PurchaseStatus, PurchaseTransaction, StoreError, TransactionalStore,
    };

    use crate::config::StoreConfig;
    use crate::store::{CommerceStore, InMemoryCommerceStore, InMemoryTransaction};

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn seed(store: &InMemoryCommerceStore, name: &str, price_minor: u64, stock: u32) -> ProductId {
        let id = test_product_id();
        let product = Product::new(id, name, "general", Money::from_minor(price_minor), stock)
            .unwrap();
        store.upsert_product(product).unwrap();
        id
    }

    async fn stock_of<S: InventoryStore>(store: &S, id: ProductId) -> u32 {
        store.get(id).await.unwrap().unwrap().stock()
    }

    fn setup() -> (
        InMemoryCommerceStore,
        PurchaseProcessor<InMemoryCommerceStore>,
        PurchaseQueries<InMemoryCommerceStore>,
    ) {
        checkout_observability::init();
        let store = InMemoryCommerceStore::new();
        let processor = PurchaseProcessor::new(store.clone());
        let queries = PurchaseQueries::new(store.clone());
        (store, processor, queries)
    }

    #[tokio::test]
    async fn accepted_purchase_decrements_stock_and_is_recorded() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 10);
        let buyer = BuyerId::new();

        let purchase = processor
            .submit(buyer, &[LineItemRequest::new(product, 2)])
            .await
            .unwrap();

        assert_eq!(purchase.total(), Money::from_minor(20_000));
        assert_eq!(purchase.total().to_string(), "200.00");
        assert_eq!(purchase.status(), PurchaseStatus::Pending);
        assert_eq!(purchase.buyer_id(), buyer);
        assert_eq!(purchase.items().len(), 1);
        let line = &purchase.items()[0];
        assert_eq!(line.product_id(), product);
        assert_eq!(line.product_name(), "Producto Test");
        assert_eq!(line.quantity(), 2);
        assert_eq!(line.unit_price(), Money::from_minor(10_000));
        assert_eq!(line.subtotal(), Money::from_minor(20_000));

        assert_eq!(stock_of(&store, product).await, 8);

        let found = queries.get_by_id(purchase.id_typed()).await.unwrap();
        assert_eq!(found, PurchaseLookup::Found(purchase.clone()));
        assert_eq!(queries.list_by_buyer(buyer).await.unwrap(), vec![purchase]);
    }

    #[tokio::test]
    async fn insufficient_stock_is_rejected_and_stock_unchanged() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 1);

        let err = processor
            .submit(BuyerId::new(), &[LineItemRequest::new(product, 5)])
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PurchaseError::InsufficientStock {
                product_name: "Producto Test".to_string(),
                requested: 5,
                available: 1,
            }
        );
        assert!(!err.is_retryable());
        assert_eq!(stock_of(&store, product).await, 1);
        assert!(queries.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_order_is_rejected() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 10);

        let err = processor.submit(BuyerId::new(), &[]).await.unwrap_err();

        assert_eq!(err, PurchaseError::EmptyOrder);
        assert_eq!(stock_of(&store, product).await, 10);
        assert!(queries.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_line_short_on_stock_leaves_both_products_untouched() {
        let (store, processor, queries) = setup();
        let first = seed(&store, "Teclado", 2_500, 10);
        let second = seed(&store, "Monitor", 90_000, 1);

        let err = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(first, 3), LineItemRequest::new(second, 2)],
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PurchaseError::InsufficientStock {
                product_name: "Monitor".to_string(),
                requested: 2,
                available: 1,
            }
        );
        assert_eq!(stock_of(&store, first).await, 10);
        assert_eq!(stock_of(&store, second).await, 1);
        assert!(queries.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_purchase_id_is_not_found_not_an_error() {
        let (_store, _processor, queries) = setup();

        let lookup = queries.get_by_id(PurchaseId(999)).await.unwrap();

        assert_eq!(lookup, PurchaseLookup::NotFound(PurchaseId(999)));
        assert!(!lookup.is_found());
        assert!(lookup.into_option().is_none());
    }

    #[tokio::test]
    async fn unknown_product_is_rejected_before_any_write() {
        let (store, processor, queries) = setup();
        let known = seed(&store, "Producto Test", 10_000, 10);
        let missing = test_product_id();

        let err = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(known, 1), LineItemRequest::new(missing, 1)],
            )
            .await
            .unwrap_err();

        assert_eq!(err, PurchaseError::ProductNotFound { product_id: missing });
        assert_eq!(stock_of(&store, known).await, 10);
        assert!(queries.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn multi_product_purchase_touches_only_ordered_products() {
        let (store, processor, _queries) = setup();
        let keyboard = seed(&store, "Teclado", 2_550, 10);
        let mouse = seed(&store, "Raton", 1_000, 4);
        let bystander = seed(&store, "Silla", 45_000, 7);

        let purchase = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(keyboard, 2), LineItemRequest::new(mouse, 4)],
            )
            .await
            .unwrap();

        // 2 * 25.50 + 4 * 10.00
        assert_eq!(purchase.total(), Money::from_minor(9_100));
        let names: Vec<&str> = purchase.items().iter().map(|l| l.product_name()).collect();
        assert_eq!(names, vec!["Teclado", "Raton"]);

        assert_eq!(stock_of(&store, keyboard).await, 8);
        assert_eq!(stock_of(&store, mouse).await, 0);
        assert_eq!(stock_of(&store, bystander).await, 7);
        assert_eq!(store.get(bystander).await.unwrap().unwrap().version(), 0);
    }

    #[tokio::test]
    async fn resubmission_records_a_second_purchase() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 10);
        let buyer = BuyerId::new();
        let items = [LineItemRequest::new(product, 2)];

        let first = processor.submit(buyer, &items).await.unwrap();
        let second = processor.submit(buyer, &items).await.unwrap();

        assert_ne!(first.id_typed(), second.id_typed());
        assert!(first.id_typed() < second.id_typed());
        assert_eq!(stock_of(&store, product).await, 6);
        let ids: Vec<PurchaseId> = queries
            .list_by_buyer(buyer)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id_typed())
            .collect();
        assert_eq!(ids, vec![first.id_typed(), second.id_typed()]);
    }

    #[tokio::test]
    async fn repeated_product_lines_are_checked_against_combined_quantity() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 5);

        let err = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(product, 3), LineItemRequest::new(product, 3)],
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            PurchaseError::InsufficientStock {
                product_name: "Producto Test".to_string(),
                requested: 6,
                available: 5,
            }
        );
        assert!(queries.list_all().await.unwrap().is_empty());

        let purchase = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(product, 2), LineItemRequest::new(product, 3)],
            )
            .await
            .unwrap();
        assert_eq!(purchase.items().len(), 2);
        assert_eq!(purchase.total(), Money::from_minor(50_000));
        assert_eq!(stock_of(&store, product).await, 0);
    }

    #[tokio::test]
    async fn list_queries_separate_buyers() {
        let (store, processor, queries) = setup();
        let product = seed(&store, "Producto Test", 10_000, 10);
        let alice = BuyerId::new();
        let bob = BuyerId::new();

        processor.submit(alice, &[LineItemRequest::new(product, 1)]).await.unwrap();
        processor.submit(bob, &[LineItemRequest::new(product, 1)]).await.unwrap();
        processor.submit(alice, &[LineItemRequest::new(product, 1)]).await.unwrap();

        assert_eq!(queries.list_by_buyer(alice).await.unwrap().len(), 2);
        assert_eq!(queries.list_by_buyer(bob).await.unwrap().len(), 1);
        assert!(queries.list_by_buyer(BuyerId::new()).await.unwrap().is_empty());
        assert_eq!(queries.list_all().await.unwrap().len(), 3);
    }

    /// Delegates to the in-memory store but fails every line item insert.
    #[derive(Clone)]
    struct FailingLinesStore {
        inner: InMemoryCommerceStore,
    }

    struct FailingLinesTransaction {
        inner: InMemoryTransaction,
    }

    #[async_trait]
    impl InventoryStore for FailingLinesStore {
        async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.get(product_id).await
        }
    }

    #[async_trait]
    impl TransactionalStore for FailingLinesStore {
        type Transaction = FailingLinesTransaction;

        async fn begin(&self) -> Result<FailingLinesTransaction, StoreError> {
            Ok(FailingLinesTransaction {
                inner: self.inner.begin().await?,
            })
        }
    }

    #[async_trait]
    impl PurchaseTransaction for FailingLinesTransaction {
        async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.product(product_id).await
        }

        async fn update_product(
            &mut self,
            product: &Product,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.update_product(product, expected).await
        }

        async fn insert_purchase(
            &mut self,
            purchase: &NewPurchase,
        ) -> Result<PurchaseId, StoreError> {
            self.inner.insert_purchase(purchase).await
        }

        async fn insert_line_item(
            &mut self,
            _purchase_id: PurchaseId,
            _line: &PurchaseLineItem,
        ) -> Result<(), StoreError> {
            Err(StoreError::backend("disk full"))
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn failure_mid_commit_rolls_back_stock_and_ledger() {
        checkout_observability::init();
        let inner = InMemoryCommerceStore::new();
        let first = seed(&inner, "Teclado", 2_500, 10);
        let second = seed(&inner, "Monitor", 90_000, 3);
        let processor = PurchaseProcessor::new(FailingLinesStore {
            inner: inner.clone(),
        });

        let err = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(first, 1), LineItemRequest::new(second, 1)],
            )
            .await
            .unwrap_err();

        assert_eq!(
            err,
            PurchaseError::PersistenceFailure {
                message: "disk full".to_string()
            }
        );
        assert_eq!(stock_of(&inner, first).await, 10);
        assert_eq!(stock_of(&inner, second).await, 3);
        assert!(inner.find_all().await.unwrap().is_empty());
    }

    /// Lets a competing buyer take one unit between validation and commit.
    struct RacingStore {
        inner: InMemoryCommerceStore,
        contested: ProductId,
    }

    #[async_trait]
    impl InventoryStore for RacingStore {
        async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.get(product_id).await
        }
    }

    #[async_trait]
    impl TransactionalStore for RacingStore {
        type Transaction = InMemoryTransaction;

        async fn begin(&self) -> Result<InMemoryTransaction, StoreError> {
            if let Some(mut product) = self.inner.get(self.contested).await? {
                product
                    .decrement_stock(1)
                    .map_err(|e| StoreError::backend(e.to_string()))?;
                self.inner.upsert_product(product)?;
            }
            self.inner.begin().await
        }
    }

    #[tokio::test]
    async fn stock_moving_between_validation_and_commit_is_a_conflict() {
        checkout_observability::init();
        let inner = InMemoryCommerceStore::new();
        let calm = seed(&inner, "Teclado", 2_500, 10);
        let contested = seed(&inner, "Producto Test", 10_000, 5);
        let processor = PurchaseProcessor::new(RacingStore {
            inner: inner.clone(),
            contested,
        });

        let err = processor
            .submit(
                BuyerId::new(),
                &[LineItemRequest::new(calm, 2), LineItemRequest::new(contested, 2)],
            )
            .await
            .unwrap_err();

        assert_eq!(err, PurchaseError::ConcurrencyConflict);
        assert!(err.is_retryable());
        assert_eq!(stock_of(&inner, calm).await, 10);
        // Only the competitor's unit is gone.
        assert_eq!(stock_of(&inner, contested).await, 4);
        assert!(inner.find_all().await.unwrap().is_empty());
    }

    /// Restocks one product from the catalog right before the purchase commits.
    struct RestockBeforeCommitStore {
        inner: InMemoryCommerceStore,
        restocked: ProductId,
    }

    struct RestockBeforeCommitTransaction {
        inner: InMemoryTransaction,
        catalog: InMemoryCommerceStore,
        restocked: ProductId,
    }

    #[async_trait]
    impl InventoryStore for RestockBeforeCommitStore {
        async fn get(&self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.get(product_id).await
        }
    }

    #[async_trait]
    impl TransactionalStore for RestockBeforeCommitStore {
        type Transaction = RestockBeforeCommitTransaction;

        async fn begin(&self) -> Result<RestockBeforeCommitTransaction, StoreError> {
            Ok(RestockBeforeCommitTransaction {
                inner: self.inner.begin().await?,
                catalog: self.inner.clone(),
                restocked: self.restocked,
            })
        }
    }

    #[async_trait]
    impl PurchaseTransaction for RestockBeforeCommitTransaction {
        async fn product(&mut self, product_id: ProductId) -> Result<Option<Product>, StoreError> {
            self.inner.product(product_id).await
        }

        async fn update_product(
            &mut self,
            product: &Product,
            expected: ExpectedVersion,
        ) -> Result<(), StoreError> {
            self.inner.update_product(product, expected).await
        }

        async fn insert_purchase(
            &mut self,
            purchase: &NewPurchase,
        ) -> Result<PurchaseId, StoreError> {
            self.inner.insert_purchase(purchase).await
        }

        async fn insert_line_item(
            &mut self,
            purchase_id: PurchaseId,
            line: &PurchaseLineItem,
        ) -> Result<(), StoreError> {
            self.inner.insert_line_item(purchase_id, line).await
        }

        async fn commit(self) -> Result<(), StoreError> {
            let restock = Product::new(
                self.restocked,
                "Producto Test",
                "general",
                Money::from_minor(10_000),
                100,
            )
            .map_err(|e| StoreError::backend(e.to_string()))?;
            self.catalog.upsert_product(restock)?;
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn catalog_restock_during_commit_is_a_conflict_and_is_kept() {
        checkout_observability::init();
        let inner = InMemoryCommerceStore::new();
        let product = seed(&inner, "Producto Test", 10_000, 10);
        let processor = PurchaseProcessor::new(RestockBeforeCommitStore {
            inner: inner.clone(),
            restocked: product,
        });

        let err = processor
            .submit(BuyerId::new(), &[LineItemRequest::new(product, 2)])
            .await
            .unwrap_err();

        assert_eq!(err, PurchaseError::ConcurrencyConflict);
        assert_eq!(stock_of(&inner, product).await, 100);
        assert!(inner.find_all().await.unwrap().is_empty());

        // The restocked row is a fresh baseline for the next submission.
        let purchase = PurchaseProcessor::new(inner.clone())
            .submit(BuyerId::new(), &[LineItemRequest::new(product, 2)])
            .await
            .unwrap();
        assert_eq!(purchase.items()[0].quantity(), 2);
        assert_eq!(stock_of(&inner, product).await, 98);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_buyers_never_oversell() {
        checkout_observability::init();
        let store = InMemoryCommerceStore::new();
        let product = seed(&store, "Producto Test", 10_000, 10);
        let processor = Arc::new(PurchaseProcessor::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..25 {
            let processor = processor.clone();
            handles.push(tokio::spawn(async move {
                let items = [LineItemRequest::new(product, 1)];
                loop {
                    match processor.submit(BuyerId::new(), &items).await {
                        Err(err) if err.is_retryable() => continue,
                        other => return other,
                    }
                }
            }));
        }

        let mut accepted = 0;
        let mut sold_out = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(PurchaseError::InsufficientStock { .. }) => sold_out += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        assert_eq!(accepted, 10);
        assert_eq!(sold_out, 15);
        assert_eq!(stock_of(&store, product).await, 0);
        assert_eq!(store.find_all().await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn configured_store_without_database_url_is_in_memory() {
        checkout_observability::init();
        let config = StoreConfig::from_lookup(|_| None).unwrap();
        let store = CommerceStore::open(&config).await.unwrap();
        assert!(matches!(store, CommerceStore::InMemory(_)));

        let product_id = test_product_id();
        let product =
            Product::new(product_id, "Producto Test", "general", Money::from_minor(10_000), 3)
                .unwrap();
        store.upsert_product(product).await.unwrap();

        let processor = PurchaseProcessor::new(store.clone());
        let purchase = processor
            .submit(BuyerId::new(), &[LineItemRequest::new(product_id, 3)])
            .await
            .unwrap();

        let queries = PurchaseQueries::new(store.clone());
        assert!(queries.get_by_id(purchase.id_typed()).await.unwrap().is_found());
        assert_eq!(stock_of(&store, product_id).await, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 64,
            ..ProptestConfig::default()
        })]

        #[test]
        fn sequential_orders_conserve_stock(
            initial in 0u32..50,
            orders in prop::collection::vec(1u32..8, 1..20),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let store = InMemoryCommerceStore::new();
                let product = seed(&store, "Producto Test", 1_000, initial);
                let processor = PurchaseProcessor::new(store.clone());

                let mut sold = 0u32;
                for qty in orders {
                    match processor.submit(BuyerId::new(), &[LineItemRequest::new(product, qty)]).await {
                        Ok(purchase) => {
                            sold += qty;
                            assert_eq!(purchase.total(), Money::from_minor(1_000 * u64::from(qty)));
                        }
                        Err(PurchaseError::InsufficientStock { requested, available, .. }) => {
                            assert_eq!(requested, u64::from(qty));
                            assert!(available < requested);
                        }
                        Err(other) => panic!("unexpected error: {other}"),
                    }
                }

                let remaining = stock_of(&store, product).await;
                assert_eq!(remaining + sold, initial);
                let recorded: u32 = store
                    .find_all()
                    .await
                    .unwrap()
                    .iter()
                    .flat_map(|p| p.items())
                    .map(|l| l.quantity())
                    .sum();
                assert_eq!(recorded, sold);
            });
        }
    }
}
