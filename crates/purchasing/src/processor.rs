//! Purchase submission: validate every line, then commit them all at once.
//!
//! ```text
//! submit(buyer, items)
//!   ↓
//! 0. Shape check: non-empty, positive quantities        (no store access)
//!   ↓
//! 1. Validation: every product exists and has stock     (reads only)
//!   ↓
//! 2. Commit, inside one store transaction:
//!      per line: re-read product, check version, capture price,
//!                decrement stock, versioned write
//!      insert purchase → assigned id
//!      insert every line item
//!      commit
//! ```
//!
//! The version remembered in step 1 is the optimistic concurrency token for
//! step 2. If any stock row moved in between, the submission fails with
//! `PurchaseError::ConcurrencyConflict` and the transaction is dropped, so
//! nothing from this submission is persisted.

use std::collections::HashMap;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use checkout_core::{AggregateRoot, ExpectedVersion};
use checkout_products::ProductId;

use crate::error::PurchaseError;
use crate::purchase::{BuyerId, LineItemRequest, NewPurchase, Purchase, PurchaseLineItem};
use crate::store::{PurchaseTransaction, TransactionalStore};

/// Product versions observed during validation, updated after each own write.
type VersionSnapshot = HashMap<ProductId, u64>;

/// Orchestrates validation and commit of purchase requests against a store.
#[derive(Debug, Clone)]
pub struct PurchaseProcessor<S> {
    store: S,
}

impl<S> PurchaseProcessor<S>
where
    S: TransactionalStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Submit a purchase for `buyer_id`.
    ///
    /// Not idempotent: submitting the same items twice records two purchases.
    #[instrument(skip_all, fields(buyer_id = %buyer_id, lines = items.len()))]
    pub async fn submit(
        &self,
        buyer_id: BuyerId,
        items: &[LineItemRequest],
    ) -> Result<Purchase, PurchaseError> {
        let result = self.try_submit(buyer_id, items).await;
        match &result {
            Ok(purchase) => info!(
                purchase_id = %purchase.id_typed(),
                total = %purchase.total(),
                "purchase committed"
            ),
            Err(err) => warn!(error_kind = err.kind(), error = %err, "purchase rejected"),
        }
        result
    }

    async fn try_submit(
        &self,
        buyer_id: BuyerId,
        items: &[LineItemRequest],
    ) -> Result<Purchase, PurchaseError> {
        check_shape(items)?;
        let snapshot = self.validate(items).await?;
        debug!("validation passed; committing");
        self.commit(buyer_id, items, snapshot).await
    }

    async fn validate(&self, items: &[LineItemRequest]) -> Result<VersionSnapshot, PurchaseError> {
        let mut snapshot = VersionSnapshot::with_capacity(items.len());

        for (product_id, requested) in requested_per_product(items) {
            let product = self
                .store
                .get(product_id)
                .await?
                .ok_or(PurchaseError::ProductNotFound { product_id })?;

            let available = u64::from(product.stock());
            if available < requested {
                return Err(PurchaseError::InsufficientStock {
                    product_name: product.name().to_string(),
                    requested,
                    available,
                });
            }
            snapshot.insert(product_id, product.version());
        }

        Ok(snapshot)
    }

    async fn commit(
        &self,
        buyer_id: BuyerId,
        items: &[LineItemRequest],
        mut snapshot: VersionSnapshot,
    ) -> Result<Purchase, PurchaseError> {
        let mut tx = self.store.begin().await?;
        let mut lines = Vec::with_capacity(items.len());

        for request in items {
            let product_id = request.product_id;
            let seen = snapshot
                .get(&product_id)
                .copied()
                .ok_or(PurchaseError::ConcurrencyConflict)?;

            // A product that vanished or moved since validation is a concurrent change.
            let mut product = tx
                .product(product_id)
                .await?
                .ok_or(PurchaseError::ConcurrencyConflict)?;
            if product.version() != seen {
                debug!(%product_id, seen, current = product.version(), "stock row changed since validation");
                return Err(PurchaseError::ConcurrencyConflict);
            }

            // Quantities were checked up front, so only overflow can fail here.
            let line = PurchaseLineItem::capture(&product, request.quantity)
                .map_err(|_| PurchaseError::AmountOverflow)?;
            product
                .decrement_stock(request.quantity)
                .map_err(|_| PurchaseError::ConcurrencyConflict)?;

            tx.update_product(&product, ExpectedVersion(seen))
                .await?;
            snapshot.insert(product_id, product.version());
            lines.push(line);
        }

        let purchase = NewPurchase::new(buyer_id, Utc::now(), lines)
            .map_err(|_| PurchaseError::AmountOverflow)?;

        let purchase_id = tx.insert_purchase(&purchase).await?;
        for line in purchase.items() {
            tx.insert_line_item(purchase_id, line).await?;
        }
        tx.commit().await?;

        Ok(purchase.assign_id(purchase_id))
    }
}

fn check_shape(items: &[LineItemRequest]) -> Result<(), PurchaseError> {
    if items.is_empty() {
        return Err(PurchaseError::EmptyOrder);
    }
    if let Some(bad) = items.iter().find(|r| r.quantity == 0) {
        return Err(PurchaseError::InvalidQuantity {
            product_id: bad.product_id,
        });
    }
    Ok(())
}

/// Total requested quantity per product, in first-seen order.
fn requested_per_product(items: &[LineItemRequest]) -> Vec<(ProductId, u64)> {
    let mut totals: Vec<(ProductId, u64)> = Vec::with_capacity(items.len());
    let mut index: HashMap<ProductId, usize> = HashMap::with_capacity(items.len());

    for request in items {
        let qty = u64::from(request.quantity);
        match index.get(&request.product_id) {
            Some(&i) => totals[i].1 += qty,
            None => {
                index.insert(request.product_id, totals.len());
                totals.push((request.product_id, qty));
            }
        }
    }
    totals
}
