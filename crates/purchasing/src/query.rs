//! Read-only purchase lookups. Straight pass-through to the ledger.

use tracing::instrument;

use crate::error::StoreError;
use crate::purchase::{BuyerId, Purchase, PurchaseId};
use crate::store::PurchaseLedger;

/// Outcome of a lookup by id. A missing purchase is a normal answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseLookup {
    Found(Purchase),
    NotFound(PurchaseId),
}

impl PurchaseLookup {
    pub fn into_option(self) -> Option<Purchase> {
        match self {
            PurchaseLookup::Found(p) => Some(p),
            PurchaseLookup::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, PurchaseLookup::Found(_))
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseQueries<L> {
    ledger: L,
}

impl<L> PurchaseQueries<L>
where
    L: PurchaseLedger,
{
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    #[instrument(skip_all, fields(purchase_id = %id))]
    pub async fn get_by_id(&self, id: PurchaseId) -> Result<PurchaseLookup, StoreError> {
        Ok(match self.ledger.find_by_id(id).await? {
            Some(purchase) => PurchaseLookup::Found(purchase),
            None => PurchaseLookup::NotFound(id),
        })
    }

    /// All purchases of one buyer; an empty list is a normal result.
    #[instrument(skip_all, fields(buyer_id = %buyer_id))]
    pub async fn list_by_buyer(&self, buyer_id: BuyerId) -> Result<Vec<Purchase>, StoreError> {
        self.ledger.find_by_buyer(buyer_id).await
    }

    #[instrument(skip_all)]
    pub async fn list_all(&self) -> Result<Vec<Purchase>, StoreError> {
        self.ledger.find_all().await
    }
}
