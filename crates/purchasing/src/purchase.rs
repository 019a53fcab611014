use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use checkout_core::{DomainError, DomainResult, Entity, Money, UserId};
use checkout_products::{Product, ProductId};

/// Purchase identifier, assigned by the ledger when the purchase is inserted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PurchaseId(pub u64);

impl core::fmt::Display for PurchaseId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// The buyer placing a purchase.
pub type BuyerId = UserId;

/// Purchase status lifecycle.
///
/// Submission is the only transition defined so far, and it lands in `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PurchaseStatus {
    Pending,
}

impl PurchaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PurchaseStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(PurchaseStatus::Pending),
            other => Err(DomainError::validation(format!(
                "unknown purchase status '{other}'"
            ))),
        }
    }
}

/// A requested (product, quantity) pair, as handed in by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl LineItemRequest {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// A committed line: quantity plus the unit price captured at commit time.
///
/// `subtotal` is always `quantity * unit_price`; the only constructors compute it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseLineItem {
    product_id: ProductId,
    product_name: String,
    quantity: u32,
    unit_price: Money,
    subtotal: Money,
}

impl PurchaseLineItem {
    /// Capture the product's current price for `quantity` units.
    pub fn capture(product: &Product, quantity: u32) -> DomainResult<Self> {
        Self::restore(
            product.id_typed(),
            product.name(),
            quantity,
            product.unit_price(),
        )
    }

    /// Rebuild a line loaded from storage (the subtotal is recomputed).
    pub fn restore(
        product_id: ProductId,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let subtotal = unit_price
            .checked_mul(quantity)
            .ok_or_else(|| DomainError::invariant("line subtotal overflows"))?;

        Ok(Self {
            product_id,
            product_name: product_name.into(),
            quantity,
            unit_price,
            subtotal,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }
}

fn total_of(items: &[PurchaseLineItem]) -> DomainResult<Money> {
    Money::checked_sum(items.iter().map(PurchaseLineItem::subtotal))
        .ok_or_else(|| DomainError::invariant("purchase total overflows"))
}

/// A purchase that has been priced but not yet inserted into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPurchase {
    buyer_id: BuyerId,
    created_at: DateTime<Utc>,
    status: PurchaseStatus,
    total: Money,
    items: Vec<PurchaseLineItem>,
}

impl NewPurchase {
    /// Price a new `Pending` purchase; the total is the sum of line subtotals.
    pub fn new(
        buyer_id: BuyerId,
        created_at: DateTime<Utc>,
        items: Vec<PurchaseLineItem>,
    ) -> DomainResult<Self> {
        if items.is_empty() {
            return Err(DomainError::validation("purchase must have at least one line"));
        }
        let total = total_of(&items)?;
        Ok(Self {
            buyer_id,
            created_at,
            status: PurchaseStatus::Pending,
            total,
            items,
        })
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn items(&self) -> &[PurchaseLineItem] {
        &self.items
    }

    /// Attach the identifier the ledger assigned on insert.
    pub fn assign_id(self, id: PurchaseId) -> Purchase {
        Purchase {
            id,
            buyer_id: self.buyer_id,
            created_at: self.created_at,
            status: self.status,
            total: self.total,
            items: self.items,
        }
    }
}

/// A committed purchase. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Purchase {
    id: PurchaseId,
    buyer_id: BuyerId,
    created_at: DateTime<Utc>,
    status: PurchaseStatus,
    total: Money,
    items: Vec<PurchaseLineItem>,
}

impl Purchase {
    /// Rebuild a purchase loaded from storage.
    ///
    /// The total is recomputed from the lines; a stored total that disagrees
    /// is reported as an invariant violation.
    pub fn restore(
        id: PurchaseId,
        buyer_id: BuyerId,
        created_at: DateTime<Utc>,
        status: PurchaseStatus,
        stored_total: Money,
        items: Vec<PurchaseLineItem>,
    ) -> DomainResult<Self> {
        let total = total_of(&items)?;
        if total != stored_total {
            return Err(DomainError::invariant(format!(
                "purchase {id}: stored total {stored_total} does not match line subtotals {total}"
            )));
        }
        Ok(Self {
            id,
            buyer_id,
            created_at,
            status,
            total,
            items,
        })
    }

    pub fn id_typed(&self) -> PurchaseId {
        self.id
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Calendar date (UTC) the purchase was placed.
    pub fn purchase_date(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn status(&self) -> PurchaseStatus {
        self.status
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn items(&self) -> &[PurchaseLineItem] {
        &self.items
    }
}

impl Entity for Purchase {
    type Id = PurchaseId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
