use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use checkout_core::{AggregateId, AggregateRoot, DomainError, DomainResult, Money};

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Descriptive metadata shown in the catalog; no business rules depend on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub description: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

/// Aggregate root: Product.
///
/// Stock is a `u32`, so it cannot be negative; `decrement_stock` refuses any
/// decrement larger than what is on hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    category: String,
    unit_price: Money,
    stock: u32,
    details: ProductDetails,
    version: u64,
}

impl Product {
    /// Create a catalog entry at version 0.
    pub fn new(
        id: ProductId,
        name: impl Into<String>,
        category: impl Into<String>,
        unit_price: Money,
        stock: u32,
    ) -> DomainResult<Self> {
        Self::restore(
            id,
            name,
            category,
            unit_price,
            stock,
            ProductDetails::default(),
            0,
        )
    }

    /// Rebuild a product loaded from storage.
    pub fn restore(
        id: ProductId,
        name: impl Into<String>,
        category: impl Into<String>,
        unit_price: Money,
        stock: u32,
        details: ProductDetails,
        version: u64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            category: category.into(),
            unit_price,
            stock,
            details,
            version,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.details.description = Some(description.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.attributes.insert(key.into(), value.into());
        self
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock(&self) -> u32 {
        self.stock
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    /// Take this product's data as the replacement of `previous`.
    ///
    /// The version moves strictly past `previous`, so a version read before
    /// the replacement no longer matches.
    pub fn supersede(mut self, previous: &Product) -> Self {
        self.version = self.version.max(previous.version + 1);
        self
    }

    /// Take `quantity` units out of stock and bump the version.
    pub fn decrement_stock(&mut self, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let remaining = self
            .stock
            .checked_sub(quantity)
            .ok_or_else(|| DomainError::invariant("stock cannot go negative"))?;

        self.stock = remaining;
        self.version += 1;
        Ok(())
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}
