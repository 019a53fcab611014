//! Monetary amounts in minor currency units.

use serde::{Deserialize, Serialize};

use crate::value_object::ValueObject;

/// Non-negative amount in the smallest currency unit (e.g. cents).
///
/// Arithmetic is checked: an overflow yields `None` instead of wrapping.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl ValueObject for Money {}

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor_units: u64) -> Self {
        Self(minor_units)
    }

    /// Build an amount from whole units and a cents part (`cents < 100`).
    pub fn from_major(units: u64, cents: u8) -> Option<Self> {
        if cents >= 100 {
            return None;
        }
        units
            .checked_mul(100)
            .and_then(|v| v.checked_add(u64::from(cents)))
            .map(Self)
    }

    pub const fn minor_units(self) -> u64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(u64::from(quantity)).map(Money)
    }

    /// Sum a sequence of amounts, `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Money>
    where
        I: IntoIterator<Item = Money>,
    {
        amounts
            .into_iter()
            .try_fold(Money::ZERO, |acc, m| acc.checked_add(m))
    }
}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
