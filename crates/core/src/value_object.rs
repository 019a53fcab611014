//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attributes. `Money` is
/// the canonical example in this workspace: two amounts of 250 minor units
/// are the same amount no matter where they came from.
///
/// To "change" a value object, build a new one:
///
/// ```
/// use checkout_core::Money;
///
/// let unit = Money::from_minor(250);
/// let line = unit.checked_mul(3).unwrap();
/// assert_eq!(line, Money::from_minor(750));
/// assert_eq!(unit, Money::from_minor(250));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
