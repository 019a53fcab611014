//! Identity for records that are compared by id rather than by value.

/// A record whose identity is a small `Copy` key (e.g. an assigned row id).
pub trait Entity {
    type Id: Copy + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> Self::Id;
}
