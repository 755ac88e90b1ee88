//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every record kept in a [`crate::LedgerStore`] is an entity. Identifiers are
/// ordered so stores can list records deterministically (UUIDv7 ids sort by
/// creation time).
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Copy + Eq + Ord + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
