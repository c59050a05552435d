//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Every record a store owns (invoice, payment, customer, tax, ...) is an entity:
/// two values with the same id denote the same record, whatever their fields say.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;

    /// Human-readable display name (the key used by name-based matching).
    fn display_name(&self) -> &str;
}
