//! Entity trait: identity + continuity across ledger mutations.

/// A record with identity that is persisted as its own document.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Collection segment under which documents of this kind are stored
    /// (e.g. `"entities"`, `"movements"`).
    const COLLECTION: &'static str;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
