//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances holding the same values are
/// the same value. They are immutable; "changing" one means building a new one.
///
/// - **Value object**: `Quantity(12.5)` equals any other `Quantity(12.5)`
/// - **Entity**: two stock entities with the same name are still different records
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
