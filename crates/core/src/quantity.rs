//! Non-negative stock quantity.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// A non-negative rational amount of stock, in the owning entity's unit.
///
/// Signed amounts (movement effects, reversals) are plain [`Decimal`]s; only
/// balances and movement sizes are `Quantity`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Quantity(Decimal);

impl ValueObject for Quantity {}

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn new(value: Decimal) -> DomainResult<Self> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::NegativeQuantity(value));
        }
        Ok(Self(value.normalize()))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Apply a signed delta, flooring the result at zero.
    ///
    /// Returns the new quantity and the amount the floor absorbed (zero unless
    /// the raw result was negative).
    pub fn apply_clamped(self, delta: Decimal) -> (Quantity, Decimal) {
        let raw = self.0 + delta;
        if raw.is_sign_negative() && !raw.is_zero() {
            (Quantity::ZERO, -raw)
        } else {
            (Quantity(raw.normalize()), Decimal::ZERO)
        }
    }

    /// Apply a signed delta, returning `None` if the result would be negative.
    pub fn checked_apply(self, delta: Decimal) -> Option<Quantity> {
        match self.apply_clamped(delta) {
            (q, absorbed) if absorbed.is_zero() => Some(q),
            _ => None,
        }
    }
}

impl TryFrom<Decimal> for Quantity {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for Decimal {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl core::fmt::Display for Quantity {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
