//! Quantity effect resolver.
//!
//! Maps `(type, direction, quantity)` to the signed amount a movement adds to
//! its entity's balance. Pure and total over valid inputs.

use rust_decimal::Decimal;

use stockledger_core::{DomainError, DomainResult};

use crate::movement::{Direction, MovementType};

/// Sign of a movement's effect: `+1` for purchases and increasing adjustments,
/// `-1` for consumption, wastage and decreasing adjustments.
pub fn sign(movement_type: MovementType, direction: Option<Direction>) -> DomainResult<i8> {
    match (movement_type, direction) {
        (MovementType::Adjustment, Some(Direction::Increase)) => Ok(1),
        (MovementType::Adjustment, Some(Direction::Decrease)) => Ok(-1),
        (MovementType::Adjustment, None) => Err(DomainError::validation(
            "adjustment requires a direction",
        )),
        (other, Some(_)) => Err(DomainError::validation(format!(
            "direction is only allowed on adjustments (got {other})"
        ))),
        (MovementType::Purchase, None) => Ok(1),
        (MovementType::Consumed, None) | (MovementType::Wastage, None) => Ok(-1),
    }
}

/// Signed delta contributed by a movement.
pub fn effect(
    movement_type: MovementType,
    direction: Option<Direction>,
    quantity: Decimal,
) -> DomainResult<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(DomainError::validation(format!(
            "quantity must be positive (got {quantity})"
        )));
    }
    let sign = sign(movement_type, direction)?;
    Ok(Decimal::from(sign) * quantity)
}

/// Negation of [`effect`]; what undoing the movement adds to the balance.
pub fn reversal(
    movement_type: MovementType,
    direction: Option<Direction>,
    quantity: Decimal,
) -> DomainResult<Decimal> {
    effect(movement_type, direction, quantity).map(|d| -d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn purchase_adds_and_consumption_subtracts() {
        assert_eq!(effect(MovementType::Purchase, None, dec!(50)).unwrap(), dec!(50));
        assert_eq!(effect(MovementType::Consumed, None, dec!(20)).unwrap(), dec!(-20));
        assert_eq!(effect(MovementType::Wastage, None, dec!(0.5)).unwrap(), dec!(-0.5));
    }

    #[test]
    fn adjustment_follows_direction() {
        assert_eq!(
            effect(MovementType::Adjustment, Some(Direction::Increase), dec!(3)).unwrap(),
            dec!(3)
        );
        assert_eq!(
            effect(MovementType::Adjustment, Some(Direction::Decrease), dec!(3)).unwrap(),
            dec!(-3)
        );
    }

    #[test]
    fn adjustment_without_direction_is_invalid() {
        let err = effect(MovementType::Adjustment, None, dec!(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn direction_on_non_adjustment_is_invalid() {
        let err = effect(MovementType::Purchase, Some(Direction::Increase), dec!(1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn non_positive_quantity_is_invalid() {
        assert!(effect(MovementType::Purchase, None, Decimal::ZERO).is_err());
        assert!(effect(MovementType::Purchase, None, dec!(-4)).is_err());
    }

    fn valid_kind() -> impl Strategy<Value = (MovementType, Option<Direction>)> {
        prop_oneof![
            Just((MovementType::Purchase, None)),
            Just((MovementType::Consumed, None)),
            Just((MovementType::Wastage, None)),
            Just((MovementType::Adjustment, Some(Direction::Increase))),
            Just((MovementType::Adjustment, Some(Direction::Decrease))),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: the magnitude of an effect is always the movement quantity,
        /// and a reversal cancels it exactly.
        #[test]
        fn effect_magnitude_is_quantity_and_reversal_cancels(
            (kind, direction) in valid_kind(),
            units in 1i64..10_000_000i64,
            scale in 0u32..4u32,
        ) {
            let quantity = Decimal::new(units, scale);
            let delta = effect(kind, direction, quantity).unwrap();
            let undo = reversal(kind, direction, quantity).unwrap();

            prop_assert_eq!(delta.abs(), quantity);
            prop_assert_eq!(delta + undo, Decimal::ZERO);
        }
    }
}
