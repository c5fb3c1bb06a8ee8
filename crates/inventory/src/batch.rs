use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchId, DomainError, DomainResult, Entity, EntityId, MovementId, Quantity, UserId};

use crate::movement::{Direction, MovementInput};

/// Amount of one raw material a batch uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialUsage {
    pub material_id: EntityId,
    pub quantity: Decimal,
}

/// Request to record a production batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchInput {
    pub product_id: EntityId,
    pub quantity: Decimal,
    pub produced_on: NaiveDate,
    /// Batch reference; also the `reference` of every movement the batch creates.
    pub reference: String,
    pub materials: Vec<MaterialUsage>,
}

impl BatchInput {
    /// Reject malformed batches: non-positive quantities, a blank reference,
    /// a future date, a material listed twice, or the product consuming itself.
    pub fn validate(&self, today: NaiveDate) -> DomainResult<()> {
        if self.reference.trim().is_empty() {
            return Err(DomainError::validation("batch reference cannot be empty"));
        }
        self.output().validate(today)?;

        let mut seen = BTreeSet::new();
        for usage in &self.materials {
            if usage.material_id == self.product_id {
                return Err(DomainError::validation(format!(
                    "product {} cannot consume itself",
                    self.product_id
                )));
            }
            if !seen.insert(usage.material_id) {
                return Err(DomainError::validation(format!(
                    "material {} listed more than once",
                    usage.material_id
                )));
            }
            self.consumption(usage).validate(today)?;
        }
        Ok(())
    }

    /// Movement crediting the produced quantity to the product.
    pub fn output(&self) -> MovementInput {
        MovementInput::adjustment(
            Direction::Increase,
            self.quantity,
            self.produced_on,
            self.reference.clone(),
        )
    }

    /// Movement deducting one material.
    pub fn consumption(&self, usage: &MaterialUsage) -> MovementInput {
        MovementInput::consumed(usage.quantity, self.produced_on, self.reference.clone())
    }
}

/// A movement a batch created on one entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumption {
    pub entity_id: EntityId,
    pub movement_id: MovementId,
}

/// Stored record of a production batch and every movement it created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionBatch {
    pub id: BatchId,
    pub product_id: EntityId,
    pub quantity: Quantity,
    pub produced_on: NaiveDate,
    pub reference: String,
    pub output_movement: MovementId,
    pub consumptions: Vec<Consumption>,
    pub recorded_by: UserId,
    pub recorded_at: DateTime<Utc>,
}

impl Entity for ProductionBatch {
    type Id = BatchId;
    const COLLECTION: &'static str = "batches";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl ProductionBatch {
    /// Every movement the batch owns, materials first, then the product output.
    pub fn movements(&self) -> impl Iterator<Item = Consumption> + '_ {
        self.consumptions.iter().copied().chain(std::iter::once(Consumption {
            entity_id: self.product_id,
            movement_id: self.output_movement,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 4).unwrap()
    }

    fn input(materials: Vec<MaterialUsage>) -> BatchInput {
        BatchInput {
            product_id: EntityId::new(),
            quantity: dec!(12),
            produced_on: today(),
            reference: "B-0042".into(),
            materials,
        }
    }

    fn usage(quantity: Decimal) -> MaterialUsage {
        MaterialUsage {
            material_id: EntityId::new(),
            quantity,
        }
    }

    #[test]
    fn well_formed_batch_validates() {
        assert!(input(vec![usage(dec!(2)), usage(dec!(0.5))]).validate(today()).is_ok());
    }

    #[test]
    fn duplicate_material_is_rejected() {
        let u = usage(dec!(1));
        assert!(input(vec![u, u]).validate(today()).is_err());
    }

    #[test]
    fn product_cannot_consume_itself() {
        let mut batch = input(vec![]);
        batch.materials.push(MaterialUsage {
            material_id: batch.product_id,
            quantity: dec!(1),
        });
        assert!(batch.validate(today()).is_err());
    }

    #[test]
    fn zero_quantities_are_rejected() {
        assert!(input(vec![usage(dec!(0))]).validate(today()).is_err());

        let mut batch = input(vec![]);
        batch.quantity = Decimal::ZERO;
        assert!(batch.validate(today()).is_err());
    }

    #[test]
    fn blank_reference_is_rejected() {
        let mut batch = input(vec![usage(dec!(1))]);
        batch.reference = "  ".into();
        assert!(batch.validate(today()).is_err());
    }

    #[test]
    fn output_is_an_increase_adjustment_with_the_batch_reference() {
        let batch = input(vec![]);
        let output = batch.output();
        assert_eq!(output.direction, Some(Direction::Increase));
        assert_eq!(output.reference, "B-0042");
        assert_eq!(output.effect().unwrap(), dec!(12));
    }
}
