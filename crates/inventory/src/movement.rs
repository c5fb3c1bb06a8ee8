use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, EntityId, MovementId, Quantity, UserId};

use crate::effect;

/// Kind of stock-affecting event.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    Purchase,
    Consumed,
    Adjustment,
    Wastage,
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            MovementType::Purchase => "purchase",
            MovementType::Consumed => "consumed",
            MovementType::Adjustment => "adjustment",
            MovementType::Wastage => "wastage",
        };
        f.write_str(s)
    }
}

/// Direction of an adjustment. Meaningless for every other type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

/// Caller-supplied movement fields, before the ledger assigns identity and
/// authorship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementInput {
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub quantity: Decimal,
    pub occurred_on: NaiveDate,
    /// Free text: supplier, batch reference, reason.
    #[serde(default)]
    pub reference: String,
}

impl MovementInput {
    pub fn purchase(quantity: Decimal, occurred_on: NaiveDate, supplier: impl Into<String>) -> Self {
        Self::plain(MovementType::Purchase, quantity, occurred_on, supplier)
    }

    pub fn consumed(quantity: Decimal, occurred_on: NaiveDate, reference: impl Into<String>) -> Self {
        Self::plain(MovementType::Consumed, quantity, occurred_on, reference)
    }

    pub fn wastage(quantity: Decimal, occurred_on: NaiveDate, reason: impl Into<String>) -> Self {
        Self::plain(MovementType::Wastage, quantity, occurred_on, reason)
    }

    pub fn adjustment(
        direction: Direction,
        quantity: Decimal,
        occurred_on: NaiveDate,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            movement_type: MovementType::Adjustment,
            direction: Some(direction),
            quantity,
            occurred_on,
            reference: reason.into(),
        }
    }

    fn plain(
        movement_type: MovementType,
        quantity: Decimal,
        occurred_on: NaiveDate,
        reference: impl Into<String>,
    ) -> Self {
        Self {
            movement_type,
            direction: None,
            quantity,
            occurred_on,
            reference: reference.into(),
        }
    }

    /// Check shape invariants: positive quantity, direction iff adjustment,
    /// and an occurrence date that is not in the future.
    pub fn validate(&self, today: NaiveDate) -> DomainResult<()> {
        self.effect()?;
        if self.occurred_on > today {
            return Err(DomainError::validation(format!(
                "occurred_on {} is in the future",
                self.occurred_on
            )));
        }
        Ok(())
    }

    /// Signed delta this input would contribute.
    pub fn effect(&self) -> DomainResult<Decimal> {
        effect::effect(self.movement_type, self.direction, self.quantity)
    }
}

/// A recorded stock movement owned by exactly one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub entity_id: EntityId,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub quantity: Quantity,
    pub occurred_on: NaiveDate,
    #[serde(default)]
    pub reference: String,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Entity for Movement {
    type Id = MovementId;
    const COLLECTION: &'static str = "movements";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl Movement {
    /// Build a new movement from validated input.
    pub fn record(
        id: MovementId,
        entity_id: EntityId,
        input: &MovementInput,
        created_by: UserId,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        input.validate(created_at.date_naive())?;
        Ok(Self {
            id,
            entity_id,
            movement_type: input.movement_type,
            direction: input.direction,
            quantity: Quantity::new(input.quantity)?,
            occurred_on: input.occurred_on,
            reference: input.reference.clone(),
            created_by,
            created_at,
            updated_by: None,
            updated_at: None,
        })
    }

    /// Replace the editable fields, keeping identity and original authorship.
    pub fn revise(
        &self,
        input: &MovementInput,
        updated_by: UserId,
        updated_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        input.validate(updated_at.date_naive())?;
        Ok(Self {
            id: self.id,
            entity_id: self.entity_id,
            movement_type: input.movement_type,
            direction: input.direction,
            quantity: Quantity::new(input.quantity)?,
            occurred_on: input.occurred_on,
            reference: input.reference.clone(),
            created_by: self.created_by,
            created_at: self.created_at,
            updated_by: Some(updated_by),
            updated_at: Some(updated_at),
        })
    }

    /// Signed delta this movement contributes to its entity's balance.
    pub fn effect(&self) -> DomainResult<Decimal> {
        effect::effect(self.movement_type, self.direction, self.quantity.value())
    }

    /// What removing this movement adds to its entity's balance.
    pub fn reversal(&self) -> DomainResult<Decimal> {
        effect::reversal(self.movement_type, self.direction, self.quantity.value())
    }

    /// One-line human description, used in audit records.
    pub fn describe(&self) -> String {
        match self.direction {
            Some(Direction::Increase) => format!("adjustment +{}", self.quantity),
            Some(Direction::Decrease) => format!("adjustment -{}", self.quantity),
            None => format!("{} {}", self.movement_type, self.quantity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn at(d: u32) -> DateTime<Utc> {
        day(d).and_hms_opt(12, 0, 0).unwrap().and_utc()
    }

    #[test]
    fn record_rejects_future_dates() {
        let input = MovementInput::purchase(dec!(10), day(20), "ACME");
        let err = Movement::record(MovementId::new(), EntityId::new(), &input, UserId::new(), at(19))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("future")));
    }

    #[test]
    fn record_rejects_adjustment_without_direction() {
        let mut input = MovementInput::adjustment(Direction::Increase, dec!(1), day(1), "count");
        input.direction = None;
        assert!(input.validate(day(2)).is_err());
    }

    #[test]
    fn revise_preserves_authorship() {
        let creator = UserId::new();
        let editor = UserId::new();
        let original = Movement::record(
            MovementId::new(),
            EntityId::new(),
            &MovementInput::purchase(dec!(50), day(1), "ACME"),
            creator,
            at(1),
        )
        .unwrap();

        let revised = original
            .revise(&MovementInput::purchase(dec!(30), day(1), "ACME"), editor, at(2))
            .unwrap();

        assert_eq!(revised.id, original.id);
        assert_eq!(revised.created_by, creator);
        assert_eq!(revised.created_at, at(1));
        assert_eq!(revised.updated_by, Some(editor));
        assert_eq!(revised.updated_at, Some(at(2)));
        assert_eq!(revised.effect().unwrap(), dec!(30));
    }

    #[test]
    fn serialized_movement_uses_type_key_and_omits_absent_direction() {
        let m = Movement::record(
            MovementId::new(),
            EntityId::new(),
            &MovementInput::wastage(dec!(2), day(3), "spill"),
            UserId::new(),
            at(3),
        )
        .unwrap();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["type"], "wastage");
        assert!(json.get("direction").is_none());
        let back: Movement = serde_json::from_value(json).unwrap();
        assert_eq!(back, m);
    }

    #[test]
    fn describe_mentions_direction_for_adjustments() {
        let m = Movement::record(
            MovementId::new(),
            EntityId::new(),
            &MovementInput::adjustment(Direction::Decrease, dec!(4), day(3), "recount"),
            UserId::new(),
            at(3),
        )
        .unwrap();
        assert_eq!(m.describe(), "adjustment -4");
    }
}
