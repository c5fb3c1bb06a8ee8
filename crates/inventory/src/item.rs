use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, DomainResult, Entity, EntityId, Quantity};

/// What a stock-bearing entity represents.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Raw material, bought and consumed by production.
    Material,
    /// Good produced by production batches.
    ProducibleGood,
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            EntityKind::Material => "material",
            EntityKind::ProducibleGood => "producible good",
        };
        f.write_str(s)
    }
}

/// A raw material or producible good with a running stock balance.
///
/// `current_stock` is a cached value. The movement log is authoritative:
/// `current_stock == initial_stock + Σ effects + clamp_adjustment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reorder_threshold: Option<Quantity>,
    pub initial_stock: Quantity,
    current_stock: Quantity,
    /// Total the ledger added back when flooring a negative balance at zero.
    #[serde(default)]
    clamp_adjustment: Decimal,
}

impl Entity for StockEntity {
    type Id = EntityId;
    const COLLECTION: &'static str = "entities";

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl StockEntity {
    pub fn new(
        id: EntityId,
        kind: EntityKind,
        name: impl Into<String>,
        unit: impl Into<String>,
        initial_stock: Quantity,
    ) -> DomainResult<Self> {
        let name = name.into();
        let unit = unit.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        if unit.trim().is_empty() {
            return Err(DomainError::validation("unit cannot be empty"));
        }
        Ok(Self {
            id,
            kind,
            name,
            unit,
            reorder_threshold: None,
            initial_stock,
            current_stock: initial_stock,
            clamp_adjustment: Decimal::ZERO,
        })
    }

    pub fn with_reorder_threshold(mut self, threshold: Quantity) -> Self {
        self.reorder_threshold = Some(threshold);
        self
    }

    pub fn current_stock(&self) -> Quantity {
        self.current_stock
    }

    pub fn clamp_adjustment(&self) -> Decimal {
        self.clamp_adjustment
    }

    /// True once stock has fallen to or below the reorder threshold.
    pub fn needs_reorder(&self) -> bool {
        self.reorder_threshold
            .is_some_and(|threshold| self.current_stock <= threshold)
    }

    /// Set the cached balance. Only the ledger coordinator may call this.
    pub fn rebalance(&mut self, new_stock: Quantity) {
        self.current_stock = new_stock;
    }

    /// Record an amount discarded by clamping the balance at zero.
    pub fn record_clamp(&mut self, absorbed: Decimal) {
        self.clamp_adjustment += absorbed;
    }

    /// Balance implied by the movement log: initial stock plus the given
    /// effects plus everything clamping has absorbed.
    pub fn derived_stock(&self, effects: impl IntoIterator<Item = Decimal>) -> Decimal {
        self.initial_stock.value() + effects.into_iter().sum::<Decimal>() + self.clamp_adjustment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn flour(stock: Decimal) -> StockEntity {
        StockEntity::new(
            EntityId::new(),
            EntityKind::Material,
            "Flour",
            "kg",
            Quantity::new(stock).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn new_entity_starts_at_initial_stock() {
        let e = flour(dec!(100));
        assert_eq!(e.current_stock().value(), dec!(100));
        assert_eq!(e.clamp_adjustment(), Decimal::ZERO);
    }

    #[test]
    fn kinds_display_in_plain_words() {
        assert_eq!(EntityKind::Material.to_string(), "material");
        assert_eq!(EntityKind::ProducibleGood.to_string(), "producible good");
    }

    #[test]
    fn blank_name_or_unit_is_rejected() {
        assert!(StockEntity::new(EntityId::new(), EntityKind::Material, " ", "kg", Quantity::ZERO).is_err());
        assert!(StockEntity::new(EntityId::new(), EntityKind::Material, "Salt", "", Quantity::ZERO).is_err());
    }

    #[test]
    fn reorder_threshold_is_inclusive() {
        let mut e = flour(dec!(10)).with_reorder_threshold(Quantity::new(dec!(5)).unwrap());
        assert!(!e.needs_reorder());
        e.rebalance(Quantity::new(dec!(5)).unwrap());
        assert!(e.needs_reorder());
    }

    #[test]
    fn derived_stock_includes_clamp_adjustment() {
        let mut e = flour(dec!(5));
        e.record_clamp(dec!(3));
        assert_eq!(e.derived_stock([dec!(-5), dec!(-3)]), dec!(0));
    }
}
