//! Recompute a balance from the movement log and compare it with the cache.

use rust_decimal::Decimal;

use stockledger_core::{EntityId, Quantity};

use crate::audit::AuditSink;
use crate::balance_store::BalanceStore;
use crate::coordinator::LedgerCoordinator;
use crate::document_store::DocumentStore;
use crate::error::LedgerError;
use crate::movement_store::MovementStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub entity_id: EntityId,
    /// Cached `current_stock`.
    pub recorded: Quantity,
    /// `initial_stock + Σ effects + clamp_adjustment`.
    pub derived: Decimal,
    /// `recorded - derived`; zero for a consistent entity.
    pub discrepancy: Decimal,
    pub clamp_adjustment: Decimal,
    pub movement_count: usize,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.discrepancy.is_zero()
    }
}

impl<S, A> LedgerCoordinator<S, A>
where
    S: DocumentStore,
    A: AuditSink,
{
    /// Compare an entity's cached balance with its movement log.
    ///
    /// Runs as a read-only transaction on the entity document: every ledger
    /// write bumps that document, so a successful commit means the movement
    /// list was read against the same balance.
    pub fn reconcile(&self, entity_id: EntityId) -> Result<Reconciliation, LedgerError> {
        let (report, _) = self.transact("reconcile", entity_id, |tx| {
            let entity = BalanceStore::load(tx, entity_id)?;
            let movements = MovementStore::list(self.store(), entity_id)?;

            let effects = movements
                .iter()
                .map(|m| m.effect())
                .collect::<Result<Vec<_>, _>>()?;
            let derived = entity.derived_stock(effects);

            Ok(Reconciliation {
                entity_id,
                recorded: entity.current_stock(),
                derived,
                discrepancy: entity.current_stock().value() - derived,
                clamp_adjustment: entity.clamp_adjustment(),
                movement_count: movements.len(),
            })
        })?;

        if report.is_consistent() {
            tracing::debug!(entity_id = %entity_id, movements = report.movement_count, "balance reconciled");
        } else {
            tracing::warn!(
                entity_id = %entity_id,
                recorded = %report.recorded,
                derived = %report.derived,
                discrepancy = %report.discrepancy,
                "balance does not match movement log"
            );
        }
        Ok(report)
    }
}
