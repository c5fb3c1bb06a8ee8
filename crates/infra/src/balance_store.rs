//! Balance store: the cached `current_stock` on each entity document.
//!
//! Writes happen only inside a coordinator [`Transaction`]; every write bumps
//! the entity document's version, which is what serializes concurrent ledger
//! operations on the same entity.

use rust_decimal::Decimal;

use stockledger_core::{EntityId, ExpectedVersion, Quantity};
use stockledger_inventory::StockEntity;

use crate::document_store::{
    DocumentPath, DocumentStore, ReadSet, StoreError, Transaction, WriteOp,
};
use crate::error::LedgerError;

/// Outcome of a balance write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BalanceWrite {
    pub stock: Quantity,
    /// Amount the zero floor absorbed (zero when no clamping happened).
    pub clamped: Decimal,
}

pub struct BalanceStore;

impl BalanceStore {
    pub fn path(entity_id: EntityId) -> DocumentPath {
        DocumentPath::root::<StockEntity>(&entity_id)
    }

    /// Create an entity record. Ordinary CRUD, outside the ledger proper.
    pub fn register<S>(store: &S, entity: &StockEntity) -> Result<(), LedgerError>
    where
        S: DocumentStore + ?Sized,
    {
        let path = Self::path(entity.id);
        let data = serde_json::to_value(entity)
            .map_err(|e| LedgerError::Invariant(format!("entity serialization failed: {e}")))?;

        let mut reads = ReadSet::new();
        reads.insert(path.clone(), ExpectedVersion::Missing);

        match store.commit(&reads, vec![WriteOp::Put { path, data }]) {
            Ok(_) => {
                tracing::info!(entity_id = %entity.id, name = %entity.name, "entity registered");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                Err(LedgerError::EntityExists(entity.id))
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Point read outside any transaction.
    pub fn current<S>(store: &S, entity_id: EntityId) -> Result<StockEntity, LedgerError>
    where
        S: DocumentStore + ?Sized,
    {
        let doc = store
            .get(&Self::path(entity_id))?
            .ok_or(LedgerError::EntityNotFound(entity_id))?;
        serde_json::from_value(doc.data)
            .map_err(|e| LedgerError::Invariant(format!("entity {entity_id} is unreadable: {e}")))
    }

    /// Full entity record inside a transaction.
    pub fn load(tx: &mut Transaction<'_>, entity_id: EntityId) -> Result<StockEntity, LedgerError> {
        tx.get_as::<StockEntity>(&Self::path(entity_id))?
            .ok_or(LedgerError::EntityNotFound(entity_id))
    }

    /// Current stock, establishing a read dependency on the entity document.
    pub fn read_for_update(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
    ) -> Result<Quantity, LedgerError> {
        Ok(Self::load(tx, entity_id)?.current_stock())
    }

    /// Set the balance to `requested`, flooring at zero. Any amount the floor
    /// absorbs is added to the entity's clamp adjustment.
    pub fn write(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        requested: Decimal,
    ) -> Result<BalanceWrite, LedgerError> {
        let mut entity = Self::load(tx, entity_id)?;
        let (stock, clamped) = Quantity::ZERO.apply_clamped(requested);

        if !clamped.is_zero() {
            tracing::warn!(
                entity_id = %entity_id,
                requested = %requested,
                absorbed = %clamped,
                "stock clamped at zero; ledger and balance diverge by the absorbed amount"
            );
            entity.record_clamp(clamped);
        }

        entity.rebalance(stock);
        tx.put(&Self::path(entity_id), &entity)?;
        Ok(BalanceWrite { stock, clamped })
    }

    /// Fail with `InsufficientStock` unless `amount` can be deducted.
    pub fn ensure_available(entity: &StockEntity, amount: Decimal) -> Result<(), LedgerError> {
        match entity.current_stock().checked_apply(-amount) {
            Some(_) => Ok(()),
            None => Err(LedgerError::InsufficientStock {
                entity_id: entity.id,
                available: entity.current_stock(),
                requested: amount,
            }),
        }
    }
}
