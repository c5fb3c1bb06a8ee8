//! Movement store: movement documents nested under their owning entity.
//!
//! Layout: `entities/{entity_id}/movements/{movement_id}`. All mutating
//! operations act on a caller-supplied [`Transaction`] and never commit.

use stockledger_core::{EntityId, MovementId};
use stockledger_inventory::{Movement, StockEntity};

use crate::document_store::{DocumentPath, DocumentStore, StoreError, Transaction};
use crate::error::LedgerError;

pub struct MovementStore;

impl MovementStore {
    pub fn path(entity_id: EntityId, movement_id: MovementId) -> DocumentPath {
        DocumentPath::root::<StockEntity>(&entity_id).child::<Movement>(&movement_id)
    }

    pub fn collection(entity_id: EntityId) -> DocumentPath {
        DocumentPath::root::<StockEntity>(&entity_id).collection::<Movement>()
    }

    /// Append a new movement. Fails if a movement with the same id exists.
    pub fn create(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        movement: &Movement,
    ) -> Result<MovementId, LedgerError> {
        if movement.entity_id != entity_id {
            return Err(LedgerError::Invariant(format!(
                "movement {} belongs to {}, not {entity_id}",
                movement.id, movement.entity_id
            )));
        }
        let path = Self::path(entity_id, movement.id);
        if Self::find(tx, entity_id, movement.id)?.is_some() {
            return Err(LedgerError::Invariant(format!(
                "movement {} already exists",
                movement.id
            )));
        }
        tx.put(&path, movement)?;
        Ok(movement.id)
    }

    pub fn find(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        movement_id: MovementId,
    ) -> Result<Option<Movement>, LedgerError> {
        Ok(tx.get_as::<Movement>(&Self::path(entity_id, movement_id))?)
    }

    pub fn get(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        movement_id: MovementId,
    ) -> Result<Movement, LedgerError> {
        Self::find(tx, entity_id, movement_id)?.ok_or(LedgerError::MovementNotFound {
            entity_id,
            movement_id,
        })
    }

    /// Overwrite an existing movement in place.
    pub fn replace(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        movement_id: MovementId,
        movement: &Movement,
    ) -> Result<(), LedgerError> {
        if movement.id != movement_id || movement.entity_id != entity_id {
            return Err(LedgerError::Invariant(
                "replacement must keep the movement's identity".to_string(),
            ));
        }
        // Establishes the read dependency and the existence check.
        Self::get(tx, entity_id, movement_id)?;
        tx.put(&Self::path(entity_id, movement_id), movement)?;
        Ok(())
    }

    pub fn delete(
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        movement_id: MovementId,
    ) -> Result<(), LedgerError> {
        Self::get(tx, entity_id, movement_id)?;
        tx.delete(&Self::path(entity_id, movement_id));
        Ok(())
    }

    /// Live movements of an entity, oldest first (by `occurred_on`, then
    /// `created_at`). Outside any transaction.
    pub fn list<S>(store: &S, entity_id: EntityId) -> Result<Vec<Movement>, LedgerError>
    where
        S: DocumentStore + ?Sized,
    {
        let mut movements = store
            .list(&Self::collection(entity_id))?
            .into_iter()
            .map(|doc| {
                serde_json::from_value::<Movement>(doc.data)
                    .map_err(|e| StoreError::Serialization(format!("{}: {e}", doc.path)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        movements.sort_by(|a, b| {
            (a.occurred_on, a.created_at, a.id).cmp(&(b.occurred_on, b.created_at, b.id))
        });
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use stockledger_core::UserId;
    use stockledger_inventory::MovementInput;

    use crate::document_store::InMemoryDocumentStore;

    fn movement(entity_id: EntityId, day: u32) -> Movement {
        let input = MovementInput::purchase(
            dec!(5),
            NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            "ACME",
        );
        Movement::record(MovementId::new(), entity_id, &input, UserId::new(), Utc::now()).unwrap()
    }

    fn commit(store: &InMemoryDocumentStore, f: impl FnOnce(&mut Transaction<'_>)) {
        let mut tx = Transaction::begin(store, Duration::from_secs(5));
        f(&mut tx);
        tx.commit().unwrap();
    }

    #[test]
    fn create_get_replace_delete() {
        let store = InMemoryDocumentStore::new();
        let entity_id = EntityId::new();
        let m = movement(entity_id, 1);

        commit(&store, |tx| {
            MovementStore::create(tx, entity_id, &m).unwrap();
        });

        let mut tx = Transaction::begin(&store, Duration::from_secs(5));
        assert_eq!(MovementStore::get(&mut tx, entity_id, m.id).unwrap(), m);
        drop(tx);

        let mut revised = m.clone();
        revised.reference = "Other supplier".into();
        commit(&store, |tx| MovementStore::replace(tx, entity_id, m.id, &revised).unwrap());
        assert_eq!(MovementStore::list(&store, entity_id).unwrap(), vec![revised]);

        commit(&store, |tx| MovementStore::delete(tx, entity_id, m.id).unwrap());
        assert!(MovementStore::list(&store, entity_id).unwrap().is_empty());
    }

    #[test]
    fn missing_movement_is_reported() {
        let store = InMemoryDocumentStore::new();
        let mut tx = Transaction::begin(&store, Duration::from_secs(5));
        let err = MovementStore::delete(&mut tx, EntityId::new(), MovementId::new()).unwrap_err();
        assert!(matches!(err, LedgerError::MovementNotFound { .. }));
    }

    #[test]
    fn duplicate_create_is_rejected() {
        let store = InMemoryDocumentStore::new();
        let entity_id = EntityId::new();
        let m = movement(entity_id, 1);
        commit(&store, |tx| {
            MovementStore::create(tx, entity_id, &m).unwrap();
        });

        let mut tx = Transaction::begin(&store, Duration::from_secs(5));
        assert!(MovementStore::create(&mut tx, entity_id, &m).is_err());
    }

    #[test]
    fn list_orders_by_occurrence_date() {
        let store = InMemoryDocumentStore::new();
        let entity_id = EntityId::new();
        let late = movement(entity_id, 20);
        let early = movement(entity_id, 2);
        commit(&store, |tx| {
            MovementStore::create(tx, entity_id, &late).unwrap();
            MovementStore::create(tx, entity_id, &early).unwrap();
        });

        let listed = MovementStore::list(&store, entity_id).unwrap();
        assert_eq!(listed, vec![early, late]);
    }
}
