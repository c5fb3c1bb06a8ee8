//! Production batches: consume N materials and credit one product.
//!
//! On a store with multi-document transactions the whole batch is one
//! coordinator transaction. Otherwise it runs as a saga of independent
//! coordinator operations; when a step fails, the movements already applied
//! are deleted again and the caller gets [`LedgerError::PartialConsumption`].
//!
//! Batch and movement ids are fixed before the first attempt. An attempt that
//! finds its own batch document already stored returns the outcome of the
//! attempt that wrote it.

use stockledger_core::{BatchId, EntityId, MovementId, Quantity, UserId};
use stockledger_events::{AuditKind, AuditRecord};
use stockledger_inventory::{
    BatchInput, Consumption, EntityKind, Movement, ProductionBatch, StockEntity,
};

use crate::audit::AuditSink;
use crate::balance_store::BalanceStore;
use crate::coordinator::{LedgerCoordinator, LedgerOutcome};
use crate::document_store::{DocumentPath, DocumentStore, StoreError, Transaction};
use crate::error::LedgerError;
use crate::movement_store::MovementStore;

/// Result of a recorded batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub batch: ProductionBatch,
    /// One outcome per material, in input order.
    pub consumptions: Vec<LedgerOutcome>,
    pub output: LedgerOutcome,
    /// Whether the batch was committed as a single transaction.
    pub atomic: bool,
}

fn batch_path(batch_id: BatchId) -> DocumentPath {
    DocumentPath::root::<ProductionBatch>(&batch_id)
}

fn consumptions_of(outcomes: &[LedgerOutcome]) -> Vec<Consumption> {
    outcomes
        .iter()
        .map(|o| Consumption {
            entity_id: o.entity_id,
            movement_id: o.movement_id,
        })
        .collect()
}

fn expect_kind(entity: &StockEntity, kind: EntityKind) -> Result<(), LedgerError> {
    if entity.kind != kind {
        return Err(LedgerError::InvalidMovement(format!(
            "{} ({}) is a {}, not a {kind}",
            entity.name, entity.id, entity.kind
        )));
    }
    Ok(())
}

impl<S, A> LedgerCoordinator<S, A>
where
    S: DocumentStore,
    A: AuditSink,
{
    /// Stored batch record. Not transactional.
    pub fn batch(&self, batch_id: BatchId) -> Result<ProductionBatch, LedgerError> {
        let path = batch_path(batch_id);
        let doc = self
            .store()
            .get(&path)?
            .ok_or(LedgerError::BatchNotFound(batch_id))?;
        Ok(serde_json::from_value(doc.data)
            .map_err(|e| StoreError::Serialization(format!("{path}: {e}")))?)
    }

    /// Record a production batch: a `consumed` movement per material, an
    /// increase adjustment on the product and the batch document.
    ///
    /// Material availability is checked up front; any shortfall fails with
    /// `InsufficientStock` before a single deduction is attempted.
    pub fn record_batch(&self, input: &BatchInput, actor: UserId) -> Result<BatchOutcome, LedgerError> {
        input.validate(self.now().date_naive())?;
        self.prevalidate_batch(input)?;

        let outcome = if self.store().supports_multi_document() {
            self.record_batch_atomic(input, actor)?
        } else {
            tracing::debug!(
                reference = %input.reference,
                "store lacks multi-document transactions; recording batch step by step"
            );
            self.record_batch_saga(input, actor)?
        };

        tracing::info!(
            batch_id = %outcome.batch.id,
            reference = %outcome.batch.reference,
            materials = outcome.consumptions.len(),
            atomic = outcome.atomic,
            "production batch recorded"
        );
        self.audit().emit(AuditRecord::new(
            AuditKind::BatchRecorded,
            format!(
                "batch {}: {} produced from {} material(s)",
                outcome.batch.reference,
                outcome.batch.quantity,
                outcome.consumptions.len()
            ),
            actor,
            outcome.batch.id,
            self.now(),
        ));
        Ok(outcome)
    }

    /// Reverse every movement a batch created and remove the batch record.
    ///
    /// Movements that were already deleted individually are skipped.
    pub fn delete_batch(&self, batch_id: BatchId, actor: UserId) -> Result<Vec<LedgerOutcome>, LedgerError> {
        let batch = self.batch(batch_id)?;

        let reversed = if self.store().supports_multi_document() {
            self.delete_batch_atomic(&batch)?
        } else {
            self.delete_batch_saga(&batch, actor)?
        };

        self.audit().emit(AuditRecord::new(
            AuditKind::BatchDeleted,
            format!("batch {}: {} movement(s) reversed", batch.reference, reversed.len()),
            actor,
            batch_id,
            self.now(),
        ));
        Ok(reversed)
    }

    fn prevalidate_batch(&self, input: &BatchInput) -> Result<(), LedgerError> {
        let product = BalanceStore::current(self.store(), input.product_id)?;
        expect_kind(&product, EntityKind::ProducibleGood)?;

        for usage in &input.materials {
            let material = BalanceStore::current(self.store(), usage.material_id)?;
            expect_kind(&material, EntityKind::Material)?;
            BalanceStore::ensure_available(&material, usage.quantity)?;
        }
        Ok(())
    }

    fn record_batch_atomic(&self, input: &BatchInput, actor: UserId) -> Result<BatchOutcome, LedgerError> {
        let now = self.now();
        let batch_id = BatchId::new();
        let output_id = MovementId::new();
        let material_ids: Vec<MovementId> = input.materials.iter().map(|_| MovementId::new()).collect();
        let quantity = Quantity::new(input.quantity)?;

        let path = batch_path(batch_id);
        let mut staged: Option<BatchOutcome> = None;
        let (mut outcome, attempts) = self.transact("record_batch", input.product_id, |tx| {
            if tx.get(&path)?.is_some() {
                let Some(outcome) = &staged else {
                    return Err(LedgerError::Invariant(format!(
                        "batch {batch_id} exists before it was recorded"
                    )));
                };
                tracing::info!(
                    batch_id = %batch_id,
                    reference = %input.reference,
                    "batch already recorded; not applying again"
                );
                return Ok(outcome.clone());
            }

            let mut consumptions = Vec::with_capacity(input.materials.len());
            for (usage, movement_id) in input.materials.iter().zip(&material_ids) {
                // Stock may have moved since prevalidation.
                let material = BalanceStore::load(tx, usage.material_id)?;
                BalanceStore::ensure_available(&material, usage.quantity)?;

                let movement = Movement::record(
                    *movement_id,
                    usage.material_id,
                    &input.consumption(usage),
                    actor,
                    now,
                )?;
                consumptions.push(self.apply_new(tx, &movement)?);
            }

            let movement = Movement::record(output_id, input.product_id, &input.output(), actor, now)?;
            let output = self.apply_new(tx, &movement)?;

            let batch = ProductionBatch {
                id: batch_id,
                product_id: input.product_id,
                quantity,
                produced_on: input.produced_on,
                reference: input.reference.clone(),
                output_movement: output_id,
                consumptions: consumptions_of(&consumptions),
                recorded_by: actor,
                recorded_at: now,
            };
            tx.put(&path, &batch)?;

            let outcome = BatchOutcome {
                batch,
                consumptions,
                output,
                atomic: true,
            };
            staged = Some(outcome.clone());
            Ok(outcome)
        })?;

        outcome.output.attempts = attempts;
        for consumption in &mut outcome.consumptions {
            consumption.attempts = attempts;
        }
        Ok(outcome)
    }

    fn record_batch_saga(&self, input: &BatchInput, actor: UserId) -> Result<BatchOutcome, LedgerError> {
        let mut consumptions: Vec<LedgerOutcome> = Vec::with_capacity(input.materials.len());
        for usage in &input.materials {
            match self.create_movement(usage.material_id, &input.consumption(usage), actor) {
                Ok(outcome) => consumptions.push(outcome),
                Err(cause) => {
                    return Err(self.compensate(input, &consumptions, usage.material_id, cause, actor));
                }
            }
        }

        let output = match self.create_movement(input.product_id, &input.output(), actor) {
            Ok(outcome) => outcome,
            Err(cause) => {
                return Err(self.compensate(input, &consumptions, input.product_id, cause, actor));
            }
        };

        let batch = ProductionBatch {
            id: BatchId::new(),
            product_id: input.product_id,
            quantity: Quantity::new(input.quantity)?,
            produced_on: input.produced_on,
            reference: input.reference.clone(),
            output_movement: output.movement_id,
            consumptions: consumptions_of(&consumptions),
            recorded_by: actor,
            recorded_at: self.now(),
        };

        let stored = self.transact("record_batch", input.product_id, |tx| {
            tx.put(&batch_path(batch.id), &batch)?;
            Ok(())
        });
        if let Err(cause) = stored {
            let mut applied = consumptions;
            applied.push(output);
            return Err(self.compensate(input, &applied, input.product_id, cause, actor));
        }

        Ok(BatchOutcome {
            batch,
            consumptions,
            output,
            atomic: false,
        })
    }

    /// Delete the movements a failed saga already applied, newest first.
    fn compensate(
        &self,
        input: &BatchInput,
        applied: &[LedgerOutcome],
        failed_entity: EntityId,
        cause: LedgerError,
        actor: UserId,
    ) -> LedgerError {
        if applied.is_empty() {
            return cause;
        }

        tracing::warn!(
            reference = %input.reference,
            failed_entity = %failed_entity,
            applied = applied.len(),
            error = %cause,
            "batch step failed; compensating applied movements"
        );

        let mut compensated = true;
        for outcome in applied.iter().rev() {
            if let Err(err) = self.delete_movement(outcome.entity_id, outcome.movement_id, actor) {
                compensated = false;
                tracing::error!(
                    entity_id = %outcome.entity_id,
                    movement_id = %outcome.movement_id,
                    error = %err,
                    "compensation failed; movement left in place"
                );
            }
        }

        LedgerError::PartialConsumption {
            reference: input.reference.clone(),
            applied: applied.iter().map(|o| (o.entity_id, o.movement_id)).collect(),
            failed_entity,
            compensated,
            cause: Box::new(cause),
        }
    }

    fn delete_batch_atomic(&self, batch: &ProductionBatch) -> Result<Vec<LedgerOutcome>, LedgerError> {
        let path = batch_path(batch.id);

        let mut staged: Option<Vec<LedgerOutcome>> = None;
        let (mut reversed, attempts) = self.transact("delete_batch", batch.product_id, |tx| {
            let Some(current) = tx.get_as::<ProductionBatch>(&path)? else {
                if let Some(reversed) = &staged {
                    if self.balances_match(tx, reversed)? {
                        tracing::info!(batch_id = %batch.id, "batch already deleted; not reversing again");
                        return Ok(reversed.clone());
                    }
                }
                return Err(LedgerError::BatchNotFound(batch.id));
            };

            let mut reversed = Vec::new();
            for owned in current.movements() {
                let Some(movement) = MovementStore::find(tx, owned.entity_id, owned.movement_id)? else {
                    tracing::warn!(
                        batch_id = %current.id,
                        movement_id = %owned.movement_id,
                        "batch movement already deleted; skipping"
                    );
                    continue;
                };
                reversed.push(self.reverse_existing(tx, &movement)?);
            }
            tx.delete(&path);
            staged = Some(reversed.clone());
            Ok(reversed)
        })?;

        for outcome in &mut reversed {
            outcome.attempts = attempts;
        }
        Ok(reversed)
    }

    fn delete_batch_saga(&self, batch: &ProductionBatch, actor: UserId) -> Result<Vec<LedgerOutcome>, LedgerError> {
        let partial = |reversed: &[LedgerOutcome], failed_entity: EntityId, cause: LedgerError| {
            LedgerError::PartialConsumption {
                reference: batch.reference.clone(),
                applied: reversed.iter().map(|o| (o.entity_id, o.movement_id)).collect(),
                failed_entity,
                compensated: false,
                cause: Box::new(cause),
            }
        };

        let mut reversed = Vec::new();
        for owned in batch.movements() {
            match self.delete_movement(owned.entity_id, owned.movement_id, actor) {
                Ok(outcome) => reversed.push(outcome),
                Err(LedgerError::MovementNotFound { movement_id, .. }) => {
                    tracing::warn!(
                        batch_id = %batch.id,
                        movement_id = %movement_id,
                        "batch movement already deleted; skipping"
                    );
                }
                Err(cause) => return Err(partial(&reversed, owned.entity_id, cause)),
            }
        }

        let path = batch_path(batch.id);
        let mut seen = false;
        let removed = self.transact("delete_batch", batch.product_id, |tx| {
            if tx.get(&path)?.is_none() {
                // Gone after an earlier attempt saw it: that attempt committed.
                return if seen { Ok(()) } else { Err(LedgerError::BatchNotFound(batch.id)) };
            }
            seen = true;
            tx.delete(&path);
            Ok(())
        });
        match removed {
            Ok(_) => Ok(reversed),
            Err(cause) => Err(partial(&reversed, batch.product_id, cause)),
        }
    }

    /// Whether every balance in `outcomes` still reads as the outcome left it.
    fn balances_match(&self, tx: &mut Transaction<'_>, outcomes: &[LedgerOutcome]) -> Result<bool, LedgerError> {
        for outcome in outcomes {
            if BalanceStore::read_for_update(tx, outcome.entity_id)? != outcome.new_stock {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record `movement` and apply its effect inside `tx`.
    fn apply_new(&self, tx: &mut Transaction<'_>, movement: &Movement) -> Result<LedgerOutcome, LedgerError> {
        let previous = BalanceStore::read_for_update(tx, movement.entity_id)?;
        let delta = movement.effect()?;
        let written = self.write_balance(tx, movement.entity_id, previous, delta)?;
        MovementStore::create(tx, movement.entity_id, movement)?;
        Ok(LedgerOutcome::applied(movement.entity_id, movement.id, previous, delta, written))
    }

    /// Delete `movement` and reverse its effect inside `tx`.
    fn reverse_existing(&self, tx: &mut Transaction<'_>, movement: &Movement) -> Result<LedgerOutcome, LedgerError> {
        let previous = BalanceStore::read_for_update(tx, movement.entity_id)?;
        let delta = movement.reversal()?;
        let written = self.write_balance(tx, movement.entity_id, previous, delta)?;
        MovementStore::delete(tx, movement.entity_id, movement.id)?;
        Ok(LedgerOutcome::applied(movement.entity_id, movement.id, previous, delta, written))
    }
}
