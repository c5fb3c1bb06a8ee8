//! Ledger transaction coordinator.
//!
//! The coordinator is the only writer of an entity's `current_stock`. Every
//! mutating operation runs the same pipeline:
//!
//! ```text
//! request
//!   ↓
//! 1. Validate input (no I/O)
//!   ↓
//! 2. Begin transaction; read the balance (read dependency on the entity)
//!   ↓
//! 3. Read the prior movement, if any; resolve old and new effects
//!   ↓
//! 4. Write the new balance and the movement in the same transaction
//!   ↓
//! 5. Commit; on conflict or timeout go back to 2 (bounded, linear backoff)
//!   ↓
//! 6. Emit an audit record (best effort, outside the transaction)
//! ```
//!
//! Movement ids are assigned once per request, before the first attempt, so a
//! retried create applies at most once. An attempt whose commit landed but was
//! reported as failed is recognised on the next attempt and not applied again;
//! the caller gets the outcome of the attempt that committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use stockledger_core::{EntityId, MovementId, Quantity, UserId};
use stockledger_events::{AuditKind, AuditRecord};
use stockledger_inventory::{Movement, MovementInput};

use crate::audit::{AuditEmitter, AuditSink};
use crate::balance_store::{BalanceStore, BalanceWrite};
use crate::clock::{Clock, SystemClock};
use crate::config::{LedgerConfig, NegativeStockPolicy};
use crate::document_store::{DocumentStore, Transaction};
use crate::error::LedgerError;
use crate::movement_store::MovementStore;

/// Result of a committed ledger operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerOutcome {
    pub entity_id: EntityId,
    pub movement_id: MovementId,
    pub previous_stock: Quantity,
    pub new_stock: Quantity,
    /// Net signed change requested by the operation, before clamping.
    pub delta: Decimal,
    /// Amount the zero floor absorbed.
    pub clamped: Decimal,
    /// Transaction attempts used, including the successful one.
    pub attempts: u32,
}

impl LedgerOutcome {
    pub(crate) fn applied(
        entity_id: EntityId,
        movement_id: MovementId,
        previous_stock: Quantity,
        delta: Decimal,
        written: BalanceWrite,
    ) -> Self {
        Self {
            entity_id,
            movement_id,
            previous_stock,
            new_stock: written.stock,
            delta,
            clamped: written.clamped,
            attempts: 0,
        }
    }

    pub fn was_clamped(&self) -> bool {
        !self.clamped.is_zero()
    }
}

/// Runs create/edit/delete requests as single optimistic transactions over a
/// [`DocumentStore`].
///
/// ## Error semantics
///
/// - malformed input → `InvalidMovement`, before any store access
/// - missing entity or movement → `EntityNotFound` / `MovementNotFound`, no writes
/// - conflicts that survive `max_attempts` → `Conflict`
/// - timeouts and backend failures that survive `max_attempts` → `Unavailable`
/// - `NegativeStockPolicy::Reject` and a deduction below zero → `InsufficientStock`
///
/// Audit emission happens after the commit and never changes the result.
pub struct LedgerCoordinator<S, A> {
    store: S,
    audit: AuditEmitter<A>,
    clock: Arc<dyn Clock>,
    config: LedgerConfig,
}

impl<S, A> LedgerCoordinator<S, A>
where
    S: DocumentStore,
    A: AuditSink,
{
    pub fn new(store: S, audit: A, config: LedgerConfig) -> Self {
        Self {
            store,
            audit: AuditEmitter::new(audit),
            clock: Arc::new(SystemClock::new()),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditEmitter<A> {
        &self.audit
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Cached balance of an entity. Not transactional.
    pub fn current_stock(&self, entity_id: EntityId) -> Result<Quantity, LedgerError> {
        Ok(BalanceStore::current(&self.store, entity_id)?.current_stock())
    }

    /// Record a new movement and apply its effect.
    pub fn create_movement(
        &self,
        entity_id: EntityId,
        input: &MovementInput,
        actor: UserId,
    ) -> Result<LedgerOutcome, LedgerError> {
        let now = self.now();
        input.validate(now.date_naive())?;
        let delta = input.effect()?;
        let movement_id = MovementId::new();
        let movement = Movement::record(movement_id, entity_id, input, actor, now)?;

        let mut staged: Option<LedgerOutcome> = None;
        let (outcome, attempts) = self.transact("create_movement", entity_id, |tx| {
            let previous = BalanceStore::read_for_update(tx, entity_id)?;
            if MovementStore::find(tx, entity_id, movement_id)?.is_some() {
                // An earlier attempt committed before reporting failure.
                tracing::info!(
                    entity_id = %entity_id,
                    movement_id = %movement_id,
                    "movement already recorded; not applying again"
                );
                return Ok(staged.clone().unwrap_or_else(|| {
                    LedgerOutcome::applied(
                        entity_id,
                        movement_id,
                        previous,
                        delta,
                        BalanceWrite { stock: previous, clamped: Decimal::ZERO },
                    )
                }));
            }

            let written = self.write_balance(tx, entity_id, previous, delta)?;
            MovementStore::create(tx, entity_id, &movement)?;
            let outcome = LedgerOutcome::applied(entity_id, movement_id, previous, delta, written);
            staged = Some(outcome.clone());
            Ok(outcome)
        })?;

        self.audit.emit(AuditRecord::new(
            AuditKind::MovementCreated,
            movement.describe(),
            actor,
            movement_id,
            self.now(),
        ));
        Ok(LedgerOutcome { attempts, ..outcome })
    }

    /// Replace a movement's editable fields, swapping its old effect for the
    /// new one in a single balance write.
    ///
    /// A retry that finds the stored movement already equal to this revision,
    /// with the balance where that revision left it, applies nothing.
    pub fn edit_movement(
        &self,
        entity_id: EntityId,
        movement_id: MovementId,
        input: &MovementInput,
        actor: UserId,
    ) -> Result<LedgerOutcome, LedgerError> {
        let now = self.now();
        input.validate(now.date_naive())?;
        let new_effect = input.effect()?;

        let mut staged: Option<(LedgerOutcome, Movement)> = None;
        let ((outcome, revised), attempts) = self.transact("edit_movement", entity_id, |tx| {
            let previous = BalanceStore::read_for_update(tx, entity_id)?;
            let old = MovementStore::get(tx, entity_id, movement_id)?;
            if let Some((outcome, revised)) = &staged {
                if old == *revised && previous == outcome.new_stock {
                    tracing::info!(
                        entity_id = %entity_id,
                        movement_id = %movement_id,
                        "movement revision already applied; not applying again"
                    );
                    return Ok((outcome.clone(), revised.clone()));
                }
            }
            let revised = old.revise(input, actor, now)?;

            let delta = new_effect - old.effect()?;
            let written = self.write_balance(tx, entity_id, previous, delta)?;
            MovementStore::replace(tx, entity_id, movement_id, &revised)?;
            let outcome = LedgerOutcome::applied(entity_id, movement_id, previous, delta, written);
            staged = Some((outcome.clone(), revised.clone()));
            Ok((outcome, revised))
        })?;

        self.audit.emit(AuditRecord::new(
            AuditKind::MovementUpdated,
            revised.describe(),
            actor,
            movement_id,
            self.now(),
        ));
        Ok(LedgerOutcome { attempts, ..outcome })
    }

    /// Remove a movement and reverse its effect.
    ///
    /// A retry that finds the movement gone and the balance exactly where the
    /// reversal left it treats the delete as applied. `MovementNotFound` means
    /// this request never saw the movement.
    pub fn delete_movement(
        &self,
        entity_id: EntityId,
        movement_id: MovementId,
        actor: UserId,
    ) -> Result<LedgerOutcome, LedgerError> {
        let mut staged: Option<(LedgerOutcome, Movement)> = None;
        let ((outcome, removed), attempts) = self.transact("delete_movement", entity_id, |tx| {
            let previous = BalanceStore::read_for_update(tx, entity_id)?;
            let Some(old) = MovementStore::find(tx, entity_id, movement_id)? else {
                if let Some((outcome, removed)) = &staged {
                    if previous == outcome.new_stock {
                        tracing::info!(
                            entity_id = %entity_id,
                            movement_id = %movement_id,
                            "movement already deleted; not reversing again"
                        );
                        return Ok((outcome.clone(), removed.clone()));
                    }
                }
                return Err(LedgerError::MovementNotFound { entity_id, movement_id });
            };

            let delta = old.reversal()?;
            let written = self.write_balance(tx, entity_id, previous, delta)?;
            MovementStore::delete(tx, entity_id, movement_id)?;
            let outcome = LedgerOutcome::applied(entity_id, movement_id, previous, delta, written);
            staged = Some((outcome.clone(), old.clone()));
            Ok((outcome, old))
        })?;

        self.audit.emit(AuditRecord::new(
            AuditKind::MovementDeleted,
            removed.describe(),
            actor,
            movement_id,
            self.now(),
        ));
        Ok(LedgerOutcome { attempts, ..outcome })
    }

    /// Record a `consumed` movement against a material on behalf of a
    /// production batch.
    pub fn consume_for_production(
        &self,
        entity_id: EntityId,
        quantity: Decimal,
        batch_reference: &str,
        actor: UserId,
    ) -> Result<LedgerOutcome, LedgerError> {
        let input = MovementInput::consumed(quantity, self.now().date_naive(), batch_reference);
        self.create_movement(entity_id, &input, actor)
    }

    /// Apply `delta` to a balance already read in `tx`, honouring the
    /// negative-stock policy. A rejected edit reports the net deduction, not
    /// the quantity on the revised movement.
    pub(crate) fn write_balance(
        &self,
        tx: &mut Transaction<'_>,
        entity_id: EntityId,
        previous: Quantity,
        delta: Decimal,
    ) -> Result<BalanceWrite, LedgerError> {
        if self.config.negative_stock == NegativeStockPolicy::Reject
            && previous.checked_apply(delta).is_none()
        {
            return Err(LedgerError::InsufficientStock {
                entity_id,
                available: previous,
                requested: -delta,
            });
        }
        BalanceStore::write(tx, entity_id, previous.value() + delta)
    }

    /// Run `body` in a fresh transaction and commit it, retrying the whole
    /// attempt on conflicts and timeouts. Returns the body's value and the
    /// number of attempts used.
    pub(crate) fn transact<T>(
        &self,
        operation: &'static str,
        entity_id: EntityId,
        mut body: impl FnMut(&mut Transaction<'_>) -> Result<T, LedgerError>,
    ) -> Result<(T, u32), LedgerError> {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tracing::debug!(operation, entity_id = %entity_id, attempt, "ledger transaction attempt");

            let mut tx = Transaction::begin(&self.store, self.config.attempt_timeout);
            let result = body(&mut tx).and_then(|value| {
                let receipt = tx.commit()?;
                Ok((value, receipt))
            });

            match result {
                Ok((value, receipt)) => {
                    tracing::info!(
                        operation,
                        entity_id = %entity_id,
                        attempt,
                        sequence = receipt.sequence,
                        writes = receipt.writes,
                        "ledger transaction committed"
                    );
                    return Ok((value, attempt));
                }
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        operation,
                        entity_id = %entity_id,
                        attempt,
                        error = %err,
                        "ledger transaction failed; retrying"
                    );
                    let backoff = self.config.retry_backoff * attempt;
                    if !backoff.is_zero() {
                        std::thread::sleep(backoff);
                    }
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            operation,
                            entity_id = %entity_id,
                            attempts = attempt,
                            error = %err,
                            "ledger transaction retries exhausted"
                        );
                    }
                    return Err(err.with_attempts(attempt));
                }
            }
        }
    }
}

impl<S, A> core::fmt::Debug for LedgerCoordinator<S, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LedgerCoordinator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use rust_decimal_macros::dec;
    use stockledger_inventory::{EntityKind, StockEntity};

    use crate::audit::NoopAuditSink;
    use crate::clock::FixedClock;
    use crate::document_store::InMemoryDocumentStore;

    fn coordinator(config: LedgerConfig) -> LedgerCoordinator<InMemoryDocumentStore, NoopAuditSink> {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        LedgerCoordinator::new(InMemoryDocumentStore::new(), NoopAuditSink, config)
            .with_clock(Arc::new(clock))
    }

    fn register(ledger: &LedgerCoordinator<InMemoryDocumentStore, NoopAuditSink>, stock: Decimal) -> EntityId {
        let entity = StockEntity::new(
            EntityId::new(),
            EntityKind::Material,
            "Sugar",
            "kg",
            Quantity::new(stock).unwrap(),
        )
        .unwrap();
        BalanceStore::register(ledger.store(), &entity).unwrap();
        entity.id
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 27).unwrap()
    }

    #[test]
    fn create_reports_previous_and_new_stock() {
        let ledger = coordinator(LedgerConfig::default());
        let id = register(&ledger, dec!(10));

        let outcome = ledger
            .create_movement(id, &MovementInput::purchase(dec!(2.5), day(), "ACME"), UserId::new())
            .unwrap();

        assert_eq!(outcome.previous_stock, Quantity::new(dec!(10)).unwrap());
        assert_eq!(outcome.new_stock, Quantity::new(dec!(12.5)).unwrap());
        assert_eq!(outcome.delta, dec!(2.5));
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.was_clamped());
    }

    #[test]
    fn movement_dated_after_server_clock_is_invalid() {
        let ledger = coordinator(LedgerConfig::default());
        let id = register(&ledger, dec!(10));
        let tomorrow = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let err = ledger
            .create_movement(id, &MovementInput::purchase(dec!(1), tomorrow, "ACME"), UserId::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidMovement(_)));
    }

    #[test]
    fn reject_policy_refuses_to_go_negative() {
        let ledger = coordinator(LedgerConfig::default().with_negative_stock(NegativeStockPolicy::Reject));
        let id = register(&ledger, dec!(1));

        let err = ledger
            .create_movement(id, &MovementInput::wastage(dec!(3), day(), "spill"), UserId::new())
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::InsufficientStock { requested, .. } if requested == dec!(3)
        ));
        assert_eq!(ledger.current_stock(id).unwrap(), Quantity::new(dec!(1)).unwrap());
    }

    #[test]
    fn consume_for_production_records_consumed_movement() {
        let ledger = coordinator(LedgerConfig::default());
        let id = register(&ledger, dec!(8));

        let outcome = ledger
            .consume_for_production(id, dec!(3), "BATCH-7", UserId::new())
            .unwrap();

        assert_eq!(outcome.new_stock, Quantity::new(dec!(5)).unwrap());
        let movements = MovementStore::list(ledger.store(), id).unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].reference, "BATCH-7");
        assert_eq!(movements[0].movement_type, stockledger_inventory::MovementType::Consumed);
    }
}
