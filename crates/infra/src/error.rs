//! Errors surfaced by ledger operations.

use rust_decimal::Decimal;
use thiserror::Error;

use stockledger_core::{BatchId, DomainError, EntityId, MovementId, Quantity};

use crate::document_store::StoreError;

/// Ledger operation error.
///
/// Every variant leaves the balance and the movement log mutually consistent:
/// a failed operation never leaves partial writes behind, except
/// [`LedgerError::PartialConsumption`], which reports exactly what was applied.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Bad input shape; rejected before any I/O.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("entity already exists: {0}")]
    EntityExists(EntityId),

    #[error("movement not found: {entity_id}/{movement_id}")]
    MovementNotFound {
        entity_id: EntityId,
        movement_id: MovementId,
    },

    #[error("production batch not found: {0}")]
    BatchNotFound(BatchId),

    /// Optimistic-transaction collision that survived every retry.
    #[error("conflict after {attempts} attempt(s): {reason}")]
    Conflict { attempts: u32, reason: String },

    /// Timeout or backend failure that survived every retry.
    #[error("store unavailable after {attempts} attempt(s): {reason}")]
    Unavailable { attempts: u32, reason: String },

    #[error("insufficient stock for {entity_id}: {available} available, {requested} requested")]
    InsufficientStock {
        entity_id: EntityId,
        available: Quantity,
        /// Net amount the operation would deduct. For an edit this is
        /// `old effect - new effect`, not the quantity on the revised movement.
        requested: Decimal,
    },

    /// A multi-material consumption stopped part-way on a backend without
    /// cross-entity transactions.
    #[error(
        "partial consumption for batch '{reference}': {} applied before {failed_entity} failed (compensated: {compensated}): {cause}",
        applied.len()
    )]
    PartialConsumption {
        reference: String,
        applied: Vec<(EntityId, MovementId)>,
        failed_entity: EntityId,
        compensated: bool,
        cause: Box<LedgerError>,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),

    /// Non-transient store failure (serialization, bad path, unsupported).
    #[error(transparent)]
    Store(StoreError),
}

impl LedgerError {
    /// Whether the coordinator may retry the whole transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Conflict { .. } | LedgerError::Unavailable { .. })
    }

    pub(crate) fn with_attempts(self, attempts: u32) -> Self {
        match self {
            LedgerError::Conflict { reason, .. } => LedgerError::Conflict { attempts, reason },
            LedgerError::Unavailable { reason, .. } => LedgerError::Unavailable { attempts, reason },
            other => other,
        }
    }
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        if !value.is_transient() {
            return LedgerError::Store(value);
        }
        let reason = value.to_string();
        match value {
            StoreError::Conflict { .. } => LedgerError::Conflict { attempts: 1, reason },
            _ => LedgerError::Unavailable { attempts: 1, reason },
        }
    }
}

impl From<DomainError> for LedgerError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                LedgerError::InvalidMovement(msg)
            }
            other @ DomainError::NegativeQuantity(_) => LedgerError::InvalidMovement(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockledger_core::ExpectedVersion;

    use crate::document_store::DocumentPath;

    #[test]
    fn transient_store_errors_are_retryable() {
        let conflict = StoreError::Conflict {
            path: DocumentPath::new("entities/a").unwrap(),
            expected: ExpectedVersion::Exact(1),
            actual: Some(2),
        };
        assert!(LedgerError::from(conflict).is_retryable());
        assert!(LedgerError::from(StoreError::Timeout("t".into())).is_retryable());
        assert!(!LedgerError::from(StoreError::Serialization("s".into())).is_retryable());
    }

    #[test]
    fn store_errors_keep_their_retry_classification() {
        let errors = [
            StoreError::Timeout("t".into()),
            StoreError::Unavailable("u".into()),
            StoreError::Serialization("s".into()),
        ];
        for err in errors {
            let transient = err.is_transient();
            assert_eq!(LedgerError::from(err).is_retryable(), transient);
        }
    }

    #[test]
    fn with_attempts_rewrites_only_retryable_errors() {
        let err = LedgerError::from(StoreError::Unavailable("down".into())).with_attempts(5);
        assert!(matches!(err, LedgerError::Unavailable { attempts: 5, .. }));

        let id = EntityId::new();
        let err = LedgerError::EntityNotFound(id).with_attempts(5);
        assert!(matches!(err, LedgerError::EntityNotFound(e) if e == id));
    }

    #[test]
    fn validation_maps_to_invalid_movement() {
        let err: LedgerError = DomainError::validation("quantity must be positive").into();
        assert!(matches!(err, LedgerError::InvalidMovement(_)));
    }
}
