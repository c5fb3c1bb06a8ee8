//! Domain error model.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic failure of a domain rule. Retrying the same input yields the
/// same error; storage and transaction failures live in the infrastructure
/// layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input (non-positive quantity, missing or stray direction,
    /// future date, blank label).
    #[error("invalid input: {0}")]
    Validation(String),

    /// A stock amount below zero.
    #[error("quantity cannot be negative (got {0})")]
    NegativeQuantity(Decimal),

    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}
