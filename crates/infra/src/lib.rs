//! Infrastructure layer: document store, ledger stores, transaction
//! coordinator, audit emission and configuration.

pub mod audit;
pub mod balance_store;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod document_store;
pub mod error;
pub mod movement_store;
pub mod production;
pub mod reconcile;


pub use audit::{AuditEmitter, AuditError, AuditSink, BusAuditSink, NoopAuditSink};
pub use balance_store::{BalanceStore, BalanceWrite};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{LedgerConfig, NegativeStockPolicy};
pub use coordinator::{LedgerCoordinator, LedgerOutcome};
pub use document_store::{DocumentStore, InMemoryDocumentStore, StoreError, Transaction};
pub use error::LedgerError;
pub use movement_store::MovementStore;
pub use production::BatchOutcome;
pub use reconcile::Reconciliation;
