//! Transactional document store boundary.
//!
//! This module defines the storage primitive the ledger runs on: point reads,
//! collection listing, and an atomic validate-and-apply commit that detects
//! concurrent writers through per-document versions.

pub mod in_memory;
pub mod r#trait;
pub mod transaction;

pub use in_memory::InMemoryDocumentStore;
pub use r#trait::{
    CommitReceipt, DocumentPath, DocumentStore, ReadSet, StoreError, VersionedDocument, WriteOp,
};
pub use transaction::Transaction;
