//! Ledger events and the fan-out bus that carries them.
//!
//! The ledger publishes an [`AuditRecord`] after every committed mutation.
//! Delivery is best-effort: nothing here can fail a ledger transaction.

pub mod audit;
pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use audit::{AuditKind, AuditRecord};
pub use bus::{EventBus, Subscription};
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
