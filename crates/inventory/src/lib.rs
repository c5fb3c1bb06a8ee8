//! Stock ledger domain module.
//!
//! This crate contains the business rules for stock movements, implemented
//! purely as deterministic domain logic (no IO, no storage, no clock).

pub mod batch;
pub mod effect;
pub mod item;
pub mod movement;

pub use batch::{BatchInput, Consumption, MaterialUsage, ProductionBatch};
pub use effect::{effect, reversal, sign};
pub use item::{EntityKind, StockEntity};
pub use movement::{Direction, Movement, MovementInput, MovementType};
