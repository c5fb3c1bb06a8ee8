use chrono::{DateTime, Utc};

/// A fact the ledger reports after it happened.
///
/// Events are immutable and carry a stable type name so downstream sinks can
/// route or filter them without deserializing the payload.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name/type identifier (e.g. "ledger.movement.created").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// Server time at which the event was recorded.
    fn occurred_at(&self) -> DateTime<Utc>;
}
