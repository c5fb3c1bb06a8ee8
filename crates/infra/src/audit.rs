//! Best-effort audit emission.
//!
//! Audit records are written after a ledger transaction commits. A failing
//! sink is logged and ignored; it never turns a committed operation into an
//! error.

use thiserror::Error;

use stockledger_events::{AuditRecord, Event, EventBus};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink rejected record: {0}")]
    Rejected(String),
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Publishes audit records on an [`EventBus`].
#[derive(Debug)]
pub struct BusAuditSink<B> {
    bus: B,
}

impl<B> BusAuditSink<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B> AuditSink for BusAuditSink<B>
where
    B: EventBus<AuditRecord>,
{
    fn record(&self, record: AuditRecord) -> Result<(), AuditError> {
        self.bus
            .publish(record)
            .map_err(|e| AuditError::Rejected(format!("{e:?}")))
    }
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Wraps a sink and swallows its failures.
#[derive(Debug)]
pub struct AuditEmitter<A> {
    sink: A,
}

impl<A: AuditSink> AuditEmitter<A> {
    pub fn new(sink: A) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &A {
        &self.sink
    }

    /// Hand the record to the sink. Never fails.
    pub fn emit(&self, record: AuditRecord) {
        let event_type = record.event_type();
        let target_id = record.target_id.clone();
        match self.sink.record(record) {
            Ok(()) => tracing::debug!(event_type, target_id = %target_id, "audit record emitted"),
            Err(err) => tracing::warn!(
                event_type,
                target_id = %target_id,
                error = %err,
                "audit emission failed; continuing"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;
    use stockledger_core::UserId;
    use stockledger_events::{AuditKind, InMemoryEventBus};

    struct RefusingSink;

    impl AuditSink for RefusingSink {
        fn record(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::Rejected("disk full".into()))
        }
    }

    fn record() -> AuditRecord {
        AuditRecord::new(AuditKind::MovementCreated, "purchase 5", UserId::new(), "m-1", Utc::now())
    }

    #[test]
    fn bus_sink_publishes_to_subscribers() {
        let bus = Arc::new(InMemoryEventBus::<AuditRecord>::new());
        let sub = bus.subscribe();
        let emitter = AuditEmitter::new(BusAuditSink::new(bus.clone()));

        emitter.emit(record());

        let received = sub.drain();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].target_id, "m-1");
    }

    #[test]
    fn failing_sink_does_not_panic_or_propagate() {
        let emitter = AuditEmitter::new(RefusingSink);
        emitter.emit(record());
    }
}
