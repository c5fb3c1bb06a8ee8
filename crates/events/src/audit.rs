//! Activity records describing who changed what in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::UserId;

use crate::event::Event;

/// What kind of ledger activity an [`AuditRecord`] describes.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    MovementCreated,
    MovementUpdated,
    MovementDeleted,
    BatchRecorded,
    BatchDeleted,
}

/// Fire-and-forget activity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    #[serde(rename = "type")]
    pub kind: AuditKind,
    pub description: String,
    pub performed_by: UserId,
    /// Id of the movement or batch the activity touched.
    pub target_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        kind: AuditKind,
        description: impl Into<String>,
        performed_by: UserId,
        target_id: impl ToString,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            description: description.into(),
            performed_by,
            target_id: target_id.to_string(),
            timestamp,
        }
    }
}

impl Event for AuditRecord {
    fn event_type(&self) -> &'static str {
        match self.kind {
            AuditKind::MovementCreated => "ledger.movement.created",
            AuditKind::MovementUpdated => "ledger.movement.updated",
            AuditKind::MovementDeleted => "ledger.movement.deleted",
            AuditKind::BatchRecorded => "ledger.batch.recorded",
            AuditKind::BatchDeleted => "ledger.batch.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_kind_under_type_key() {
        let record = AuditRecord::new(
            AuditKind::MovementDeleted,
            "deleted purchase of 5 kg",
            UserId::new(),
            "abc",
            Utc::now(),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "movement_deleted");
        assert_eq!(json["target_id"], "abc");
        assert_eq!(record.event_type(), "ledger.movement.deleted");
    }
}
