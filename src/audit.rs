//! Append-only audit trail (spec §3 "AuditRecord").
//!
//! Every state transition on `EquipmentContext`, `DowntimeEvent` and
//! `AndonEvent`, plus every outbound broadcast, is recorded here. Grounded
//! on the teacher's `storage/persistence.rs` `PersistenceLayer` trait: a
//! narrow append/query surface backed by whichever `storage::Store`
//! implementation is wired in, rather than a bespoke audit table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub entity: String,
    pub entity_id: String,
    pub when: DateTime<Utc>,
    pub who: Option<String>,
    pub what: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

impl AuditRecord {
    pub fn new(entity: &str, entity_id: impl Into<String>, who: Option<String>, what: impl Into<String>) -> Self {
        Self {
            entity: entity.to_string(),
            entity_id: entity_id.into(),
            when: Utc::now(),
            who,
            what: what.into(),
            before: None,
            after: None,
        }
    }

    pub fn with_before(mut self, before: impl Serialize) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    pub fn with_after(mut self, after: impl Serialize) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

/// In-memory audit log, append-only from the caller's point of view.
/// Bounded by `capacity`; oldest entries are dropped once exceeded, since
/// durable retention is a `storage::Store` concern, not this log's.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    records: RwLock<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn record(&self, record: AuditRecord) {
        let mut records = self.records.write().expect("audit log lock poisoned");
        records.push(record);
        if records.len() > self.capacity {
            let overflow = records.len() - self.capacity;
            records.drain(0..overflow);
        }
    }

    pub fn for_entity(&self, entity: &str, entity_id: &str) -> Vec<AuditRecord> {
        self.records
            .read()
            .expect("audit log lock poisoned")
            .iter()
            .filter(|r| r.entity == entity && r.entity_id == entity_id)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().expect("audit log lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_filterable_by_entity() {
        let log = AuditLog::new(100);
        log.record(AuditRecord::new("downtime", "evt-1", None, "opened"));
        log.record(AuditRecord::new("andon", "evt-2", None, "created"));
        let downtime_records = log.for_entity("downtime", "evt-1");
        assert_eq!(downtime_records.len(), 1);
        assert_eq!(downtime_records[0].what, "opened");
    }

    #[test]
    fn capacity_evicts_oldest_first() {
        let log = AuditLog::new(2);
        log.record(AuditRecord::new("x", "1", None, "a"));
        log.record(AuditRecord::new("x", "2", None, "b"));
        log.record(AuditRecord::new("x", "3", None, "c"));
        assert_eq!(log.len(), 2);
        assert!(log.for_entity("x", "1").is_empty());
        assert_eq!(log.for_entity("x", "3").len(), 1);
    }
}
