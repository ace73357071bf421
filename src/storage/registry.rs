// In-memory extraction registry: figure records + completed units
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

use crate::types::FigureRecord;

/// Durable unit of progress: everything one document group produced.
///
/// `document_id` is `None` for units whose id could not be parsed and so
/// never belonged to a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub document_id: Option<String>,
    pub units: Vec<String>,
    pub records: Vec<FigureRecord>,
    pub checkpointed_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(document_id: Option<String>, units: Vec<String>, records: Vec<FigureRecord>) -> Self {
        Self {
            document_id,
            units,
            records,
            checkpointed_at: Utc::now(),
        }
    }
}

/// Every figure record written so far plus the set of units already attempted.
///
/// Records are keyed by `(page_id, figure_id)`; re-adding a known key is a
/// no-op, which keeps replay of persisted state idempotent.
#[derive(Debug, Clone, Default)]
pub struct ExtractionRegistry {
    records: Vec<FigureRecord>,
    record_keys: HashSet<(String, usize)>,
    completed: HashSet<String>,
}

impl ExtractionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a bare metadata array; every `page_id` present counts as completed.
    pub fn from_records(records: impl IntoIterator<Item = FigureRecord>) -> Self {
        let mut registry = Self::new();
        for record in records {
            registry.completed.insert(record.page_id.clone());
            registry.push_record(record);
        }
        registry
    }

    pub fn records(&self) -> &[FigureRecord] {
        &self.records
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_completed(&self, unit: &str) -> bool {
        self.completed.contains(unit)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.len()
    }

    /// Completed unit ids in sorted order, for stable output.
    pub fn completed_units(&self) -> Vec<String> {
        self.completed
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn mark_completed(&mut self, unit: impl Into<String>) -> bool {
        self.completed.insert(unit.into())
    }

    /// Returns `false` when a record with the same key is already present.
    pub fn push_record(&mut self, record: FigureRecord) -> bool {
        if !self.record_keys.insert(record.key()) {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn apply_checkpoint(&mut self, checkpoint: &Checkpoint) {
        for unit in &checkpoint.units {
            self.mark_completed(unit.as_str());
        }
        for record in &checkpoint.records {
            self.push_record(record.clone());
        }
    }

    /// Order-insensitive equality on records and completed units.
    pub fn same_contents(&self, other: &ExtractionRegistry) -> bool {
        self.completed == other.completed
            && self.records.len() == other.records.len()
            && self.records.iter().all(|record| other.records.contains(record))
    }
}
