//! Per-run outcome accounting.
//!
//! An [`InstancesCounter`] belongs to exactly one run and is passed down the call chain
//! explicitly. It does no locking; parallel workers each keep their own and
//! [`InstancesCounter::merge`] them at the end.

use std::collections::BTreeMap;
use std::fmt;

use crate::record::EntityKind;

/// Result of reconciling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SyncOutcome {
    Created,
    Updated,
    Deleted,
    Unchanged,
    Failed,
}

impl SyncOutcome {
    pub const ALL: [SyncOutcome; 5] = [
        SyncOutcome::Created,
        SyncOutcome::Updated,
        SyncOutcome::Deleted,
        SyncOutcome::Unchanged,
        SyncOutcome::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOutcome::Created => "created",
            SyncOutcome::Updated => "updated",
            SyncOutcome::Deleted => "deleted",
            SyncOutcome::Unchanged => "unchanged",
            SyncOutcome::Failed => "failed",
        }
    }
}

impl fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Clone)]
pub struct InstancesCounter {
    counts: BTreeMap<(EntityKind, SyncOutcome), u64>,
    duplicates: BTreeMap<EntityKind, u64>,
}

impl InstancesCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, kind: EntityKind, outcome: SyncOutcome) {
        *self.counts.entry((kind, outcome)).or_insert(0) += 1;
    }

    pub fn record_duplicates(&mut self, kind: EntityKind, count: u64) {
        if count > 0 {
            *self.duplicates.entry(kind).or_insert(0) += count;
        }
    }

    pub fn get(&self, kind: EntityKind, outcome: SyncOutcome) -> u64 {
        self.counts.get(&(kind, outcome)).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: &InstancesCounter) {
        for (key, value) in &other.counts {
            *self.counts.entry(*key).or_insert(0) += value;
        }
        for (kind, value) in &other.duplicates {
            *self.duplicates.entry(*kind).or_insert(0) += value;
        }
    }

    pub fn reset(&mut self) {
        self.counts.clear();
        self.duplicates.clear();
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            counts: self.counts.clone(),
            duplicates: self.duplicates.clone(),
        }
    }
}

/// Immutable copy of a counter, handed to the driver at the end of a run.
///
/// Only non-zero entries are present.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CounterSnapshot {
    counts: BTreeMap<(EntityKind, SyncOutcome), u64>,
    duplicates: BTreeMap<EntityKind, u64>,
}

impl CounterSnapshot {
    pub fn counts(&self) -> &BTreeMap<(EntityKind, SyncOutcome), u64> {
        &self.counts
    }

    pub fn duplicates(&self) -> &BTreeMap<EntityKind, u64> {
        &self.duplicates
    }

    pub fn get(&self, kind: EntityKind, outcome: SyncOutcome) -> u64 {
        self.counts.get(&(kind, outcome)).copied().unwrap_or(0)
    }

    pub fn total(&self, outcome: SyncOutcome) -> u64 {
        self.counts
            .iter()
            .filter(|((_, o), _)| *o == outcome)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn total_records(&self) -> u64 {
        self.counts.values().sum()
    }

    /// True when every counted record came out unchanged.
    pub fn is_all_unchanged(&self) -> bool {
        self.counts
            .keys()
            .all(|(_, outcome)| *outcome == SyncOutcome::Unchanged)
    }
}

impl fmt::Display for CounterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<22}{:>9}{:>9}{:>9}{:>11}{:>8}",
            "kind", "created", "updated", "deleted", "unchanged", "failed"
        )?;
        let mut kinds: Vec<EntityKind> = self.counts.keys().map(|(k, _)| *k).collect();
        kinds.dedup();
        for kind in kinds {
            writeln!(
                f,
                "{:<22}{:>9}{:>9}{:>9}{:>11}{:>8}",
                kind.as_str(),
                self.get(kind, SyncOutcome::Created),
                self.get(kind, SyncOutcome::Updated),
                self.get(kind, SyncOutcome::Deleted),
                self.get(kind, SyncOutcome::Unchanged),
                self.get(kind, SyncOutcome::Failed),
            )?;
        }
        for (kind, count) in &self.duplicates {
            writeln!(f, "duplicate {} entries: {}", kind.as_str(), count)?;
        }
        Ok(())
    }
}
