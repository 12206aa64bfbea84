//! In-memory staging of mapped directory records for a single run.

use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::record::{EntityKind, ShadowRecord};

/// Records of one variant, in the order the directory yielded them.
#[derive(Debug, Default, Clone)]
struct Partition {
    records: Vec<ShadowRecord>,
    index: HashMap<String, usize>,
}

/// Per-variant index from external id to shadow record.
///
/// Duplicate external ids within a variant: the last record wins, keeping the position
/// of the first occurrence. Each duplicate is counted in [`ShadowStore::duplicates`].
#[derive(Debug, Default, Clone)]
pub struct ShadowStore {
    partitions: BTreeMap<EntityKind, Partition>,
    duplicates: BTreeMap<EntityKind, u64>,
}

impl ShadowStore {
    pub fn ingest<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ShadowRecord>,
    {
        let mut store = ShadowStore::default();
        for record in records {
            store.insert(record);
        }
        store
    }

    pub fn insert(&mut self, record: ShadowRecord) {
        let kind = record.kind();
        let partition = self.partitions.entry(kind).or_default();
        match partition.index.get(record.external_id()) {
            Some(&position) => {
                warn!(
                    %kind,
                    external_id = %record.external_id(),
                    "[SHADOW] Duplicate external id in directory, last entry wins"
                );
                partition.records[position] = record;
                *self.duplicates.entry(kind).or_insert(0) += 1;
            }
            None => {
                partition
                    .index
                    .insert(record.external_id().to_string(), partition.records.len());
                partition.records.push(record);
            }
        }
    }

    /// Records of a variant in insertion order.
    pub fn records(&self, kind: EntityKind) -> &[ShadowRecord] {
        self.partitions
            .get(&kind)
            .map(|p| p.records.as_slice())
            .unwrap_or(&[])
    }

    pub fn get(&self, kind: EntityKind, external_id: &str) -> Option<&ShadowRecord> {
        let partition = self.partitions.get(&kind)?;
        partition
            .index
            .get(external_id)
            .map(|&position| &partition.records[position])
    }

    pub fn contains(&self, kind: EntityKind, external_id: &str) -> bool {
        self.get(kind, external_id).is_some()
    }

    pub fn duplicates(&self) -> &BTreeMap<EntityKind, u64> {
        &self.duplicates
    }

    pub fn len(&self) -> usize {
        self.partitions.values().map(|p| p.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
