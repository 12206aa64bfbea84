//! In-memory [`Repository`], used by tests and dry runs against a seeded state.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use crate::contract::Repository;
use crate::error::RepoError;
use crate::record::{AuthoritativeRecord, EntityKind, FieldChange};

type Table = BTreeMap<EntityKind, BTreeMap<String, AuthoritativeRecord>>;

#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<Table>,
    mutations: Mutex<u64>,
    enforce_references: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject creates and updates that point at missing records, and deletes of records
    /// something still points at, the way a database with foreign keys would.
    pub fn with_referential_checks() -> Self {
        Self {
            enforce_references: true,
            ..Self::default()
        }
    }

    pub fn seed<I>(self, records: I) -> Self
    where
        I: IntoIterator<Item = AuthoritativeRecord>,
    {
        {
            let mut table = self.table();
            for record in records {
                table
                    .entry(record.kind)
                    .or_default()
                    .insert(record.external_id.clone(), record);
            }
        }
        self
    }

    pub fn get(&self, kind: EntityKind, external_id: &str) -> Option<AuthoritativeRecord> {
        self.table()
            .get(&kind)
            .and_then(|t| t.get(external_id))
            .cloned()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.table().get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.table().values().all(BTreeMap::is_empty)
    }

    /// Number of successful create, update and delete calls so far.
    pub fn mutations(&self) -> u64 {
        *self.mutations.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        *self.mutations.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn check_references(table: &Table, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        for (kind, id) in record.references() {
            let present = table.get(&kind).is_some_and(|t| t.contains_key(&id));
            if !present {
                return Err(RepoError::rejected(
                    record.kind,
                    &record.external_id,
                    format!("references missing {kind} '{id}'"),
                ));
            }
        }
        Ok(())
    }

    fn check_unreferenced(table: &Table, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        let target = (record.kind, record.external_id.clone());
        let holder = table
            .values()
            .flat_map(BTreeMap::values)
            .find(|other| other.references().contains(&target));
        match holder {
            Some(other) => Err(RepoError::rejected(
                record.kind,
                &record.external_id,
                format!("still referenced by {} '{}'", other.kind, other.external_id),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn find(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> Result<Option<AuthoritativeRecord>, RepoError> {
        Ok(self.get(kind, external_id))
    }

    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<String>, RepoError> {
        Ok(self
            .table()
            .get(&kind)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        let mut table = self.table();
        if table
            .get(&record.kind)
            .is_some_and(|t| t.contains_key(&record.external_id))
        {
            return Err(RepoError::rejected(
                record.kind,
                &record.external_id,
                "already exists",
            ));
        }
        if self.enforce_references {
            Self::check_references(&table, record)?;
        }
        table
            .entry(record.kind)
            .or_default()
            .insert(record.external_id.clone(), record.clone());
        drop(table);
        self.bump();
        Ok(())
    }

    async fn update(
        &self,
        record: &AuthoritativeRecord,
        changes: &[FieldChange],
    ) -> Result<(), RepoError> {
        let mut table = self.table();
        if self.enforce_references {
            Self::check_references(&table, record)?;
        }
        let stored = table
            .get_mut(&record.kind)
            .and_then(|t| t.get_mut(&record.external_id))
            .ok_or_else(|| RepoError::rejected(record.kind, &record.external_id, "not found"))?;
        stored.apply(changes);
        drop(table);
        self.bump();
        Ok(())
    }

    async fn delete(&self, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        let mut table = self.table();
        if self.enforce_references {
            Self::check_unreferenced(&table, record)?;
        }
        let removed = table
            .get_mut(&record.kind)
            .and_then(|t| t.remove(&record.external_id));
        if removed.is_none() {
            return Err(RepoError::rejected(record.kind, &record.external_id, "not found"));
        }
        drop(table);
        self.bump();
        Ok(())
    }
}
