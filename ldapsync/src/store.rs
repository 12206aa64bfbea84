//! File-backed authoritative store.
//!
//! The whole store is one JSON document. Each mutation is applied to a copy, written to
//! a temporary file next to the target and atomically renamed over it; only then does the
//! in-memory state move forward. A crash mid-run leaves the last committed record on disk.

use async_trait::async_trait;
use ldapsync_core::contract::Repository;
use ldapsync_core::error::RepoError;
use ldapsync_core::record::{AuthoritativeRecord, EntityKind, FieldChange};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, error, info};

type Table = BTreeMap<EntityKind, BTreeMap<String, AuthoritativeRecord>>;

#[derive(Serialize, Deserialize, Default)]
struct StoreFile {
    #[serde(default)]
    records: Vec<AuthoritativeRecord>,
}

pub struct FileRepository {
    path: PathBuf,
    records: Mutex<Table>,
}

impl FileRepository {
    /// Opens the store, starting empty when the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RepoError> {
        let path = path.into();
        let mut table = Table::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path).map_err(|e| {
                error!(error = ?e, path = %path.display(), "Failed to read store");
                RepoError::unavailable_with_source(format!("cannot read {}", path.display()), e)
            })?;
            let file: StoreFile = serde_json::from_str(&content).map_err(|e| {
                error!(error = ?e, path = %path.display(), "Failed to parse store");
                RepoError::unavailable_with_source(format!("cannot parse {}", path.display()), e)
            })?;
            for record in file.records {
                table
                    .entry(record.kind)
                    .or_default()
                    .insert(record.external_id.clone(), record);
            }
            info!(path = %path.display(), records = file_len(&table), "Opened store");
        } else {
            info!(path = %path.display(), "Store does not exist yet, starting empty");
        }
        Ok(Self {
            path,
            records: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored records of a variant, ordered by external id.
    pub fn records(&self, kind: EntityKind) -> Vec<AuthoritativeRecord> {
        self.table()
            .get(&kind)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    fn table(&self) -> MutexGuard<'_, Table> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies `mutate` to a copy of the table, persists it, then commits it in memory.
    fn commit<F>(&self, mutate: F) -> Result<(), RepoError>
    where
        F: FnOnce(&mut Table) -> Result<(), RepoError>,
    {
        let mut guard = self.table();
        let mut next = guard.clone();
        mutate(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(())
    }

    fn persist(&self, table: &Table) -> Result<(), RepoError> {
        let file = StoreFile {
            records: table.values().flat_map(|t| t.values().cloned()).collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| RepoError::unavailable_with_source("cannot serialize store", e))?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let write_err = |e: std::io::Error| {
            error!(error = ?e, path = %self.path.display(), "Failed to write store");
            RepoError::unavailable_with_source(format!("cannot write {}", self.path.display()), e)
        };
        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        debug!(path = %self.path.display(), records = file.records.len(), "Store persisted");
        Ok(())
    }
}

fn file_len(table: &Table) -> usize {
    table.values().map(BTreeMap::len).sum()
}

#[async_trait]
impl Repository for FileRepository {
    async fn find(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> Result<Option<AuthoritativeRecord>, RepoError> {
        Ok(self
            .table()
            .get(&kind)
            .and_then(|t| t.get(external_id))
            .cloned())
    }

    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<String>, RepoError> {
        Ok(self
            .table()
            .get(&kind)
            .map(|t| t.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn create(&self, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        self.commit(|table| {
            let rows = table.entry(record.kind).or_default();
            if rows.contains_key(&record.external_id) {
                return Err(RepoError::rejected(
                    record.kind,
                    &record.external_id,
                    "already exists",
                ));
            }
            rows.insert(record.external_id.clone(), record.clone());
            Ok(())
        })
    }

    async fn update(
        &self,
        record: &AuthoritativeRecord,
        changes: &[FieldChange],
    ) -> Result<(), RepoError> {
        self.commit(|table| {
            let stored = table
                .get_mut(&record.kind)
                .and_then(|t| t.get_mut(&record.external_id))
                .ok_or_else(|| RepoError::rejected(record.kind, &record.external_id, "not found"))?;
            stored.apply(changes);
            Ok(())
        })
    }

    async fn delete(&self, record: &AuthoritativeRecord) -> Result<(), RepoError> {
        self.commit(|table| {
            table
                .get_mut(&record.kind)
                .and_then(|t| t.remove(&record.external_id))
                .map(|_| ())
                .ok_or_else(|| RepoError::rejected(record.kind, &record.external_id, "not found"))
        })
    }
}
