//! Reconciler: diffs the shadow store against the authoritative repository and applies
//! the difference.
//!
//! # Order of work
//! 1. Creates and updates, variant by variant in [`EntityKind::DEPENDENCY_ORDER`], each
//!    variant in shadow insertion order. Units and study cycles therefore exist before
//!    the employees and students pointing at them.
//! 2. Deletions, variant by variant in reverse dependency order, so that nothing still
//!    points at a record when it goes away.
//!
//! # Failure handling
//! A [`RepoError::Rejected`] fails one record (`Failed`) and the run moves on.
//! [`RepoError::Unavailable`], a repository timeout or a cancellation stops the run
//! between records; everything counted so far stays in the counter.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::contract::Repository;
use crate::counter::{InstancesCounter, SyncOutcome};
use crate::error::{RepoError, SyncError};
use crate::record::{AuthoritativeRecord, EntityKind, ShadowRecord};
use crate::shadow::ShadowStore;

/// Cooperative cancellation, checked between records.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Decide and count, but never mutate the repository.
    pub dry_run: bool,
    /// Upper bound for each individual repository call.
    pub repository_timeout: Duration,
    pub cancellation: Cancellation,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            repository_timeout: Duration::from_secs(30),
            cancellation: Cancellation::new(),
        }
    }
}

enum Failure {
    Record(RepoError),
    Run(SyncError),
}

/// Reconcile every variant of `shadow` into `repository`, counting one outcome per record.
pub async fn reconcile<R>(
    shadow: &ShadowStore,
    repository: &R,
    options: &ReconcileOptions,
    counter: &mut InstancesCounter,
) -> Result<(), SyncError>
where
    R: Repository + ?Sized,
{
    Reconciler {
        shadow,
        repository,
        options,
    }
    .run(counter)
    .await
}

struct Reconciler<'a, R: ?Sized> {
    shadow: &'a ShadowStore,
    repository: &'a R,
    options: &'a ReconcileOptions,
}

impl<R> Reconciler<'_, R>
where
    R: Repository + ?Sized,
{
    async fn run(&self, counter: &mut InstancesCounter) -> Result<(), SyncError> {
        info!(
            records = self.shadow.len(),
            dry_run = self.options.dry_run,
            "[RECONCILE] Starting reconciliation"
        );

        for kind in EntityKind::DEPENDENCY_ORDER {
            let records = self.shadow.records(kind);
            debug!(%kind, count = records.len(), "[RECONCILE] Upserting variant");
            for record in records {
                self.check_cancelled()?;
                let outcome = self.upsert(record).await?;
                counter.record(kind, outcome);
            }
        }

        for kind in EntityKind::DEPENDENCY_ORDER.into_iter().rev() {
            let stored = match self.call(self.repository.list_ids(kind)).await {
                Ok(ids) => ids,
                Err(Failure::Run(e)) => return Err(e),
                Err(Failure::Record(e)) => {
                    warn!(%kind, error = %e, "[RECONCILE] Could not list stored records, skipping deletions");
                    continue;
                }
            };
            for external_id in stored {
                if self.shadow.contains(kind, &external_id) {
                    continue;
                }
                self.check_cancelled()?;
                if let Some(outcome) = self.remove(kind, &external_id).await? {
                    counter.record(kind, outcome);
                }
            }
        }

        info!("[RECONCILE] Reconciliation finished");
        Ok(())
    }

    fn check_cancelled(&self) -> Result<(), SyncError> {
        if self.options.cancellation.is_cancelled() {
            warn!("[RECONCILE] Cancellation requested, stopping between records");
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    async fn upsert(&self, record: &ShadowRecord) -> Result<SyncOutcome, SyncError> {
        let kind = record.kind();
        let external_id = record.external_id();

        let existing = match self.call(self.repository.find(kind, external_id)).await {
            Ok(found) => found,
            Err(failure) => return self.failed(kind, external_id, failure),
        };

        match existing {
            None => {
                let created = AuthoritativeRecord::from_shadow(record);
                if !self.options.dry_run {
                    if let Err(failure) = self.call(self.repository.create(&created)).await {
                        return self.failed(kind, external_id, failure);
                    }
                }
                info!(%kind, %external_id, "[RECONCILE] Created");
                Ok(SyncOutcome::Created)
            }
            Some(current) => {
                let changes = current.diff(record);
                if changes.is_empty() {
                    debug!(%kind, %external_id, "[RECONCILE] Unchanged");
                    return Ok(SyncOutcome::Unchanged);
                }
                let mut updated = current;
                updated.apply(&changes);
                if !self.options.dry_run {
                    if let Err(failure) = self.call(self.repository.update(&updated, &changes)).await {
                        return self.failed(kind, external_id, failure);
                    }
                }
                let fields: Vec<&str> = changes.iter().map(|c| c.field.as_str()).collect();
                info!(%kind, %external_id, ?fields, "[RECONCILE] Updated");
                Ok(SyncOutcome::Updated)
            }
        }
    }

    /// Deletes a stored record the directory no longer has. `None` if it vanished meanwhile.
    async fn remove(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> Result<Option<SyncOutcome>, SyncError> {
        let stored = match self.call(self.repository.find(kind, external_id)).await {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                debug!(%kind, %external_id, "[RECONCILE] Record disappeared before deletion");
                return Ok(None);
            }
            Err(failure) => return self.failed(kind, external_id, failure).map(Some),
        };
        if !self.options.dry_run {
            if let Err(failure) = self.call(self.repository.delete(&stored)).await {
                return self.failed(kind, external_id, failure).map(Some);
            }
        }
        info!(%kind, %external_id, "[RECONCILE] Deleted");
        Ok(Some(SyncOutcome::Deleted))
    }

    /// Per-record failures become `Failed`; run-level failures propagate.
    fn failed(
        &self,
        kind: EntityKind,
        external_id: &str,
        failure: Failure,
    ) -> Result<SyncOutcome, SyncError> {
        match failure {
            Failure::Record(e) => {
                warn!(%kind, %external_id, error = %e, "[RECONCILE][ERROR] Record failed");
                Ok(SyncOutcome::Failed)
            }
            Failure::Run(e) => Err(e),
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, Failure>
    where
        F: Future<Output = Result<T, RepoError>>,
    {
        match tokio::time::timeout(self.options.repository_timeout, fut).await {
            Err(_) => Err(Failure::Run(SyncError::RepositoryTimeout {
                timeout: self.options.repository_timeout,
            })),
            Ok(Err(e)) if e.is_unavailable() => Err(Failure::Run(SyncError::RepositoryUnavailable(e))),
            Ok(Err(e)) => Err(Failure::Record(e)),
            Ok(Ok(value)) => Ok(value),
        }
    }
}
