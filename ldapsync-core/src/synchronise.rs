//! High-level pipeline: orchestrates fetch → map → ingest → reconcile for one run.
//!
//! This module provides the top-level orchestration for "synchronising" the directory
//! into the authoritative store. A run:
//!   - Fetches every entry from a [`DirectorySource`], bounded by a timeout
//!   - Maps each entry through the [`Adapter`]; unmappable entries are counted as `Failed`.
//!     Employee units and student cycles are resolved from the group entries of the fetch
//!   - Ingests the shadow records into a [`ShadowStore`]
//!   - Reconciles the store into a [`Repository`] (see [`crate::reconcile`])
//!   - Returns a [`SyncReport`] with the counts
//!
//! # Error Handling
//! Per-record problems never leave this module; they are counted. Run-level failures
//! return a [`SyncAbort`] which still carries the report of everything completed.

use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::adapter::Adapter;
use crate::config::AdapterConfig;
use crate::contract::{DirectorySource, Repository};
use crate::counter::{CounterSnapshot, InstancesCounter, SyncOutcome};
use crate::error::SyncError;
use crate::reconcile::{reconcile, Cancellation, ReconcileOptions};
use crate::shadow::ShadowStore;

/// Upper bounds for the blocking operations of a run.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    pub directory: Duration,
    pub repository: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            directory: Duration::from_secs(60),
            repository: Duration::from_secs(30),
        }
    }
}

/// The top-level synchronise configuration.
#[derive(Debug, Clone)]
pub struct SynchroniseConfig {
    pub adapter: AdapterConfig,
    pub timeouts: Timeouts,
    pub dry_run: bool,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub dry_run: bool,
    /// Entries returned by the directory.
    pub entries_fetched: usize,
    /// Entries that mapped to a shadow record.
    pub records_mapped: usize,
    pub counts: CounterSnapshot,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry run: no changes were written.")?;
        }
        writeln!(
            f,
            "Entries fetched: {}, mapped: {}",
            self.entries_fetched, self.records_mapped
        )?;
        write!(f, "{}", self.counts)?;
        write!(
            f,
            "Totals: created {}, updated {}, deleted {}, unchanged {}, failed {}",
            self.counts.total(SyncOutcome::Created),
            self.counts.total(SyncOutcome::Updated),
            self.counts.total(SyncOutcome::Deleted),
            self.counts.total(SyncOutcome::Unchanged),
            self.counts.total(SyncOutcome::Failed),
        )
    }
}

/// A run that stopped early, with everything it completed before stopping.
#[derive(Debug, Error)]
#[error("synchronisation aborted: {error}")]
pub struct SyncAbort {
    #[source]
    pub error: SyncError,
    pub report: SyncReport,
}

pub async fn synchronise<D, R>(
    config: &SynchroniseConfig,
    directory: &D,
    repository: &R,
    cancellation: &Cancellation,
) -> Result<SyncReport, SyncAbort>
where
    D: DirectorySource + ?Sized,
    R: Repository + ?Sized,
{
    info!(dry_run = config.dry_run, "[SYNC] Starting directory synchronisation");

    let mut counter = InstancesCounter::new();
    let mut report = SyncReport {
        dry_run: config.dry_run,
        ..SyncReport::default()
    };

    // --- Step 1: Fetch ---
    let entries = match tokio::time::timeout(config.timeouts.directory, directory.fetch_all()).await
    {
        Ok(Ok(entries)) => entries,
        Ok(Err(e)) => {
            error!(error = %e, "[SYNC][ERROR] Directory fetch failed");
            return Err(SyncAbort {
                error: SyncError::DirectoryUnavailable(e),
                report,
            });
        }
        Err(_) => {
            error!(
                timeout = ?config.timeouts.directory,
                "[SYNC][ERROR] Directory fetch timed out"
            );
            return Err(SyncAbort {
                error: SyncError::DirectoryTimeout {
                    timeout: config.timeouts.directory,
                },
                report,
            });
        }
    };
    report.entries_fetched = entries.len();
    info!(entries = entries.len(), "[SYNC] Directory fetch succeeded");

    // --- Step 2: Map ---
    let adapter = Adapter::new(config.adapter.clone());
    let links = adapter.links(&entries);
    let mut records = Vec::with_capacity(entries.len());
    for entry in &entries {
        match adapter.map(entry) {
            Ok(mut record) => {
                links.apply(&mut record);
                records.push(record);
            }
            Err(e) => {
                warn!(dn = %entry.dn, error = %e, "[SYNC][MAP] Entry skipped");
                counter.record(e.kind(), SyncOutcome::Failed);
            }
        }
    }
    report.records_mapped = records.len();

    // --- Step 3: Ingest ---
    let shadow = ShadowStore::ingest(records);
    for (kind, count) in shadow.duplicates() {
        counter.record_duplicates(*kind, *count);
    }
    info!(
        records = shadow.len(),
        "[SYNC] Shadow store built"
    );

    // --- Step 4: Reconcile ---
    let options = ReconcileOptions {
        dry_run: config.dry_run,
        repository_timeout: config.timeouts.repository,
        cancellation: cancellation.clone(),
    };
    let outcome = reconcile(&shadow, repository, &options, &mut counter).await;
    report.counts = counter.snapshot();

    match outcome {
        Ok(()) => {
            info!(
                created = report.counts.total(SyncOutcome::Created),
                updated = report.counts.total(SyncOutcome::Updated),
                deleted = report.counts.total(SyncOutcome::Deleted),
                unchanged = report.counts.total(SyncOutcome::Unchanged),
                failed = report.counts.total(SyncOutcome::Failed),
                "[SYNC] Synchronisation complete"
            );
            Ok(report)
        }
        Err(error) => {
            error!(error = %error, "[SYNC][ERROR] Synchronisation aborted");
            Err(SyncAbort { error, report })
        }
    }
}
