#![allow(unused)]

//! # contract: the two external seams of a synchronisation run
//!
//! - [`DirectorySource`]: where entries come from (an LDAP server, a snapshot file, a mock).
//! - [`Repository`]: the authoritative store the directory is reconciled into.
//!
//! ## Mocking & Testing
//! Both traits are annotated for `mockall`; the generated `MockDirectorySource` and
//! `MockRepository` are exported behind the `test-export-mocks` feature so integration
//! tests in other crates can use them.
//!
//! ## Transactions
//! Every mutating [`Repository`] call is a unit of its own: it either lands completely or
//! not at all. A run is therefore never atomic as a whole, but each record is.

use async_trait::async_trait;

use mockall::{automock, predicate::*};

use crate::error::{DirectoryError, RepoError};
use crate::record::{AuthoritativeRecord, DirectoryEntry, EntityKind, FieldChange};

/// Produces the full directory snapshot for one run.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// Fetch every entry relevant to the synchronisation.
    async fn fetch_all(&self) -> Result<Vec<DirectoryEntry>, DirectoryError>;
}

/// The system of record, seen only through tracked fields.
///
/// Implementors return [`RepoError::Rejected`] when a single record cannot be written
/// and [`RepoError::Unavailable`] when the store itself is gone.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Repository: Send + Sync {
    /// Look a record up by variant and external id.
    async fn find(
        &self,
        kind: EntityKind,
        external_id: &str,
    ) -> Result<Option<AuthoritativeRecord>, RepoError>;

    /// External ids of every stored record of a variant.
    async fn list_ids(&self, kind: EntityKind) -> Result<Vec<String>, RepoError>;

    async fn create(&self, record: &AuthoritativeRecord) -> Result<(), RepoError>;

    /// Write only `changes`; `record` is the already-updated row for implementors that
    /// prefer to replace the tracked fields wholesale.
    async fn update(
        &self,
        record: &AuthoritativeRecord,
        changes: &[FieldChange],
    ) -> Result<(), RepoError>;

    async fn delete(&self, record: &AuthoritativeRecord) -> Result<(), RepoError>;
}
