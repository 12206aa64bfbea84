//! Error taxonomy for a synchronisation run.
//!
//! Per-record errors ([`MappingError`], [`RepoError::Rejected`]) are caught by the
//! reconciler and turned into `Failed` outcomes. Run-level errors ([`SyncError`])
//! abort the run and reach the driver together with the partial report.

use std::time::Duration;
use thiserror::Error;

use crate::record::EntityKind;

/// A directory entry could not be turned into a shadow record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A required attribute is absent or empty.
    #[error("{kind} entry '{dn}' is missing required attribute '{attribute}'")]
    MissingAttribute {
        kind: EntityKind,
        dn: String,
        attribute: &'static str,
    },

    /// An attribute is present but its value cannot be interpreted.
    #[error("{kind} entry '{dn}' has invalid value '{value}' for attribute '{attribute}'")]
    InvalidAttribute {
        kind: EntityKind,
        dn: String,
        attribute: &'static str,
        value: String,
    },

    /// No classification rule matched the entry.
    #[error("entry '{dn}' does not match any known record variant")]
    UnknownVariant { dn: String },
}

impl MappingError {
    /// Kind the entry was classified as, if classification got that far.
    pub fn kind(&self) -> EntityKind {
        match self {
            MappingError::MissingAttribute { kind, .. }
            | MappingError::InvalidAttribute { kind, .. } => *kind,
            MappingError::UnknownVariant { .. } => EntityKind::Unclassified,
        }
    }
}

/// Failure reported by an authoritative repository.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The store refused a single mutation; other records are unaffected.
    #[error("{kind} '{external_id}' rejected by repository: {reason}")]
    Rejected {
        kind: EntityKind,
        external_id: String,
        reason: String,
    },

    /// The store cannot be reached at all.
    #[error("repository unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl RepoError {
    pub fn rejected(kind: EntityKind, external_id: impl Into<String>, reason: impl Into<String>) -> Self {
        RepoError::Rejected {
            kind,
            external_id: external_id.into(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        RepoError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        RepoError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, RepoError::Unavailable { .. })
    }
}

/// Failure of the directory source as a whole.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The directory answered but its content could not be read.
    #[error("directory snapshot is malformed: {message}")]
    Malformed { message: String },
}

impl DirectoryError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: None,
        }
    }

    pub fn unavailable_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::Unavailable {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Run-level failure: the remaining work is abandoned.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    DirectoryUnavailable(#[source] DirectoryError),

    #[error("directory fetch timed out after {timeout:?}")]
    DirectoryTimeout { timeout: Duration },

    #[error("{0}")]
    RepositoryUnavailable(#[source] RepoError),

    #[error("repository call timed out after {timeout:?}")]
    RepositoryTimeout { timeout: Duration },

    #[error("synchronisation cancelled")]
    Cancelled,
}
