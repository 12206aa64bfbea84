//! Directory bindings for the CLI.
//!
//! - [`FileDirectory`]: entries read from a YAML (or JSON) snapshot, for offline runs and tests.
//! - [`LdapDirectory`]: the live directory over LDAP, see [`crate::ldap`].

use async_trait::async_trait;
use ldapsync_core::contract::DirectorySource;
use ldapsync_core::error::DirectoryError;
use ldapsync_core::record::DirectoryEntry;
use std::path::PathBuf;
use tracing::{error, info};

pub use crate::ldap::LdapDirectory;

/// A directory snapshot on disk: a list of `{dn, attributes}` entries.
///
/// Attribute values may be a single string or a list of strings.
pub struct FileDirectory {
    path: PathBuf,
}

impl FileDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DirectorySource for FileDirectory {
    async fn fetch_all(&self) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        info!(path = %self.path.display(), "Reading directory snapshot");
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            error!(error = ?e, path = %self.path.display(), "Failed to read directory snapshot");
            DirectoryError::unavailable_with_source(
                format!("cannot read {}", self.path.display()),
                e,
            )
        })?;
        // YAML is a superset of JSON, so one parser covers both formats.
        let entries: Vec<DirectoryEntry> = serde_yaml::from_str(&content).map_err(|e| {
            error!(error = ?e, path = %self.path.display(), "Failed to parse directory snapshot");
            DirectoryError::Malformed {
                message: format!("{}: {e}", self.path.display()),
            }
        })?;
        info!(entries = entries.len(), "Directory snapshot loaded");
        Ok(entries)
    }
}
