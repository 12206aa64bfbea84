//! Live directory binding over LDAP.
//!
//! One connection per run: bind, search each configured subtree, unbind. Every search
//! is bounded by the directory timeout; the search base entry itself is never returned
//! since it is a container, not a record.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use ldapsync_core::contract::DirectorySource;
use ldapsync_core::dn;
use ldapsync_core::error::DirectoryError;
use ldapsync_core::record::DirectoryEntry;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::load_config::LdapSettings;

/// `noSuchObject`: the search base does not exist.
const RC_NO_SUCH_OBJECT: u32 = 32;

pub struct LdapDirectory {
    settings: LdapSettings,
    base_dn: String,
    timeout: Duration,
}

impl LdapDirectory {
    pub fn new(settings: LdapSettings, base_dn: impl Into<String>, timeout: Duration) -> Self {
        Self {
            settings,
            base_dn: base_dn.into(),
            timeout,
        }
    }

    /// Absolute DNs of the subtrees searched, in configuration order.
    pub fn search_bases(&self) -> Vec<String> {
        self.settings
            .searches
            .iter()
            .map(|relative| dn::join(relative, &self.base_dn))
            .collect()
    }
}

fn unavailable(message: impl Into<String>, e: ldap3::LdapError) -> DirectoryError {
    DirectoryError::unavailable_with_source(message, e)
}

#[async_trait]
impl DirectorySource for LdapDirectory {
    async fn fetch_all(&self) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        let url = &self.settings.url;
        debug!(url = %url, "Connecting to LDAP server");

        let conn_settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.settings.starttls);
        let (conn, mut ldap) = LdapConnAsync::with_settings(conn_settings, url)
            .await
            .map_err(|e| unavailable(format!("failed to connect to {url}"), e))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        if let Some(bind_dn) = &self.settings.bind_dn {
            let password = self.settings.bind_password.as_deref().unwrap_or("");
            debug!(bind_dn = %bind_dn, "Performing LDAP bind");
            ldap.with_timeout(self.timeout)
                .simple_bind(bind_dn, password)
                .await
                .map_err(|e| unavailable(format!("bind failed for {bind_dn}"), e))?
                .success()
                .map_err(|e| unavailable(format!("bind failed for {bind_dn}"), e))?;
        }

        let mut entries = Vec::new();
        for base in self.search_bases() {
            let result = ldap
                .with_timeout(self.timeout)
                .search(&base, Scope::Subtree, "(objectClass=*)", vec!["*"])
                .await
                .map_err(|e| unavailable(format!("search failed under {base}"), e))?;

            if result.1.rc == RC_NO_SUCH_OBJECT {
                warn!(base = %base, "Search base does not exist, skipping");
                continue;
            }
            let (found, _) = result
                .success()
                .map_err(|e| unavailable(format!("search failed under {base}"), e))?;

            let before = entries.len();
            let base_key = dn::normalize(&base);
            for raw in found {
                let search_entry = SearchEntry::construct(raw);
                if dn::normalize(&search_entry.dn) == base_key {
                    continue;
                }
                let mut entry = DirectoryEntry::new(search_entry.dn);
                for (name, values) in search_entry.attrs {
                    entry = entry.with_attr(&name, values);
                }
                entries.push(entry);
            }
            debug!(base = %base, found = entries.len() - before, "LDAP search completed");
        }

        if let Err(e) = ldap.unbind().await {
            warn!(error = %e, "LDAP unbind failed");
        }

        info!(total = entries.len(), "Fetched directory entries over LDAP");
        Ok(entries)
    }
}
