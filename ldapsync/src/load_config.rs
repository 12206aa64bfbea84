/// `load_config` module: Loads a static YAML config, including environment secret injection,
/// into the typed configuration used by the CLI.
///
/// This module is the only place where user-supplied YAML is parsed and mapped to
/// strongly-typed structs.
///
/// # Responsibilities
/// - Parse the configuration file into type-safe Rust structs
/// - Inject the LDAP bind password from `LDAP_BIND_PASSWORD`; it never lives in the file
/// - Produce clear diagnostics: any failure in loading must say what and where
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use ldapsync_core::config::AdapterConfig;
use ldapsync_core::synchronise::Timeouts;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

pub const BIND_PASSWORD_ENV: &str = "LDAP_BIND_PASSWORD";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    pub directory: DirectorySection,
    pub adapter: AdapterConfig,
    pub repository: RepositorySection,
    #[serde(default)]
    pub timeouts: TimeoutSection,
}

/// Where directory entries come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirectorySection {
    Ldap(LdapSettings),
    File(FileSettings),
}

#[derive(Clone, Deserialize)]
pub struct LdapSettings {
    /// `ldap://host:port` or `ldaps://host:port`.
    pub url: String,
    #[serde(default)]
    pub bind_dn: Option<String>,
    /// Injected from the environment, never read from the file.
    #[serde(skip)]
    pub bind_password: Option<String>,
    #[serde(default)]
    pub starttls: bool,
    /// Subtrees to search, relative to the adapter's base DN.
    #[serde(default = "default_searches")]
    pub searches: Vec<String>,
}

impl std::fmt::Debug for LdapSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSettings")
            .field("url", &self.url)
            .field("bind_dn", &self.bind_dn)
            .field("bind_password", &self.bind_password.as_ref().map(|_| "<redacted>"))
            .field("starttls", &self.starttls)
            .field("searches", &self.searches)
            .finish()
    }
}

fn default_searches() -> Vec<String> {
    [
        "ou=students,ou=people",
        "ou=employees,ou=people",
        "ou=organizations,ou=people",
        "ou=studycycles",
        "ou=units",
        "ou=authorities",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySection {
    /// JSON snapshot holding the authoritative records.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSection {
    #[serde(default = "default_directory_secs")]
    pub directory_secs: u64,
    #[serde(default = "default_repository_secs")]
    pub repository_secs: u64,
}

fn default_directory_secs() -> u64 {
    60
}

fn default_repository_secs() -> u64 {
    30
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            directory_secs: default_directory_secs(),
            repository_secs: default_repository_secs(),
        }
    }
}

impl From<&TimeoutSection> for Timeouts {
    fn from(section: &TimeoutSection) -> Self {
        Timeouts {
            directory: Duration::from_secs(section.directory_secs),
            repository: Duration::from_secs(section.repository_secs),
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects required env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let DirectorySection::Ldap(settings) = &mut config.directory {
        if settings.bind_dn.is_some() {
            match std::env::var(BIND_PASSWORD_ENV) {
                Ok(password) => {
                    info!("{} found in env", BIND_PASSWORD_ENV);
                    settings.bind_password = Some(password);
                }
                Err(e) => {
                    error!(error = ?e, "{} environment variable not set", BIND_PASSWORD_ENV);
                    anyhow::bail!("{BIND_PASSWORD_ENV} environment variable not set: {e}");
                }
            }
        }
    }

    config.adapter.trace_loaded();
    info!(
        repository = %config.repository.path.display(),
        directory_secs = config.timeouts.directory_secs,
        repository_secs = config.timeouts.repository_secs,
        "Config loaded and merged successfully"
    );

    Ok(config)
}
