///
/// This module implements the CLI interface for ldapsync: command parsing, argument
/// validation and the `run` entrypoint.
///
/// All core business logic (data model, mapping, reconciliation) lives in the
/// [`ldapsync-core`] crate. This module wires the configured directory and store
/// bindings into [`synchronise`] and prints the resulting report.
///
/// ## How To Use
/// - For command-line users: `ldapsync sync --config ldapsync.yaml [--dry-run]`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`ldapsync-core`]: ../../ldapsync-core/
/// [`Cli`]: struct.Cli.html
/// [`run`]: fn.run.html
use crate::directory::{FileDirectory, LdapDirectory};
use crate::load_config::{load_config, DirectorySection};
use crate::store::FileRepository;
use anyhow::Result;
use clap::{Parser, Subcommand};
use ldapsync_core::contract::DirectorySource;
use ldapsync_core::reconcile::Cancellation;
use ldapsync_core::synchronise::{synchronise, SynchroniseConfig, Timeouts};
use std::path::PathBuf;

/// CLI for ldapsync: mirror the university directory into the thesis application's store.
#[derive(Parser)]
#[clap(
    name = "ldapsync",
    version,
    about = "One-way synchronisation of LDAP directory entries into the application store"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile the store with the directory using the given config file
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Compute and report the changes without writing any of them
        #[clap(long)]
        dry_run: bool,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, dry_run } => {
            let config = load_config(config)?;
            tracing::info!(command = "sync", dry_run, "Starting synchronisation process");

            let repository = FileRepository::open(&config.repository.path)
                .map_err(|e| anyhow::Error::new(e).context("Failed to open store"))?;

            let timeouts = Timeouts::from(&config.timeouts);
            let directory: Box<dyn DirectorySource> = match config.directory {
                DirectorySection::Ldap(settings) => Box::new(LdapDirectory::new(
                    settings,
                    config.adapter.base_dn.clone(),
                    timeouts.directory,
                )),
                DirectorySection::File(file) => Box::new(FileDirectory::new(file.path)),
            };

            let sync_config = SynchroniseConfig {
                adapter: config.adapter,
                timeouts,
                dry_run,
            };

            let cancellation = Cancellation::new();
            let watcher = {
                let cancellation = cancellation.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("Interrupt received, stopping after the current record");
                        cancellation.cancel();
                    }
                })
            };

            let outcome =
                synchronise(&sync_config, directory.as_ref(), &repository, &cancellation).await;
            watcher.abort();

            match outcome {
                Ok(report) => {
                    tracing::info!(command = "sync", "Synchronisation complete");
                    println!("Synchronisation complete.\n{report}");
                    Ok(())
                }
                Err(abort) => {
                    tracing::error!(command = "sync", error = %abort, "Synchronisation failed");
                    eprintln!("{abort}\n{}", abort.report);
                    Err(anyhow::Error::new(abort))
                }
            }
        }
    }
}
