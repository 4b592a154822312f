//! sparkle-backup - Main entry point
//!
//! Back up, list, restore and delete Sparkle configuration archives.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use sparkle_backup::restore::SystemNotifier;
use sparkle_backup::{utils, BackupService, Config, TransportConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", env = "SPARKLE_BACKUP_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Live data directory (overrides config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Local backup directory (overrides config)
    #[arg(long, value_name = "DIR")]
    backup_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct Store {
    /// Use the configured WebDAV server instead of the local backup directory
    #[arg(long)]
    webdav: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Archive the current configuration and store it
    Backup {
        #[command(flatten)]
        store: Store,
    },
    /// List stored backups, newest first
    List {
        #[command(flatten)]
        store: Store,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Restore a stored backup by name
    Restore {
        name: String,

        #[command(flatten)]
        store: Store,

        /// Open the recovery directory if rollback fails
        #[arg(long)]
        open_on_failure: bool,
    },
    /// Restore from a zip file anywhere on disk
    RestoreFile {
        path: PathBuf,

        /// Open the recovery directory if rollback fails
        #[arg(long)]
        open_on_failure: bool,
    },
    /// Delete a stored backup by name
    Delete {
        name: String,

        #[command(flatten)]
        store: Store,
    },
}

fn transport_for(config: &Config, store: &Store) -> Result<TransportConfig> {
    let target = if store.webdav {
        config.webdav_transport()?
    } else {
        config.local_transport()?
    };
    Ok(target)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        Config::default()
    };
    if let Some(dir) = args.data_dir.clone() {
        config.data.dir = dir;
    }
    if let Some(dir) = args.backup_dir.clone() {
        config.local.backup_dir = Some(dir);
    }

    // Initialize logging
    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    tracing::debug!(
        "sparkle-backup v{} (data: {}, work: {})",
        env!("CARGO_PKG_VERSION"),
        config.data.dir.display(),
        config.data.work_dir.display()
    );

    let open_on_failure = matches!(
        args.command,
        Command::Restore {
            open_on_failure: true,
            ..
        } | Command::RestoreFile {
            open_on_failure: true,
            ..
        }
    );
    let service = BackupService::new(Arc::new(config.layout()), config.data.work_dir.clone())
        .with_notifier(Arc::new(SystemNotifier { open_on_failure }));

    match &args.command {
        Command::Backup { store } => {
            let target = transport_for(&config, store)?;
            let descriptor = service.backup(&target).await?;
            println!("{}", descriptor.name);
        }
        Command::List { store, json } => {
            let target = transport_for(&config, store)?;
            let backups = service.list(&target).await?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&backups)?);
            } else {
                for backup in &backups {
                    println!("{}", backup.name);
                }
            }
        }
        Command::Restore { name, store, .. } => {
            let target = transport_for(&config, store)?;
            let report = service.restore(&target, name).await?;
            println!("{}", report.summary());
        }
        Command::RestoreFile { path, .. } => {
            let report = service.restore_file(path).await?;
            println!("{}", report.summary());
        }
        Command::Delete { name, store } => {
            let target = transport_for(&config, store)?;
            service.delete(&target, name).await?;
        }
    }

    Ok(())
}
