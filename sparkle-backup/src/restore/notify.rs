//! Operator notification for unrecoverable restore failures.
//!
//! The restore transaction never talks to a UI directly. When rollback fails
//! it hands the message and the recovery location to an [`OperatorNotifier`],
//! which may ask for the location to be opened.

use std::io;
use std::path::Path;

use async_trait::async_trait;
use tracing::error;

/// What the operator chose after a fatal notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalResponse {
    OpenRecoveryDir,
    Dismiss,
}

#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    /// Report a rollback failure. `recovery_path` holds the pre-restore snapshot.
    async fn notify_fatal(&self, message: &str, recovery_path: &Path) -> FatalResponse;

    /// Show `path` to the operator (file browser, terminal, ...).
    async fn open_path(&self, path: &Path) -> io::Result<()>;
}

/// Logs fatal failures and never opens anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify_fatal(&self, message: &str, recovery_path: &Path) -> FatalResponse {
        error!(
            "{} (manual recovery: {})",
            message,
            recovery_path.display()
        );
        FatalResponse::Dismiss
    }

    async fn open_path(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Prints fatal failures to stderr and optionally opens the recovery directory
/// in the platform file browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNotifier {
    pub open_on_failure: bool,
}

#[async_trait]
impl OperatorNotifier for SystemNotifier {
    async fn notify_fatal(&self, message: &str, recovery_path: &Path) -> FatalResponse {
        error!("{}", message);
        eprintln!("Restore failed and automatic rollback failed.");
        eprintln!("Your original configuration was saved to:");
        eprintln!("  {}", recovery_path.display());
        eprintln!("Copy the files from that directory back into the data directory to recover.");

        if self.open_on_failure {
            FatalResponse::OpenRecoveryDir
        } else {
            FatalResponse::Dismiss
        }
    }

    async fn open_path(&self, path: &Path) -> io::Result<()> {
        let opener = match std::env::consts::OS {
            "macos" => "open",
            "windows" => "explorer",
            _ => "xdg-open",
        };

        let status = tokio::process::Command::new(opener).arg(path).status().await?;
        // explorer.exe exits with 1 even on success
        if status.success() || std::env::consts::OS == "windows" {
            Ok(())
        } else {
            Err(io::Error::other(format!("{opener} exited with {status}")))
        }
    }
}
