//! Transactional restore of a backup archive into the live data directory.
//!
//! A restore runs as one [`RestoreTransaction`]:
//!
//! 1. **Validating**: check the backup name, fetch and decode the archive and
//!    validate every entry (traversal and whitelist) before touching disk.
//! 2. **Staging**: extract the validated archive into a fresh work directory.
//! 3. **Snapshotting**: copy every whitelisted item currently in the data
//!    directory into a fresh snapshot directory.
//! 4. **Swapping**: replace each staged top-level item in the data directory.
//! 5. **Committed**: drop the snapshot.
//!
//! A failure in steps 2-4 moves to **RollingBack**. Once swapping has begun,
//! touched items are deleted and copied back from the snapshot. If that loop
//! fails too the transaction ends in **RollbackFailed**, the snapshot is left
//! in place and the operator is told where it is. The staging directory is removed in every case.
//!
//! Callers must not run two transactions against the same data directory at
//! once; [`RestoreManager`] takes a [`RestoreLocks`] guard for that.

pub mod lock;
pub mod notify;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tempfile::TempDir;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::archive;
use crate::archive::validate::{validate_archive, validate_filename, ValidatedEntry, Whitelist};
use crate::fs::{FsOps, LocalFs};
use crate::transport::Transport;
use crate::utils::{BackupError, Result};
pub use lock::RestoreLocks;
pub use notify::{FatalResponse, LogNotifier, OperatorNotifier, SystemNotifier};

const STAGING_PREFIX: &str = "restore-staging-";
const SNAPSHOT_PREFIX: &str = "restore-snapshot-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Validating,
    Staging,
    Snapshotting,
    Swapping,
    Committed,
    RollingBack,
    RolledBack,
    RollbackFailed,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed
                | TransactionState::RolledBack
                | TransactionState::RollbackFailed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Idle => "idle",
            TransactionState::Validating => "validating",
            TransactionState::Staging => "staging",
            TransactionState::Snapshotting => "snapshotting",
            TransactionState::Swapping => "swapping",
            TransactionState::Committed => "committed",
            TransactionState::RollingBack => "rolling back",
            TransactionState::RolledBack => "rolled back",
            TransactionState::RollbackFailed => "rollback failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a committed restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Top-level items that were replaced or created, sorted.
    pub restored: Vec<String>,
    /// Number of archive entries extracted.
    pub entries: usize,
}

impl RestoreReport {
    pub fn summary(&self) -> String {
        format!(
            "Restored {} ({} archive entries)",
            self.restored.join(", "),
            self.entries
        )
    }
}

/// One restore attempt against one data directory.
pub struct RestoreTransaction {
    target_root: PathBuf,
    work_dir: PathBuf,
    whitelist: Whitelist,
    fs: Arc<dyn FsOps>,
    notifier: Arc<dyn OperatorNotifier>,
    state: TransactionState,
    snapshot_dir: Option<PathBuf>,
    swap_started: bool,
}

impl RestoreTransaction {
    pub fn new(
        target_root: impl Into<PathBuf>,
        work_dir: impl Into<PathBuf>,
        whitelist: Whitelist,
        fs: Arc<dyn FsOps>,
        notifier: Arc<dyn OperatorNotifier>,
    ) -> Self {
        Self {
            target_root: target_root.into(),
            work_dir: work_dir.into(),
            whitelist,
            fs,
            notifier,
            state: TransactionState::Idle,
            snapshot_dir: None,
            swap_started: false,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Snapshot directory, while it exists.
    pub fn snapshot_dir(&self) -> Option<&Path> {
        self.snapshot_dir.as_deref()
    }

    fn transition(&mut self, next: TransactionState) {
        info!("Restore into {}: {} -> {}", self.target_root.display(), self.state, next);
        self.state = next;
    }

    /// Fetch `name` from `transport` and restore it.
    pub async fn execute(
        &mut self,
        transport: &dyn Transport,
        name: &str,
    ) -> Result<RestoreReport> {
        self.transition(TransactionState::Validating);
        validate_filename(name)?;

        let bytes = transport.download(name).await?;
        info!("Fetched {} ({} bytes) from {}", name, bytes.len(), transport.backend());

        self.execute_archive(&bytes).await
    }

    /// Restore from archive bytes already in memory.
    ///
    /// Validation failures return before anything is written. Once staging has
    /// begun the transaction always ends in a terminal state.
    pub async fn execute_archive(&mut self, bytes: &[u8]) -> Result<RestoreReport> {
        if self.state != TransactionState::Validating {
            self.transition(TransactionState::Validating);
        }

        let entries = validate_archive(archive::parse(bytes)?, &self.whitelist)?;
        if entries.is_empty() {
            return Err(BackupError::Archive("archive contains no entries".to_string()));
        }

        let entry_count = entries.len();
        let mut staging = None;
        let outcome = self.stage_snapshot_swap(entries, &mut staging).await;

        let result = match outcome {
            Ok(restored) => {
                self.commit().await;
                Ok(RestoreReport {
                    restored,
                    entries: entry_count,
                })
            }
            Err(cause) => {
                let staging_path = staging.as_ref().map(|dir: &TempDir| dir.path());
                Err(self.roll_back(staging_path, cause).await)
            }
        };

        if let Some(dir) = staging {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!(
                    "Failed to clean up staging directory, please delete it manually: {} ({})",
                    path.display(),
                    e
                );
            }
        }

        result
    }

    async fn stage_snapshot_swap(
        &mut self,
        entries: Vec<ValidatedEntry>,
        staging: &mut Option<TempDir>,
    ) -> Result<Vec<String>> {
        self.transition(TransactionState::Staging);
        tokio::fs::create_dir_all(&self.work_dir).await?;

        let work_dir = self.work_dir.clone();
        let staged = tokio::task::spawn_blocking(move || -> io::Result<TempDir> {
            let dir = tempfile::Builder::new()
                .prefix(STAGING_PREFIX)
                .tempdir_in(&work_dir)?;
            archive::extract_to(&entries, dir.path())?;
            Ok(dir)
        })
        .await
        .map_err(|e| io::Error::other(format!("staging task failed: {e}")))??;
        let staging_path = staged.path().to_path_buf();
        *staging = Some(staged);

        self.transition(TransactionState::Snapshotting);
        self.snapshot().await?;

        self.transition(TransactionState::Swapping);
        self.swap(&staging_path).await
    }

    /// Copy every whitelisted item present in the target into a new snapshot dir.
    async fn snapshot(&mut self) -> Result<()> {
        let snapshot_dir = self.work_dir.join(format!(
            "{}{}-{}",
            SNAPSHOT_PREFIX,
            Local::now().format("%Y%m%d-%H%M%S%.3f"),
            Uuid::new_v4().simple()
        ));
        tokio::fs::create_dir_all(&snapshot_dir).await?;
        self.snapshot_dir = Some(snapshot_dir.clone());

        for name in self.whitelist.iter() {
            let source = self.target_root.join(name);
            if !exists(&source).await {
                continue;
            }
            self.fs
                .copy_all(&source, &snapshot_dir.join(name))
                .await
                .map_err(|e| BackupError::WriteFailure {
                    path: snapshot_dir.join(name),
                    source: e,
                })?;
        }

        info!("Snapshot of {} saved to {}", self.target_root.display(), snapshot_dir.display());
        Ok(())
    }

    /// Replace each staged top-level item in the target, one at a time.
    async fn swap(&mut self, staging: &Path) -> Result<Vec<String>> {
        self.swap_started = true;
        tokio::fs::create_dir_all(&self.target_root)
            .await
            .map_err(|e| BackupError::WriteFailure {
                path: self.target_root.clone(),
                source: e,
            })?;

        let mut restored = Vec::new();
        for name in self.staged_names(staging).await? {
            let dest = self.target_root.join(&name);
            self.fs
                .remove_all(&dest)
                .await
                .map_err(|e| BackupError::WriteFailure {
                    path: dest.clone(),
                    source: e,
                })?;
            self.fs
                .copy_all(&staging.join(&name), &dest)
                .await
                .map_err(|e| BackupError::WriteFailure {
                    path: dest.clone(),
                    source: e,
                })?;
            restored.push(name);
        }

        Ok(restored)
    }

    /// Whitelisted top-level names in the staging directory, sorted.
    async fn staged_names(&self, staging: &Path) -> io::Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(staging).await?;
        let mut names = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            if let Ok(name) = entry.file_name().into_string() {
                if self.whitelist.contains(&name) {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn commit(&mut self) {
        self.transition(TransactionState::Committed);
        if let Some(snapshot) = self.snapshot_dir.clone() {
            match self.fs.remove_all(&snapshot).await {
                Ok(_) => self.snapshot_dir = None,
                Err(e) => warn!(
                    "Failed to clean up snapshot directory {}: {}",
                    snapshot.display(),
                    e
                ),
            }
        }
    }

    /// Undo a failed restore. Returns the error to report to the caller.
    async fn roll_back(&mut self, staging: Option<&Path>, cause: BackupError) -> BackupError {
        warn!("Restore into {} failed: {}", self.target_root.display(), cause);
        self.transition(TransactionState::RollingBack);

        let snapshot = match self.snapshot_dir.clone().filter(|_| self.swap_started) {
            Some(snapshot) => snapshot,
            None => {
                // Nothing under the target root was touched yet.
                self.discard_snapshot().await;
                self.transition(TransactionState::RolledBack);
                return cause;
            }
        };

        let names = match staging {
            Some(dir) => match self.staged_names(dir).await {
                Ok(names) => names,
                Err(e) => {
                    warn!("Failed to read staging directory, rolling back whole whitelist: {}", e);
                    self.whitelist.iter().map(str::to_string).collect()
                }
            },
            None => self.whitelist.iter().map(str::to_string).collect(),
        };

        match self.restore_from_snapshot(&names, &snapshot).await {
            Ok(()) => {
                self.discard_snapshot().await;
                self.transition(TransactionState::RolledBack);
                info!("Rolled back {} item(s) in {}", names.len(), self.target_root.display());
                cause
            }
            Err(e) => {
                self.transition(TransactionState::RollbackFailed);
                error!(
                    "Rollback of {} failed: {}. Original configuration kept at {}",
                    self.target_root.display(),
                    e,
                    snapshot.display()
                );

                let failure = BackupError::RollbackFailure {
                    snapshot_dir: snapshot.clone(),
                    cause: format!("{cause}; rollback: {e}"),
                };
                self.escalate(&failure, &snapshot).await;
                failure
            }
        }
    }

    async fn restore_from_snapshot(&self, names: &[String], snapshot: &Path) -> io::Result<()> {
        for name in names {
            let dest = self.target_root.join(name);
            self.fs.remove_all(&dest).await?;

            let saved = snapshot.join(name);
            if exists(&saved).await {
                self.fs.copy_all(&saved, &dest).await?;
            }
        }
        Ok(())
    }

    async fn discard_snapshot(&mut self) {
        if let Some(snapshot) = self.snapshot_dir.take() {
            if let Err(e) = self.fs.remove_all(&snapshot).await {
                warn!("Failed to remove snapshot directory {}: {}", snapshot.display(), e);
                self.snapshot_dir = Some(snapshot);
            }
        }
    }

    async fn escalate(&self, failure: &BackupError, snapshot: &Path) {
        match self.notifier.notify_fatal(&failure.to_string(), snapshot).await {
            FatalResponse::OpenRecoveryDir => {
                if let Err(e) = self.notifier.open_path(snapshot).await {
                    warn!("Failed to open {}: {}", snapshot.display(), e);
                }
            }
            FatalResponse::Dismiss => {}
        }
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path).await.is_ok()
}

/// Runs restores against one data directory, one at a time.
#[derive(Clone)]
pub struct RestoreManager {
    target_root: PathBuf,
    work_dir: PathBuf,
    whitelist: Whitelist,
    fs: Arc<dyn FsOps>,
    notifier: Arc<dyn OperatorNotifier>,
    locks: RestoreLocks,
}

impl RestoreManager {
    pub fn new(target_root: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_root: target_root.into(),
            work_dir: work_dir.into(),
            whitelist: Whitelist::default(),
            fs: Arc::new(LocalFs),
            notifier: Arc::new(LogNotifier),
            locks: RestoreLocks::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FsOps>) -> Self {
        self.fs = fs;
        self
    }

    /// Share locks with other components working on the same data directory.
    pub fn with_locks(mut self, locks: RestoreLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = whitelist;
        self
    }

    pub fn target_root(&self) -> &Path {
        &self.target_root
    }

    /// A fresh transaction bound to this manager's data directory.
    pub fn transaction(&self) -> RestoreTransaction {
        RestoreTransaction::new(
            self.target_root.clone(),
            self.work_dir.clone(),
            self.whitelist.clone(),
            self.fs.clone(),
            self.notifier.clone(),
        )
    }

    /// Restore the backup `name` stored in `transport`.
    pub async fn restore(&self, transport: &dyn Transport, name: &str) -> Result<RestoreReport> {
        let _guard = self.locks.acquire(&self.target_root).await;
        self.transaction().execute(transport, name).await
    }

    /// Restore from a zip file anywhere on the local filesystem.
    pub async fn restore_from_file(&self, zip_path: &Path) -> Result<RestoreReport> {
        let is_zip = zip_path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("zip"))
            .unwrap_or(false);
        if !is_zip {
            return Err(BackupError::InvalidFilename(format!(
                "only .zip backups can be restored: {}",
                zip_path.display()
            )));
        }

        let bytes = match tokio::fs::read(zip_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(zip_path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let _guard = self.locks.acquire(&self.target_root).await;
        self.transaction().execute_archive(&bytes).await
    }
}
