//! Error taxonomy for backup and restore.
//!
//! Every failure the subsystem can report is one variant of [`BackupError`], so
//! callers can tell a bad input from a transport hiccup from a fatal rollback
//! failure without looking at message strings.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid backup filename: {0}")]
    InvalidFilename(String),

    #[error("Invalid WebDAV URL: {0}")]
    InvalidRemoteUrl(String),

    #[error("Unsafe path in archive: {0}")]
    Traversal(String),

    #[error("Archive entry outside the restorable set: {0}")]
    Whitelist(String),

    #[error("Invalid backup manifest: {0}")]
    InvalidManifest(String),

    #[error("Nothing to back up: none of the configured files or directories exist")]
    NoContent,

    #[error("{backend} transport error: {message}")]
    Transport {
        backend: &'static str,
        message: String,
    },

    #[error("Backup not found: {0}")]
    NotFound(String),

    #[error("Corrupt archive: {0}")]
    Archive(String),

    #[error("Failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "Restore failed and automatic rollback failed ({cause}). \
         Your previous configuration was saved to {}; \
         copy its contents back into the data directory to recover",
        snapshot_dir.display()
    )]
    RollbackFailure {
        snapshot_dir: PathBuf,
        cause: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`BackupError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any I/O.
    InvalidInput,
    /// Archive content rejected before extraction.
    UnsafeArchive,
    NoContent,
    Transport,
    NotFound,
    /// Restore failed and was rolled back, or a local I/O step failed.
    Write,
    /// Rollback failed; operator action required.
    Fatal,
}

impl BackupError {
    pub(crate) fn transport(backend: &'static str, message: impl Into<String>) -> Self {
        BackupError::Transport {
            backend,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::InvalidFilename(_)
            | BackupError::InvalidRemoteUrl(_)
            | BackupError::InvalidManifest(_)
            | BackupError::Config(_) => ErrorKind::InvalidInput,
            BackupError::Traversal(_) | BackupError::Whitelist(_) | BackupError::Archive(_) => {
                ErrorKind::UnsafeArchive
            }
            BackupError::NoContent => ErrorKind::NoContent,
            BackupError::Transport { .. } => ErrorKind::Transport,
            BackupError::NotFound(_) => ErrorKind::NotFound,
            BackupError::WriteFailure { .. } | BackupError::Io(_) => ErrorKind::Write,
            BackupError::RollbackFailure { .. } => ErrorKind::Fatal,
        }
    }

    /// Only transport failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(BackupError::NoContent.kind(), ErrorKind::NoContent);
        assert_eq!(
            BackupError::Traversal("../evil".into()).kind(),
            ErrorKind::UnsafeArchive
        );
        assert!(BackupError::transport("WebDAV", "connection refused").is_retryable());
        assert!(!BackupError::InvalidFilename("a/b.zip".into()).is_retryable());
    }

    #[test]
    fn test_rollback_failure_names_snapshot_dir() {
        let err = BackupError::RollbackFailure {
            snapshot_dir: PathBuf::from("/tmp/sparkle-backup/snapshot-1"),
            cause: "permission denied".into(),
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("/tmp/sparkle-backup/snapshot-1"));
    }
}
