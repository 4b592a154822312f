//! Local directory transport.
//!
//! Archives live as plain files in an operator-chosen directory. Every
//! operation first checks that the directory exists, is a directory and is
//! writable.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::naming::BackupDescriptor;
use super::{compile_glob, Transport};
use crate::archive::validate::validate_filename;
use crate::utils::{BackupError, Result};

const BACKEND: &str = "local";

#[derive(Debug, Clone)]
pub struct LocalTransport {
    dir: PathBuf,
}

impl LocalTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Check that the backup directory exists, is a directory and accepts writes.
    pub async fn ensure_writable_dir(&self) -> Result<()> {
        let metadata = match tokio::fs::metadata(&self.dir).await {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::transport(
                    BACKEND,
                    format!("backup directory does not exist: {}", self.dir.display()),
                ))
            }
            Err(e) => return Err(self.io_error("cannot access backup directory", e)),
        };

        if !metadata.is_dir() {
            return Err(BackupError::transport(
                BACKEND,
                format!("backup path is not a directory: {}", self.dir.display()),
            ));
        }

        let dir = self.dir.clone();
        let probe = tokio::task::spawn_blocking(move || tempfile::tempfile_in(&dir))
            .await
            .map_err(|e| BackupError::transport(BACKEND, format!("probe task failed: {e}")))?;
        probe
            .map(drop)
            .map_err(|e| self.io_error("backup directory is not writable", e))
    }

    /// Resolve a validated name inside the backup directory.
    fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_filename(name)?;
        let path = self.dir.join(name);
        match path.strip_prefix(&self.dir) {
            Ok(rel) if rel == Path::new(name) => Ok(path),
            _ => Err(BackupError::InvalidFilename(name.to_string())),
        }
    }

    fn io_error(&self, context: &str, e: io::Error) -> BackupError {
        BackupError::transport(BACKEND, format!("{context} ({}): {e}", self.dir.display()))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(name)?;
        self.ensure_writable_dir().await?;

        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    error!(
                        "Failed to clean up incomplete backup file {}: {}",
                        path.display(),
                        cleanup
                    );
                }
            }
            return Err(self.io_error("failed to write backup", e));
        }

        info!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    async fn download(&self, name: &str) -> Result<Vec<u8>> {
        let path = self.path_for(name)?;
        self.ensure_writable_dir().await?;

        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BackupError::NotFound(name.to_string()))
            }
            Err(e) => Err(self.io_error("failed to read backup", e)),
        }
    }

    async fn list(&self, glob: Option<&str>) -> Result<Vec<BackupDescriptor>> {
        let matcher = compile_glob(glob)?;
        self.ensure_writable_dir().await?;

        let mut dir = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| self.io_error("cannot read backup directory", e))?;

        let mut backups = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| self.io_error("cannot read backup directory", e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if !is_file || !matcher.is_match(&name) {
                continue;
            }

            let descriptor = BackupDescriptor::parse(&name);
            if descriptor.is_conventional() {
                backups.push(descriptor);
            } else {
                debug!("Ignoring non-backup file in backup directory: {}", name);
            }
        }

        Ok(backups)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        self.ensure_writable_dir().await?;

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted backup {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(BackupError::NotFound(name.to_string()))
            }
            Err(e) => Err(self.io_error("failed to delete backup", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path());
        let name = "linux_2024-03-01_12-00-00.zip";

        transport.upload(name, b"zip bytes".to_vec()).await.unwrap();
        assert_eq!(transport.download(name).await.unwrap(), b"zip bytes");

        transport.delete(name).await.unwrap();
        assert!(matches!(
            transport.download(name).await,
            Err(BackupError::NotFound(_))
        ));
        assert!(matches!(
            transport.delete(name).await,
            Err(BackupError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_filters_to_naming_convention() {
        let temp = TempDir::new().unwrap();
        for name in [
            "win32_2024-01-01_00-00-00.zip",
            "linux_2023-06-01_00-00-00.zip",
            "notes.txt",
            "random.zip",
        ] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(temp.path().join("darwin_2022-01-01_00-00-00.zip")).unwrap();

        let transport = LocalTransport::new(temp.path());

        let mut names: Vec<String> = transport
            .list(None)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(
            names,
            vec!["linux_2023-06-01_00-00-00.zip", "win32_2024-01-01_00-00-00.zip"]
        );

        let all = transport.list(Some("*")).await.unwrap();
        assert_eq!(all.len(), 2);

        let linux = transport.list(Some("linux_*")).await.unwrap();
        assert_eq!(linux.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_unsafe_names() {
        let temp = TempDir::new().unwrap();
        let transport = LocalTransport::new(temp.path().join("backups"));
        std::fs::create_dir(transport.dir()).unwrap();
        std::fs::write(temp.path().join("secret.zip"), b"x").unwrap();

        for name in ["../secret.zip", "a/b.zip", "/etc/passwd"] {
            assert!(matches!(
                transport.download(name).await,
                Err(BackupError::InvalidFilename(_))
            ));
            assert!(matches!(
                transport.delete(name).await,
                Err(BackupError::InvalidFilename(_))
            ));
        }
        assert!(temp.path().join("secret.zip").exists());
    }

    #[tokio::test]
    async fn test_missing_or_non_directory_target() {
        let temp = TempDir::new().unwrap();

        let missing = LocalTransport::new(temp.path().join("nope"));
        assert!(matches!(
            missing.list(None).await,
            Err(BackupError::Transport { .. })
        ));

        std::fs::write(temp.path().join("file"), b"x").unwrap();
        let not_dir = LocalTransport::new(temp.path().join("file"));
        assert!(matches!(
            not_dir
                .upload("linux_2024-03-01_12-00-00.zip", Vec::new())
                .await,
            Err(BackupError::Transport { .. })
        ));
    }
}
