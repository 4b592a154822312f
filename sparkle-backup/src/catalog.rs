//! Backup catalog: the sorted view of archives a transport holds.

use tracing::info;

use crate::archive::validate::validate_filename;
use crate::transport::{BackupDescriptor, Transport};
use crate::utils::Result;

/// List conventional backups, newest first.
///
/// Names embed a fixed-width timestamp, so descending name order is
/// descending time order for archives of the same platform.
pub async fn list_available(transport: &dyn Transport) -> Result<Vec<BackupDescriptor>> {
    let mut backups: Vec<BackupDescriptor> = transport
        .list(None)
        .await?
        .into_iter()
        .filter(BackupDescriptor::is_conventional)
        .collect();

    backups.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(backups)
}

/// Delete a backup by name after validating the name.
pub async fn remove(transport: &dyn Transport, name: &str) -> Result<()> {
    validate_filename(name)?;
    transport.delete(name).await?;
    info!("Removed {} backup {}", transport.backend(), name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use crate::utils::BackupError;
    use tempfile::TempDir;

    fn seeded_dir() -> TempDir {
        let temp = TempDir::new().unwrap();
        for name in [
            "win32_2024-01-01_00-00-00.zip",
            "linux_2023-06-01_00-00-00.zip",
            "notes.txt",
        ] {
            std::fs::write(temp.path().join(name), b"x").unwrap();
        }
        temp
    }

    #[tokio::test]
    async fn test_list_available_newest_first() {
        let temp = seeded_dir();
        std::fs::write(temp.path().join("linux_2024-05-01_08-30-00.zip"), b"x").unwrap();
        std::fs::write(temp.path().join("linux_2023-12-31_23-59-59.zip"), b"x").unwrap();
        let transport = LocalTransport::new(temp.path());

        let names: Vec<String> = list_available(&transport)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(
            names,
            vec![
                "win32_2024-01-01_00-00-00.zip",
                "linux_2024-05-01_08-30-00.zip",
                "linux_2023-12-31_23-59-59.zip",
                "linux_2023-06-01_00-00-00.zip",
            ]
        );
    }

    #[tokio::test]
    async fn test_catalog_ordering() {
        let temp = seeded_dir();
        let transport = LocalTransport::new(temp.path());

        let names: Vec<String> = list_available(&transport)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();

        assert_eq!(
            names,
            vec!["win32_2024-01-01_00-00-00.zip", "linux_2023-06-01_00-00-00.zip"]
        );
    }

    #[tokio::test]
    async fn test_remove_validates_name() {
        let temp = seeded_dir();
        let transport = LocalTransport::new(temp.path());

        assert!(matches!(
            remove(&transport, "../notes.txt").await,
            Err(BackupError::InvalidFilename(_))
        ));

        remove(&transport, "linux_2023-06-01_00-00-00.zip").await.unwrap();
        assert!(!temp.path().join("linux_2023-06-01_00-00-00.zip").exists());
        assert!(temp.path().join("notes.txt").exists());
    }
}
