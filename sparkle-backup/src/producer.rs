//! Backup producer: archive the current state and upload it.

use chrono::{Local, NaiveDateTime};
use tracing::info;

use crate::archive::{self, manifest::Manifest};
use crate::transport::{backup_file_name, BackupDescriptor, PlatformTag, Transport};
use crate::utils::{BackupError, Result};

#[derive(Debug, Clone, Copy)]
pub struct BackupProducer {
    platform: PlatformTag,
}

impl Default for BackupProducer {
    fn default() -> Self {
        Self::new(PlatformTag::current())
    }
}

impl BackupProducer {
    pub fn new(platform: PlatformTag) -> Self {
        Self { platform }
    }

    /// Build an archive from `manifest` and upload it under a fresh name.
    pub async fn produce(
        &self,
        manifest: &Manifest,
        transport: &dyn Transport,
    ) -> Result<BackupDescriptor> {
        self.produce_at(manifest, transport, Local::now().naive_local()).await
    }

    /// As [`produce`](Self::produce), naming the archive after `at`.
    ///
    /// Fails with [`BackupError::NoContent`] without uploading anything when
    /// none of the manifest sources exist.
    pub async fn produce_at(
        &self,
        manifest: &Manifest,
        transport: &dyn Transport,
        at: NaiveDateTime,
    ) -> Result<BackupDescriptor> {
        let manifest = manifest.clone();
        let (entries, bytes) = tokio::task::spawn_blocking(move || {
            let archive = archive::build(&manifest)?;
            let bytes = archive.encode()?;
            Ok::<_, BackupError>((archive.len(), bytes))
        })
        .await
        .map_err(|e| BackupError::Io(std::io::Error::other(format!("archive task failed: {e}"))))??;

        let name = backup_file_name(self.platform, at);
        let size = bytes.len();
        transport.upload(&name, bytes).await?;

        info!(
            "Backup {} uploaded to {} ({} entries, {} bytes)",
            name,
            transport.backend(),
            entries,
            size
        );
        Ok(BackupDescriptor::parse(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::ManifestEntry;
    use crate::transport::LocalTransport;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 7, 14)
            .unwrap()
            .and_hms_opt(18, 5, 0)
            .unwrap()
    }

    #[tokio::test]
    async fn test_produce_uploads_named_archive() {
        let data = TempDir::new().unwrap();
        std::fs::write(data.path().join("config.yaml"), b"a: 1").unwrap();
        let store = TempDir::new().unwrap();
        let transport = LocalTransport::new(store.path());

        let manifest = Manifest::new(vec![ManifestEntry::file(
            data.path().join("config.yaml"),
            "config.yaml",
        )]);
        let descriptor = BackupProducer::new(PlatformTag::Linux)
            .produce_at(&manifest, &transport, at())
            .await
            .unwrap();

        assert_eq!(descriptor.name, "linux_2024-07-14_18-05-00.zip");
        assert!(descriptor.is_conventional());

        let bytes = std::fs::read(store.path().join(&descriptor.name)).unwrap();
        let entries = archive::parse(&bytes).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].data, b"a: 1");
    }

    #[tokio::test]
    async fn test_empty_manifest_uploads_nothing() {
        let data = TempDir::new().unwrap();
        let store = TempDir::new().unwrap();
        let transport = LocalTransport::new(store.path());

        let manifest = Manifest::new(vec![
            ManifestEntry::file(data.path().join("config.yaml"), "config.yaml"),
            ManifestEntry::directory(data.path().join("profiles"), "profiles"),
        ]);
        let result = BackupProducer::default().produce(&manifest, &transport).await;

        assert!(matches!(result, Err(BackupError::NoContent)));
        assert_eq!(std::fs::read_dir(store.path()).unwrap().count(), 0);
    }
}
