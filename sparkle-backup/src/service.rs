//! Backup service: the operations the application exposes, wired together.
//!
//! Each call resolves its transport through the shared [`TransportFactory`], so
//! repeated operations against the same store reuse one adapter.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::catalog;
use crate::config::ConfigSource;
use crate::producer::BackupProducer;
use crate::restore::{OperatorNotifier, RestoreLocks, RestoreManager, RestoreReport};
use crate::transport::{BackupDescriptor, TransportConfig, TransportFactory};
use crate::utils::Result;

#[derive(Clone)]
pub struct BackupService {
    source: Arc<dyn ConfigSource>,
    factory: TransportFactory,
    producer: BackupProducer,
    locks: RestoreLocks,
    restorer: RestoreManager,
}

impl BackupService {
    pub fn new(source: Arc<dyn ConfigSource>, work_dir: impl Into<PathBuf>) -> Self {
        let locks = RestoreLocks::new();
        let restorer = RestoreManager::new(source.data_root(), work_dir).with_locks(locks.clone());
        Self {
            source,
            factory: TransportFactory::new(),
            producer: BackupProducer::default(),
            locks,
            restorer,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.restorer = self.restorer.with_notifier(notifier);
        self
    }

    pub fn with_producer(mut self, producer: BackupProducer) -> Self {
        self.producer = producer;
        self
    }

    pub fn factory(&self) -> &TransportFactory {
        &self.factory
    }

    /// Archive the live data and upload it to `target`.
    pub async fn backup(&self, target: &TransportConfig) -> Result<BackupDescriptor> {
        let transport = self.factory.get(target).await?;
        let _guard = self.locks.acquire(&self.source.data_root()).await;
        self.producer
            .produce(&self.source.manifest(), transport.as_ref())
            .await
    }

    /// Backups stored in `target`, newest first.
    pub async fn list(&self, target: &TransportConfig) -> Result<Vec<BackupDescriptor>> {
        let transport = self.factory.get(target).await?;
        catalog::list_available(transport.as_ref()).await
    }

    pub async fn delete(&self, target: &TransportConfig, name: &str) -> Result<()> {
        let transport = self.factory.get(target).await?;
        catalog::remove(transport.as_ref(), name).await
    }

    /// Restore the backup `name` from `target` into the live data root.
    pub async fn restore(&self, target: &TransportConfig, name: &str) -> Result<RestoreReport> {
        let transport = self.factory.get(target).await?;
        let report = self.restorer.restore(transport.as_ref(), name).await?;
        info!("{} from {}", report.summary(), name);
        Ok(report)
    }

    /// Restore from a zip file on the local filesystem.
    pub async fn restore_file(&self, zip_path: &Path) -> Result<RestoreReport> {
        let report = self.restorer.restore_from_file(zip_path).await?;
        info!("{} from {}", report.summary(), zip_path.display());
        Ok(report)
    }
}
