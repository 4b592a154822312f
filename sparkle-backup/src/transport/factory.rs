//! Adapter factory.
//!
//! Constructs transports on first use and hands out the same instance for the
//! same configuration afterwards, so the HTTP client behind a WebDAV store is
//! reused across operations. The factory is owned by the caller; there is no
//! process-wide registry.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use super::local::LocalTransport;
use super::webdav::{WebDavConfig, WebDavTransport};
use super::Transport;
use crate::utils::Result;

/// Everything needed to construct one transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TransportConfig {
    Local { dir: PathBuf },
    WebDav(WebDavConfig),
}

/// Caches one adapter per configuration tuple.
#[derive(Clone, Default)]
pub struct TransportFactory {
    adapters: Arc<RwLock<HashMap<TransportConfig, Arc<dyn Transport>>>>,
}

impl TransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached adapter for `config`, constructing it if needed.
    ///
    /// Construction validates the configuration (e.g. the WebDAV URL scheme),
    /// so an invalid configuration is never cached.
    pub async fn get(&self, config: &TransportConfig) -> Result<Arc<dyn Transport>> {
        if let Some(adapter) = self.adapters.read().await.get(config) {
            return Ok(adapter.clone());
        }

        let mut adapters = self.adapters.write().await;
        if let Some(adapter) = adapters.get(config) {
            return Ok(adapter.clone());
        }

        let adapter: Arc<dyn Transport> = match config {
            TransportConfig::Local { dir } => Arc::new(LocalTransport::new(dir.clone())),
            TransportConfig::WebDav(webdav) => Arc::new(WebDavTransport::new(webdav)?),
        };
        debug!("Created {} transport", adapter.backend());
        adapters.insert(config.clone(), adapter.clone());
        Ok(adapter)
    }

    /// Number of cached adapters
    pub async fn cached_count(&self) -> usize {
        self.adapters.read().await.len()
    }
}
