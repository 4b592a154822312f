//! Transport adapters: where archives are stored.
//!
//! Both backends expose the same four capabilities through [`Transport`]:
//! upload, download, list and delete a named archive. Names passed in are
//! validated by each adapter before they reach a path or URL.

pub mod factory;
pub mod local;
pub mod naming;
pub mod webdav;

use async_trait::async_trait;
use globset::{Glob, GlobMatcher};

use crate::utils::{BackupError, Result};
pub use factory::{TransportConfig, TransportFactory};
pub use local::LocalTransport;
pub use naming::{backup_file_name, BackupDescriptor, PlatformTag};
pub use webdav::{validate_remote_url, WebDavConfig, WebDavTransport};

/// Glob applied by `list` when the caller passes none.
pub const DEFAULT_LIST_GLOB: &str = "*.zip";

#[async_trait]
pub trait Transport: Send + Sync {
    /// Short backend name for logs and errors.
    fn backend(&self) -> &'static str;

    async fn upload(&self, name: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch a stored archive. Fails with [`BackupError::NotFound`] if absent.
    async fn download(&self, name: &str) -> Result<Vec<u8>>;

    /// Describe stored archives whose names match `glob` (default `*.zip`).
    async fn list(&self, glob: Option<&str>) -> Result<Vec<BackupDescriptor>>;

    async fn delete(&self, name: &str) -> Result<()>;
}

pub(crate) fn compile_glob(glob: Option<&str>) -> Result<GlobMatcher> {
    let pattern = glob.unwrap_or(DEFAULT_LIST_GLOB);
    Glob::new(pattern)
        .map(|g| g.compile_matcher())
        .map_err(|e| BackupError::Config(format!("invalid glob {pattern:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_glob() {
        let default = compile_glob(None).unwrap();
        assert!(default.is_match("linux_2023-06-01_00-00-00.zip"));
        assert!(!default.is_match("notes.txt"));

        let linux = compile_glob(Some("linux_*.zip")).unwrap();
        assert!(!linux.is_match("win32_2024-01-01_00-00-00.zip"));

        assert!(compile_glob(Some("[")).is_err());
    }
}
