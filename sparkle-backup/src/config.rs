//! Configuration for the backup tool.
//!
//! Two concerns live here: the TOML settings file ([`Config`]) and the
//! [`ConfigSource`] collaborator that tells the producer what to archive and
//! the restorer where the live data lives.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::archive::manifest::{Manifest, ManifestEntry};
use crate::transport::{TransportConfig, WebDavConfig};
use crate::utils::{BackupError, Result};

/// Supplies the backup manifest and the live data root.
pub trait ConfigSource: Send + Sync {
    /// Items to archive, mapped to their names inside the archive.
    fn manifest(&self) -> Manifest;

    /// Directory restores write into.
    fn data_root(&self) -> PathBuf;
}

/// Files under the data root that make up a backup.
const LAYOUT_FILES: [&str; 4] = ["config.yaml", "mihomo.yaml", "profile.yaml", "override.yaml"];
const LAYOUT_DIRS: [&str; 4] = ["themes", "profiles", "override", "substore"];

/// The standard data directory layout: every whitelisted item sits directly
/// below one root and is archived under its own name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ConfigSource for DataLayout {
    fn manifest(&self) -> Manifest {
        let files = LAYOUT_FILES
            .iter()
            .map(|name| ManifestEntry::file(self.root.join(name), *name));
        let dirs = LAYOUT_DIRS
            .iter()
            .map(|name| ManifestEntry::directory(self.root.join(name), *name));
        Manifest::new(files.chain(dirs).collect())
    }

    fn data_root(&self) -> PathBuf {
        self.root.clone()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub local: LocalConfig,

    #[serde(default)]
    pub webdav: Option<WebDavConfig>,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Live data root
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,

    /// Parent of staging and snapshot directories
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding local backups
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            work_dir: default_work_dir(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default values
fn default_data_dir() -> PathBuf {
    let config_home = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    config_home.join("sparkle")
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("sparkle-backup")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            local: LocalConfig::default(),
            webdav: None,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BackupError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| BackupError::Config(e.to_string()))
    }

    /// Layout of the configured data root.
    pub fn layout(&self) -> DataLayout {
        DataLayout::new(self.data.dir.clone())
    }

    pub fn local_transport(&self) -> Result<TransportConfig> {
        match &self.local.backup_dir {
            Some(dir) => Ok(TransportConfig::Local { dir: dir.clone() }),
            None => Err(BackupError::Config(
                "no local backup directory configured (set local.backup_dir)".to_string(),
            )),
        }
    }

    pub fn webdav_transport(&self) -> Result<TransportConfig> {
        match &self.webdav {
            Some(webdav) => Ok(TransportConfig::WebDav(webdav.clone())),
            None => Err(BackupError::Config("no [webdav] section configured".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::manifest::EntryKind;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [data]
            dir = "/srv/sparkle"
            work_dir = "/srv/work"

            [local]
            backup_dir = "/srv/backups"

            [webdav]
            url = "https://dav.example.com/files/me"
            username = "me"
            password = "secret"

            [log]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.data.dir, PathBuf::from("/srv/sparkle"));
        assert_eq!(config.data.work_dir, PathBuf::from("/srv/work"));
        assert_eq!(config.log.level, "debug");
        assert_eq!(
            config.local_transport().unwrap(),
            TransportConfig::Local {
                dir: PathBuf::from("/srv/backups")
            }
        );

        let webdav = config.webdav.as_ref().unwrap();
        assert_eq!(webdav.dir, "sparkle");
        assert!(matches!(
            config.webdav_transport().unwrap(),
            TransportConfig::WebDav(_)
        ));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert!(config.data.dir.ends_with("sparkle"));
        assert!(config.data.work_dir.ends_with("sparkle-backup"));
        assert_eq!(config.log.level, "info");
        assert!(matches!(config.local_transport(), Err(BackupError::Config(_))));
        assert!(matches!(config.webdav_transport(), Err(BackupError::Config(_))));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        assert!(matches!(
            Config::from_toml("[data\ndir = 1"),
            Err(BackupError::Config(_))
        ));
        assert!(matches!(
            Config::from_file(Path::new("/nonexistent/sparkle-backup.toml")),
            Err(BackupError::Config(_))
        ));
    }

    #[test]
    fn test_layout_manifest_covers_whitelist() {
        let layout = DataLayout::new("/data");
        let manifest = layout.manifest();

        assert_eq!(manifest.entries.len(), 8);
        assert!(manifest.validate().is_ok());
        assert_eq!(layout.data_root(), PathBuf::from("/data"));

        let themes = manifest
            .entries
            .iter()
            .find(|e| e.archive_name == "themes")
            .unwrap();
        assert_eq!(themes.kind, EntryKind::Directory);
        assert_eq!(themes.source_path, PathBuf::from("/data/themes"));
    }
}
