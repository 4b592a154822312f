//! Manifest types describing what a fresh backup must contain.
//!
//! A manifest is supplied by the configuration collaborator and lists every
//! file or directory to capture together with the name it gets in the archive.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

use super::validate::validate_entry;
use crate::utils::{BackupError, Result};

/// Whether a manifest entry names a single file or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One source to capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub source_path: PathBuf,
    pub archive_name: String,
    pub kind: EntryKind,
}

impl ManifestEntry {
    pub fn file(source_path: impl Into<PathBuf>, archive_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            archive_name: archive_name.into(),
            kind: EntryKind::File,
        }
    }

    pub fn directory(source_path: impl Into<PathBuf>, archive_name: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            archive_name: archive_name.into(),
            kind: EntryKind::Directory,
        }
    }
}

/// Ordered list of sources for one backup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(entries: Vec<ManifestEntry>) -> Self {
        Self { entries }
    }

    /// Check that archive names are unique, relative and free of traversal.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for entry in &self.entries {
            let normalized = validate_entry(&entry.archive_name)
                .map_err(|e| BackupError::InvalidManifest(e.to_string()))?;
            if normalized != entry.archive_name {
                return Err(BackupError::InvalidManifest(format!(
                    "archive name is not in normal form: {}",
                    entry.archive_name
                )));
            }
            if !seen.insert(normalized) {
                return Err(BackupError::InvalidManifest(format!(
                    "duplicate archive name: {}",
                    entry.archive_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_manifest() {
        let manifest = Manifest::new(vec![
            ManifestEntry::file("/data/config.yaml", "config.yaml"),
            ManifestEntry::directory("/data/themes", "themes"),
        ]);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_duplicate_archive_names_rejected() {
        let manifest = Manifest::new(vec![
            ManifestEntry::file("/a/config.yaml", "config.yaml"),
            ManifestEntry::file("/b/config.yaml", "config.yaml"),
        ]);
        assert!(matches!(
            manifest.validate(),
            Err(BackupError::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_traversal_archive_name_rejected() {
        let manifest = Manifest::new(vec![ManifestEntry::file("/a/x", "../x")]);
        assert!(manifest.validate().is_err());

        let manifest = Manifest::new(vec![ManifestEntry::file("/a/x", "./x")]);
        assert!(manifest.validate().is_err());
    }
}
