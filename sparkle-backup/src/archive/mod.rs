//! Archive codec.
//!
//! Builds a zip archive from a [`Manifest`] and decodes an archive back into
//! raw entries. Decoding never writes to disk and never trusts entry names;
//! extraction only accepts entries that already passed [`validate`].

pub mod manifest;
pub mod validate;

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::fs::walker::{walk_directory, WalkOptions};
use crate::utils::{BackupError, Result};
use manifest::{EntryKind, Manifest};
use validate::ValidatedEntry;

/// One entry of an archive being built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Relative `/`-separated path inside the archive.
    pub relative_path: String,
    /// File contents; `None` for a directory entry.
    pub bytes: Option<Vec<u8>>,
}

/// An archive assembled from a manifest. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct Archive {
    entries: Vec<ArchiveEntry>,
}

/// An entry decoded from archive bytes, name not yet validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub data: Vec<u8>,
}

impl Archive {
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of file contents.
    pub fn content_bytes(&self) -> u64 {
        self.entries
            .iter()
            .filter_map(|e| e.bytes.as_ref())
            .map(|b| b.len() as u64)
            .sum()
    }

    /// Encode as a zip container.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let file_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let dir_options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in &self.entries {
            match &entry.bytes {
                Some(bytes) => {
                    writer
                        .start_file(entry.relative_path.as_str(), file_options)
                        .map_err(|e| BackupError::Archive(e.to_string()))?;
                    writer.write_all(bytes)?;
                }
                None => {
                    writer
                        .add_directory(format!("{}/", entry.relative_path), dir_options)
                        .map_err(|e| BackupError::Archive(e.to_string()))?;
                }
            }
        }

        let cursor = writer
            .finish()
            .map_err(|e| BackupError::Archive(e.to_string()))?;
        Ok(cursor.into_inner())
    }
}

/// Read every manifest source into an archive.
///
/// Missing files and directories are skipped, as are files that exist but
/// cannot be read. Fails with [`BackupError::NoContent`] when nothing remains.
pub fn build(manifest: &Manifest) -> Result<Archive> {
    manifest.validate()?;

    let mut entries = Vec::new();

    for item in &manifest.entries {
        match item.kind {
            EntryKind::File => {
                if !item.source_path.is_file() {
                    debug!("Skipping missing file: {}", item.source_path.display());
                    continue;
                }
                match fs::read(&item.source_path) {
                    Ok(bytes) => entries.push(ArchiveEntry {
                        relative_path: item.archive_name.clone(),
                        bytes: Some(bytes),
                    }),
                    Err(e) => warn!(
                        "Failed to add file to backup: {} ({})",
                        item.source_path.display(),
                        e
                    ),
                }
            }
            EntryKind::Directory => {
                if !item.source_path.is_dir() {
                    debug!("Skipping missing directory: {}", item.source_path.display());
                    continue;
                }
                match read_directory(&item.source_path, &item.archive_name) {
                    Ok(dir_entries) => entries.extend(dir_entries),
                    Err(e) => warn!(
                        "Failed to add folder to backup: {} ({})",
                        item.source_path.display(),
                        e
                    ),
                }
            }
        }
    }

    if entries.is_empty() {
        return Err(BackupError::NoContent);
    }

    Ok(Archive { entries })
}

fn read_directory(root: &Path, archive_name: &str) -> std::io::Result<Vec<ArchiveEntry>> {
    let mut entries = vec![ArchiveEntry {
        relative_path: archive_name.to_string(),
        bytes: None,
    }];

    for file in walk_directory(root, WalkOptions::default())? {
        let relative_path = format!("{}/{}", archive_name, file.archive_path());
        let bytes = if file.is_dir {
            None
        } else {
            Some(fs::read(&file.path)?)
        };
        entries.push(ArchiveEntry {
            relative_path,
            bytes,
        });
    }

    Ok(entries)
}

/// Decode archive bytes into raw entries without touching the filesystem.
pub fn parse(bytes: &[u8]) -> Result<Vec<RawEntry>> {
    let mut archive =
        ZipArchive::new(Cursor::new(bytes)).map_err(|e| BackupError::Archive(e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| BackupError::Archive(format!("entry {index}: {e}")))?;

        let mut data = Vec::new();
        if !file.is_dir() {
            file.read_to_end(&mut data)
                .map_err(|e| BackupError::Archive(format!("{}: {}", file.name(), e)))?;
        }

        entries.push(RawEntry {
            name: file.name().to_string(),
            is_dir: file.is_dir(),
            size: file.size(),
            data,
        });
    }

    Ok(entries)
}

/// Write validated entries below `dir`, creating parent directories as needed.
pub fn extract_to(entries: &[ValidatedEntry], dir: &Path) -> std::io::Result<()> {
    for entry in entries {
        let target = dir.join(&entry.path);
        if entry.is_dir {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&target, &entry.data)?;
    }
    Ok(())
}
