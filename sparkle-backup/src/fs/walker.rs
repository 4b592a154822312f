//! Directory traversal for archive building.
//!
//! Produces the files and sub-directories under a root in a stable order, with
//! paths relative to that root, so the archive codec can mirror the tree.

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Options for directory walking
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Follow symbolic links
    pub follow_links: bool,

    /// Report directories as well as files
    pub include_dirs: bool,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            follow_links: false,
            include_dirs: true,
        }
    }
}

/// Information about an entry discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the entry
    pub path: PathBuf,

    /// Relative path from the root
    pub relative_path: PathBuf,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Is this a directory?
    pub is_dir: bool,
}

impl FileInfo {
    /// Create FileInfo from a DirEntry.
    /// Returns None for symlinks when links are not followed, and for other
    /// special files (sockets, fifos) which have no place in a config archive.
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        let file_type = entry.file_type();
        if !file_type.is_dir() && !file_type.is_file() {
            return Ok(None);
        }

        let metadata = entry.metadata()?;
        let path = entry.path().to_path_buf();
        let relative_path = path.strip_prefix(root).unwrap_or(&path).to_path_buf();

        Ok(Some(Self {
            path,
            relative_path,
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
        }))
    }

    /// Relative path with `/` separators, as stored in zip entry names.
    pub fn archive_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Walk a directory tree and collect every entry below `root`.
///
/// The root itself is not reported. Entries are sorted by file name at each
/// level so archives built from the same tree list entries in the same order.
pub fn walk_directory(root: &Path, options: WalkOptions) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(options.follow_links)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;

        if entry.file_type().is_dir() && !options.include_dirs {
            continue;
        }

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_empty_directory() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;
        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        assert_eq!(files.len(), 0);
        Ok(())
    }

    #[test]
    fn test_walk_with_subdirectories() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("subdir"))?;
        fs::write(temp_dir.path().join("file1.txt"), b"content1")?;
        fs::write(temp_dir.path().join("subdir/file2.txt"), b"content2")?;

        let files = walk_directory(temp_dir.path(), WalkOptions::default())?;
        let paths: Vec<String> = files.iter().map(|f| f.archive_path()).collect();
        assert_eq!(paths, vec!["file1.txt", "subdir", "subdir/file2.txt"]);
        assert!(files[1].is_dir);

        Ok(())
    }

    #[test]
    fn test_walk_files_only() -> std::io::Result<()> {
        let temp_dir = TempDir::new()?;

        fs::create_dir(temp_dir.path().join("empty"))?;
        fs::write(temp_dir.path().join("file.txt"), b"keep")?;

        let options = WalkOptions {
            include_dirs: false,
            ..WalkOptions::default()
        };
        let files = walk_directory(temp_dir.path(), options)?;
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].archive_path(), "file.txt");

        Ok(())
    }
}
