//! Validation of untrusted names.
//!
//! Archive entry names and catalog filenames come from outside the process (a
//! zip someone handed us, a WebDAV listing, a CLI argument) and are checked
//! here before they are ever joined onto a real path.

use std::collections::BTreeSet;
use std::path::{Component, Path};

use super::RawEntry;
use crate::utils::{BackupError, Result};

/// Top-level names restore may create, overwrite or delete.
pub const DEFAULT_WHITELIST: [&str; 8] = [
    "config.yaml",
    "mihomo.yaml",
    "profile.yaml",
    "override.yaml",
    "themes",
    "profiles",
    "override",
    "substore",
];

/// An archive entry that passed both the traversal and the whitelist checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedEntry {
    /// Normalized relative path, `/`-separated.
    pub path: String,
    pub is_dir: bool,
    pub data: Vec<u8>,
}

impl ValidatedEntry {
    /// First path segment, the item restore swaps into place.
    pub fn top_level(&self) -> &str {
        self.path.split('/').next().unwrap_or(&self.path)
    }
}

/// The fixed set of top-level names restore is permitted to touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Whitelist {
    names: BTreeSet<String>,
}

impl Default for Whitelist {
    fn default() -> Self {
        Self::new(DEFAULT_WHITELIST)
    }
}

impl Whitelist {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Reject a normalized path whose first segment is not whitelisted.
    pub fn validate_top_level(&self, safe_path: &str) -> Result<()> {
        match safe_path.split('/').next() {
            Some(first) if !first.is_empty() && self.contains(first) => Ok(()),
            _ => Err(BackupError::Whitelist(safe_path.to_string())),
        }
    }
}

/// Normalize an archive entry name into a safe relative path.
///
/// Both `/` and `\` separate segments. Empty and `.` segments are dropped; a
/// `..` segment, a leading separator or a drive/root marker is rejected, as is
/// a name that normalizes to nothing.
pub fn validate_entry(raw_name: &str) -> Result<String> {
    let traversal = || BackupError::Traversal(raw_name.to_string());

    if raw_name.contains('\0') {
        return Err(traversal());
    }

    let unified = raw_name.replace('\\', "/");
    if unified.starts_with('/') {
        return Err(traversal());
    }

    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(traversal()),
            s if s.contains(':') => return Err(traversal()),
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Err(traversal());
    }

    let normalized = segments.join("/");
    let is_plain_relative = Path::new(&normalized)
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !is_plain_relative {
        return Err(traversal());
    }

    Ok(normalized)
}

/// Check a backup filename used as a catalog label (download/delete by name).
///
/// The name must be a single plain path component equal to its own normal form.
pub fn validate_filename(candidate: &str) -> Result<()> {
    let invalid = || BackupError::InvalidFilename(candidate.to_string());

    if candidate.is_empty()
        || candidate.contains("..")
        || candidate.contains('/')
        || candidate.contains('\\')
        || candidate.contains('\0')
        || candidate.contains(':')
    {
        return Err(invalid());
    }

    let mut components = Path::new(candidate).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if *name == *candidate => Ok(()),
        _ => Err(invalid()),
    }
}

/// Validate every raw entry of an archive, all-or-nothing.
///
/// Returns the entries in archive order with normalized paths; the first
/// violation aborts with no partial result.
pub fn validate_archive(
    entries: Vec<RawEntry>,
    whitelist: &Whitelist,
) -> Result<Vec<ValidatedEntry>> {
    let mut validated = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = validate_entry(&entry.name)?;
        whitelist.validate_top_level(&path)?;
        validated.push(ValidatedEntry {
            path,
            is_dir: entry.is_dir,
            data: entry.data,
        });
    }
    Ok(validated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str) -> RawEntry {
        RawEntry {
            name: name.to_string(),
            is_dir: name.ends_with('/'),
            size: 1,
            data: if name.ends_with('/') { Vec::new() } else { b"x".to_vec() },
        }
    }

    #[test]
    fn test_validate_entry_normalizes() {
        assert_eq!(validate_entry("themes/dark.css").unwrap(), "themes/dark.css");
        assert_eq!(validate_entry("./profiles//a.yaml").unwrap(), "profiles/a.yaml");
        assert_eq!(validate_entry("profiles\\a.yaml").unwrap(), "profiles/a.yaml");
        assert_eq!(validate_entry("themes/").unwrap(), "themes");
    }

    #[test]
    fn test_validate_entry_rejects_traversal() {
        for name in [
            "../evil",
            "..\\evil",
            "/etc/passwd",
            "\\etc\\passwd",
            "themes/../../evil",
            "C:\\Windows\\evil",
            "c:evil",
            ".",
            "",
            "profiles/\0evil",
        ] {
            assert!(
                matches!(validate_entry(name), Err(BackupError::Traversal(_))),
                "expected traversal rejection for {name:?}"
            );
        }
    }

    #[test]
    fn test_whitelist_top_level() {
        let whitelist = Whitelist::default();
        assert!(whitelist.validate_top_level("config.yaml").is_ok());
        assert!(whitelist.validate_top_level("substore/data.json").is_ok());
        assert!(matches!(
            whitelist.validate_top_level("random-dir/x"),
            Err(BackupError::Whitelist(_))
        ));
        assert!(whitelist.validate_top_level("config.yaml.bak").is_err());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("linux_2023-06-01_00-00-00.zip").is_ok());
        for name in [
            "../x.zip",
            "a/b.zip",
            "a\\b.zip",
            "/etc/passwd",
            "C:\\backup.zip",
            "..",
            ".",
            "",
        ] {
            assert!(
                matches!(validate_filename(name), Err(BackupError::InvalidFilename(_))),
                "expected rejection for {name:?}"
            );
        }
    }

    #[test]
    fn test_validate_archive_is_all_or_nothing() {
        let whitelist = Whitelist::default();

        let entries = vec![raw("config.yaml"), raw("themes/"), raw("themes/a.css")];
        let ok = validate_archive(entries, &whitelist).unwrap();
        assert_eq!(ok.len(), 3);
        assert_eq!(ok[2].top_level(), "themes");

        let err = validate_archive(vec![raw("config.yaml"), raw("../evil")], &whitelist);
        assert!(matches!(err, Err(BackupError::Traversal(_))));

        let err = validate_archive(vec![raw("config.yaml"), raw("random-dir/x")], &whitelist);
        assert!(matches!(err, Err(BackupError::Whitelist(_))));
    }
}
