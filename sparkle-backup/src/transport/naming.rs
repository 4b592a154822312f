//! Backup file naming: `{platformTag}_{YYYY-MM-DD_HH-mm-ss}.zip`.
//!
//! The timestamp is zero-padded and fixed-width, so sorting names as strings
//! sorts them chronologically within a platform.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

fn backup_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(darwin|win32|linux)_(\d{4}-\d{2}-\d{2}_\d{2}-\d{2}-\d{2})\.zip$")
            .expect("backup name pattern is valid")
    })
}

/// Platform a backup was taken on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Darwin,
    Win32,
    Linux,
}

impl PlatformTag {
    /// Tag for the platform this binary was built for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "macos" => PlatformTag::Darwin,
            "windows" => PlatformTag::Win32,
            _ => PlatformTag::Linux,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::Darwin => "darwin",
            PlatformTag::Win32 => "win32",
            PlatformTag::Linux => "linux",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "darwin" => Ok(PlatformTag::Darwin),
            "win32" => Ok(PlatformTag::Win32),
            "linux" => Ok(PlatformTag::Linux),
            other => Err(format!("unknown platform tag: {other}")),
        }
    }
}

/// Name for a backup taken on `platform` at `at`.
pub fn backup_file_name(platform: PlatformTag, at: NaiveDateTime) -> String {
    format!("{}_{}.zip", platform, at.format(TIMESTAMP_FORMAT))
}

/// Whether `name` follows the naming convention exactly.
pub fn is_backup_name(name: &str) -> bool {
    BackupDescriptor::parse(name).is_conventional()
}

/// The catalog's view of one stored archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupDescriptor {
    pub name: String,
    pub platform: Option<PlatformTag>,
    pub timestamp: Option<NaiveDateTime>,
}

impl BackupDescriptor {
    /// Describe a stored object, inferring platform and time from its name.
    pub fn parse(name: &str) -> Self {
        let parsed = backup_name_pattern().captures(name).and_then(|caps| {
            let platform = caps[1].parse::<PlatformTag>().ok()?;
            let timestamp = NaiveDateTime::parse_from_str(&caps[2], TIMESTAMP_FORMAT).ok()?;
            Some((platform, timestamp))
        });

        match parsed {
            Some((platform, timestamp)) => Self {
                name: name.to_string(),
                platform: Some(platform),
                timestamp: Some(timestamp),
            },
            None => Self {
                name: name.to_string(),
                platform: None,
                timestamp: None,
            },
        }
    }

    pub fn is_conventional(&self) -> bool {
        self.platform.is_some() && self.timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_backup_file_name() {
        let at = NaiveDate::from_ymd_opt(2024, 1, 5)
            .unwrap()
            .and_hms_opt(9, 3, 7)
            .unwrap();
        assert_eq!(
            backup_file_name(PlatformTag::Win32, at),
            "win32_2024-01-05_09-03-07.zip"
        );
    }

    #[test]
    fn test_parse_descriptor() {
        let descriptor = BackupDescriptor::parse("linux_2023-06-01_00-00-00.zip");
        assert!(descriptor.is_conventional());
        assert_eq!(descriptor.platform, Some(PlatformTag::Linux));
        assert_eq!(
            descriptor.timestamp.unwrap().to_string(),
            "2023-06-01 00:00:00"
        );
    }

    #[test]
    fn test_non_conventional_names() {
        for name in [
            "notes.txt",
            "backup.zip",
            "freebsd_2023-06-01_00-00-00.zip",
            "linux_2023-06-01_00-00-00.zip.bak",
            "linux_2023-6-1_0-0-0.zip",
            "linux_2023-13-01_00-00-00.zip",
        ] {
            assert!(!is_backup_name(name), "{name} should not match");
        }
    }
}
