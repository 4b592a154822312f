//! Sparkle configuration backup library
//!
//! Archives the proxy client's configuration, stores it locally or on a WebDAV
//! server and restores it transactionally with rollback.

pub mod archive;
pub mod catalog;
pub mod config;
pub mod fs;
pub mod producer;
pub mod restore;
pub mod service;
pub mod transport;
pub mod utils;

// Re-export commonly used types
pub use config::{Config, ConfigSource, DataLayout};
pub use restore::{RestoreManager, RestoreReport, TransactionState};
pub use service::BackupService;
pub use transport::{BackupDescriptor, TransportConfig};
pub use utils::errors::{BackupError, ErrorKind};
pub type Result<T> = std::result::Result<T, BackupError>;
