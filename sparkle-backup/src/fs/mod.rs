//! Filesystem helpers: directory walking and the mutation seam used by restore.

pub mod ops;
pub mod walker;

pub use ops::{FsOps, LocalFs};
