//! # extfs-kernel
//!
//! A read-only virtual tree that regroups real files by extension.
//!
//! The root holds one directory per extension; each extension directory
//! holds one symlink per file, named `<base>_<id>.<ext>` and pointing at the
//! file's real location.
//!
//! - [`scanner`] fills the [`IndexDb`] once per [`Session`]
//! - [`vfs::ExtFs`] answers `getattr`, `readdir` and `readlink` from it

pub mod config;
pub mod db;
pub mod scanner;
pub mod session;
pub mod vfs;

pub use config::{ConfigError, DuplicatePolicy, ListDelimiter, ScanSource, SessionConfig};
pub use db::{FileRecord, IndexDb, IndexError, IndexResult, SENTINEL_EXTENSION};
pub use scanner::{ScanError, ScanSummary, Scanner};
pub use session::{Session, SessionError};
pub use vfs::{
    DirEntry, ExtFs, FileAttr, FileType, OpenFlags, SetAttr, StatFs, VfsError, VfsOps, VfsResult,
};
