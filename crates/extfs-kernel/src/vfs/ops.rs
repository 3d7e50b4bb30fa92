//! VFS operations trait.
//!
//! The handler set a filesystem transport drives. Path-based (no inodes),
//! so a FUSE adapter keeps its own inode ↔ path map.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::types::{DirEntry, FileAttr, OpenFlags, SetAttr, StatFs};
use super::VfsResult;

/// Core VFS operations trait.
#[async_trait]
pub trait VfsOps: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Get file attributes.
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr>;

    /// Read directory entries, including `.` and `..`.
    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>>;

    /// Read symbolic link target.
    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf>;

    /// Open a file. No handle state is kept; success only means the
    /// path exists and the access mode is allowed.
    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()>;

    /// Release a file opened with [`VfsOps::open`].
    async fn release(&self, path: &Path) -> VfsResult<()>;

    // ========================================================================
    // Writing
    // ========================================================================

    /// Write data to a file.
    async fn write(&self, path: &Path, offset: u64, data: &[u8]) -> VfsResult<u32>;

    /// Create a new file.
    async fn create(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Create a new directory.
    async fn mkdir(&self, path: &Path, mode: u32) -> VfsResult<FileAttr>;

    /// Remove a file.
    async fn unlink(&self, path: &Path) -> VfsResult<()>;

    /// Remove an empty directory.
    async fn rmdir(&self, path: &Path) -> VfsResult<()>;

    /// Rename a file or directory.
    async fn rename(&self, from: &Path, to: &Path) -> VfsResult<()>;

    /// Truncate a file to the specified size.
    async fn truncate(&self, path: &Path, size: u64) -> VfsResult<()>;

    /// Set file attributes (chmod, chown, utime).
    async fn setattr(&self, path: &Path, attr: SetAttr) -> VfsResult<FileAttr>;

    /// Create a symbolic link at `path` pointing to `target`.
    async fn symlink(&self, path: &Path, target: &Path) -> VfsResult<FileAttr>;

    /// Create a hard link at `newpath` pointing to `oldpath`.
    async fn link(&self, oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this filesystem is read-only.
    fn read_only(&self) -> bool;

    /// Get filesystem statistics.
    async fn statfs(&self) -> VfsResult<StatFs>;
}
