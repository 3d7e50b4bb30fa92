//! Extension-grouped filesystem.
//!
//! Answers every query from the session's index; no real file is touched.
//!
//! ```text
//! /                 dr-xr-xr-x   one entry per extension
//! /txt              dr-xr-xr-x   one entry per .txt file
//! /txt/report_0.txt lr--r--r--   -> /data/report.txt
//! /_./notes_1       lr--r--r--   -> /data/notes
//! ```

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::db::IndexDb;
use crate::session::Session;
use crate::vfs::error::{VfsError, VfsResult};
use crate::vfs::ops::VfsOps;
use crate::vfs::path::{LeafName, SyntheticPath, leaf_name};
use crate::vfs::types::{DirEntry, FileAttr, OpenFlags, SetAttr, StatFs};

/// Read-only handler set over one [`Session`].
#[derive(Debug, Clone)]
pub struct ExtFs {
    session: Arc<Session>,
}

impl ExtFs {
    /// Serve `session`. Queries fail with `StoreUnavailable` until the
    /// session's scan has committed.
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn index(&self) -> VfsResult<&IndexDb> {
        self.session
            .index()
            .map_err(|e| VfsError::store_unavailable(e.to_string()))
    }

    fn attributes(&self, path: &Path) -> VfsResult<FileAttr> {
        match SyntheticPath::parse(path)? {
            SyntheticPath::Root => {
                self.index()?;
                Ok(FileAttr::directory())
            }
            SyntheticPath::Extension(ext) => {
                if self.index()?.count_by_extension(ext)? >= 1 {
                    Ok(FileAttr::directory())
                } else {
                    Err(VfsError::not_found(path.display().to_string()))
                }
            }
            SyntheticPath::Leaf { extension, name } => {
                let leaf = LeafName::parse(extension, name)?;
                if self.index()?.lookup_by_display_name(extension, leaf.display_name)? {
                    Ok(FileAttr::symlink())
                } else {
                    Err(VfsError::not_found(path.display().to_string()))
                }
            }
            SyntheticPath::TooDeep { .. } => Err(VfsError::not_found(path.display().to_string())),
        }
    }

    fn list(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        let mut entries = vec![DirEntry::directory("."), DirEntry::directory("..")];
        match SyntheticPath::parse(path)? {
            SyntheticPath::Root => {
                let extensions = self.index()?.list_extensions()?;
                entries.extend(
                    extensions
                        .into_iter()
                        .filter(|ext| !ext.is_empty())
                        .map(DirEntry::directory),
                );
            }
            SyntheticPath::Extension(ext) => {
                let names = self.index()?.list_by_extension(ext)?;
                if names.is_empty() {
                    return Err(VfsError::not_found(path.display().to_string()));
                }
                entries.extend(
                    names
                        .iter()
                        .map(|name| DirEntry::symlink(leaf_name(name, ext))),
                );
            }
            SyntheticPath::Leaf { .. } | SyntheticPath::TooDeep { .. } => {
                return Err(VfsError::not_a_directory(path.display().to_string()));
            }
        }
        Ok(entries)
    }

    fn resolve(&self, path: &Path) -> VfsResult<PathBuf> {
        match SyntheticPath::parse(path)? {
            SyntheticPath::Leaf { extension, name } => {
                let leaf = LeafName::parse(extension, name)?;
                let db = self.index()?;
                // The display name embeds the id, so a match pins the record.
                if !db.lookup_by_display_name(extension, leaf.display_name)? {
                    return Err(VfsError::not_found(path.display().to_string()));
                }
                Ok(db.lookup_full_path(leaf.id)?)
            }
            SyntheticPath::TooDeep { .. } => Err(VfsError::not_found(path.display().to_string())),
            SyntheticPath::Root | SyntheticPath::Extension(_) => {
                Err(VfsError::not_a_symlink(path.display().to_string()))
            }
        }
    }

    fn reject(&self, op: &'static str, path: &Path) -> VfsError {
        tracing::debug!(op, path = %path.display(), "rejected on read-only filesystem");
        VfsError::ReadOnly
    }
}

/// The single place store faults are absorbed: log and fail this call only.
fn boundary<T>(op: &'static str, path: &Path, result: VfsResult<T>) -> VfsResult<T> {
    match &result {
        Err(VfsError::StoreUnavailable(msg)) => {
            tracing::warn!(op, path = %path.display(), error = %msg, "index query failed");
        }
        Err(e) => tracing::debug!(op, path = %path.display(), error = %e),
        Ok(_) => tracing::debug!(op, path = %path.display()),
    }
    result
}

#[async_trait]
impl VfsOps for ExtFs {
    async fn getattr(&self, path: &Path) -> VfsResult<FileAttr> {
        boundary("getattr", path, self.attributes(path))
    }

    async fn readdir(&self, path: &Path) -> VfsResult<Vec<DirEntry>> {
        boundary("readdir", path, self.list(path))
    }

    async fn readlink(&self, path: &Path) -> VfsResult<PathBuf> {
        boundary("readlink", path, self.resolve(path))
    }

    async fn open(&self, path: &Path, flags: OpenFlags) -> VfsResult<()> {
        if flags.wants_write() {
            return Err(self.reject("open", path));
        }
        boundary("open", path, self.attributes(path).map(|_| ()))
    }

    async fn release(&self, _path: &Path) -> VfsResult<()> {
        Ok(())
    }

    async fn write(&self, path: &Path, _offset: u64, _data: &[u8]) -> VfsResult<u32> {
        Err(self.reject("write", path))
    }

    async fn create(&self, path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        Err(self.reject("create", path))
    }

    async fn mkdir(&self, path: &Path, _mode: u32) -> VfsResult<FileAttr> {
        Err(self.reject("mkdir", path))
    }

    async fn unlink(&self, path: &Path) -> VfsResult<()> {
        Err(self.reject("unlink", path))
    }

    async fn rmdir(&self, path: &Path) -> VfsResult<()> {
        Err(self.reject("rmdir", path))
    }

    async fn rename(&self, from: &Path, _to: &Path) -> VfsResult<()> {
        Err(self.reject("rename", from))
    }

    async fn truncate(&self, path: &Path, _size: u64) -> VfsResult<()> {
        Err(self.reject("truncate", path))
    }

    async fn setattr(&self, path: &Path, _attr: SetAttr) -> VfsResult<FileAttr> {
        Err(self.reject("setattr", path))
    }

    async fn symlink(&self, path: &Path, _target: &Path) -> VfsResult<FileAttr> {
        Err(self.reject("symlink", path))
    }

    async fn link(&self, _oldpath: &Path, newpath: &Path) -> VfsResult<FileAttr> {
        Err(self.reject("link", newpath))
    }

    fn read_only(&self) -> bool {
        true
    }

    async fn statfs(&self) -> VfsResult<StatFs> {
        let root = Path::new("/");
        let files = self.index().and_then(|db| db.count().map_err(VfsError::from));
        boundary("statfs", root, files.map(StatFs::read_only))
    }
}
