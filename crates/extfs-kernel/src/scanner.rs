//! Populates the index, once per session.
//!
//! Two sources: a recursive walk of a directory, or a delimited list of
//! paths. Either way the whole scan runs inside one index transaction, so a
//! failed scan leaves the store empty.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::config::{DuplicatePolicy, ListDelimiter, STDIN_SOURCE, ScanSource, SessionConfig};
use crate::db::{IndexDb, IndexError, IndexWriter, SENTINEL_EXTENSION};

/// Scan errors. All of them are fatal for the session.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The same real path was offered twice under [`DuplicatePolicy::Abort`].
    #[error("duplicate source path: {}", .0.display())]
    DuplicateSource(PathBuf),

    #[error("cannot scan {}: {source}", path.display())]
    Source { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    Store(IndexError),
}

impl From<IndexError> for ScanError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::DuplicatePath(path) => ScanError::DuplicateSource(path),
            other => ScanError::Store(other),
        }
    }
}

/// Outcome of a completed scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records committed to the index.
    pub indexed: u64,
    /// Sources that were logged and passed over.
    pub skipped: u64,
}

/// Split a file's own name into `(base_name, extension)`.
///
/// The extension is whatever follows the last `.` of the name. Names without
/// one, names ending in `.`, and dot-files like `.bashrc` get
/// [`SENTINEL_EXTENSION`]. Returns `None` when the path has no file name.
pub fn split_name(path: &Path) -> Option<(String, String)> {
    let name = Path::new(path.file_name()?);
    let base = name.file_stem()?.to_string_lossy().into_owned();
    let extension = match name.extension() {
        Some(ext) if !ext.is_empty() => ext.to_string_lossy().into_owned(),
        _ => SENTINEL_EXTENSION.to_string(),
    };
    Some((base, extension))
}

/// Fills an [`IndexDb`] from a [`ScanSource`].
pub struct Scanner<'a> {
    db: &'a IndexDb,
    on_duplicate: DuplicatePolicy,
}

impl<'a> Scanner<'a> {
    pub fn new(db: &'a IndexDb, on_duplicate: DuplicatePolicy) -> Self {
        Self { db, on_duplicate }
    }

    /// Scan whatever `config` selects.
    pub fn run(&self, config: &SessionConfig) -> Result<ScanSummary, ScanError> {
        match config.source()? {
            ScanSource::Walk(root) => self.walk(root),
            ScanSource::List { source, delimiter } if source == Path::new(STDIN_SOURCE) => {
                self.read_list(io::stdin().lock(), source, delimiter)
            }
            ScanSource::List { source, delimiter } => {
                let file = File::open(source).map_err(|e| ScanError::Source {
                    path: source.to_path_buf(),
                    source: e,
                })?;
                self.read_list(BufReader::new(file), source, delimiter)
            }
        }
    }

    /// Index every regular file under `root`.
    ///
    /// Symlinks are followed so linked files are indexed under the link's
    /// path; loops and unreadable entries are logged and skipped.
    ///
    /// A relative `root` is anchored at the working directory, without
    /// canonicalizing, so every recorded path is absolute.
    pub fn walk(&self, root: &Path) -> Result<ScanSummary, ScanError> {
        let source_error = |source: io::Error| ScanError::Source {
            path: root.to_path_buf(),
            source,
        };
        let root = std::path::absolute(root).map_err(source_error)?;
        let root = root.as_path();
        let meta = std::fs::metadata(root).map_err(source_error)?;
        if !meta.is_dir() {
            return Err(ScanError::Source {
                path: root.to_path_buf(),
                source: io::Error::new(io::ErrorKind::NotADirectory, "scan root is not a directory"),
            });
        }

        tracing::info!(root = %root.display(), "scanning subtree");
        self.db.bulk_load(|writer| {
            let mut summary = ScanSummary::default();
            let walker = WalkDir::new(root).follow_links(true).sort_by_file_name();
            for entry in walker {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(error = %e, "skipping unreadable entry");
                        summary.skipped += 1;
                        continue;
                    }
                };
                if !entry.file_type().is_file() {
                    continue;
                }
                self.record(writer, entry.path(), &mut summary)?;
            }
            Ok(summary)
        })
        .inspect(|summary| log_summary(summary))
    }

    /// Index the paths read from `reader`, one per `delimiter`-terminated
    /// record. Empty records are ignored; paths are taken verbatim and need
    /// not exist. `source` names the list in errors.
    pub fn read_list<R: BufRead>(
        &self,
        reader: R,
        source: &Path,
        delimiter: ListDelimiter,
    ) -> Result<ScanSummary, ScanError> {
        tracing::info!(source = %source.display(), ?delimiter, "reading file list");
        self.db.bulk_load(|writer| {
            let mut summary = ScanSummary::default();
            for record in reader.split(delimiter.byte()) {
                let bytes = record.map_err(|e| ScanError::Source {
                    path: source.to_path_buf(),
                    source: e,
                })?;
                if bytes.is_empty() {
                    continue;
                }
                let path = Path::new(OsStr::from_bytes(&bytes));
                self.record(writer, path, &mut summary)?;
            }
            Ok(summary)
        })
        .inspect(|summary| log_summary(summary))
    }

    fn record(
        &self,
        writer: &mut IndexWriter<'_>,
        path: &Path,
        summary: &mut ScanSummary,
    ) -> Result<(), ScanError> {
        let Some((base, extension)) = split_name(path) else {
            tracing::warn!(path = %path.display(), "skipping path without a file name");
            summary.skipped += 1;
            return Ok(());
        };

        match writer.insert(path, &base, &extension) {
            Ok(id) => {
                tracing::trace!(id, path = %path.display(), %extension, "indexed");
                summary.indexed += 1;
                Ok(())
            }
            Err(IndexError::DuplicatePath(dup)) if self.on_duplicate == DuplicatePolicy::Skip => {
                tracing::warn!(path = %dup.display(), "skipping duplicate source path");
                summary.skipped += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn log_summary(summary: &ScanSummary) {
    tracing::info!(
        indexed = summary.indexed,
        skipped = summary.skipped,
        "scan committed"
    );
}
