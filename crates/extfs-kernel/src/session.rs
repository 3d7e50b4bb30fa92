//! Session context.
//!
//! A [`Session`] owns everything one mount needs: its configuration, the
//! index store and the store's backing file. Handlers receive it explicitly
//! (as `Arc<Session>`); there is no process-wide state.
//!
//! Lifecycle:
//!
//! 1. [`Session::open`] validates the config and opens a fresh store.
//! 2. [`Session::initialize`] runs the scan exactly once. Handlers refuse to
//!    serve until it has committed.
//! 3. Dropping the last reference closes the connection, then removes the
//!    backing file if the session owns it.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use parking_lot::Mutex;
use thiserror::Error;

use crate::config::{ConfigError, SessionConfig};
use crate::db::{IndexDb, IndexError};
use crate::scanner::{ScanError, ScanSummary, Scanner};

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] IndexError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("cannot prepare store {}: {source}", path.display())]
    StoreFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A query arrived before the scan committed.
    #[error("index not ready: scan has not completed")]
    NotReady,
}

/// Backing file of the index.
#[derive(Debug)]
enum BackingStore {
    /// Anonymous store; always removed at teardown.
    Temp(tempfile::TempPath),
    /// Configured location.
    File { path: PathBuf, delete: bool },
}

impl BackingStore {
    fn path(&self) -> &Path {
        match self {
            BackingStore::Temp(temp) => &**temp,
            BackingStore::File { path, .. } => path,
        }
    }
}

impl Drop for BackingStore {
    fn drop(&mut self) {
        if let BackingStore::File { path, delete: true } = self {
            match std::fs::remove_file(&*path) {
                Ok(()) => tracing::info!(path = %path.display(), "removed index store"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove index store"),
            }
        }
    }
}

/// One filesystem session.
#[derive(Debug)]
pub struct Session {
    // Field order matters: the connection must close before the file goes.
    db: IndexDb,
    store: BackingStore,
    config: SessionConfig,
    init: Mutex<()>,
    ready: OnceLock<ScanSummary>,
}

impl Session {
    /// Open the store for `config`.
    ///
    /// A configured store is recreated from scratch unless `skip_scan` asks
    /// to reuse it.
    pub fn open(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let store = match &config.store_path {
            Some(path) => {
                if !config.skip_scan {
                    match std::fs::remove_file(path) {
                        Ok(()) => tracing::debug!(path = %path.display(), "discarded stale store"),
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(source) => {
                            return Err(SessionError::StoreFile {
                                path: path.clone(),
                                source,
                            });
                        }
                    }
                }
                BackingStore::File {
                    path: path.clone(),
                    delete: config.delete_on_teardown,
                }
            }
            None => {
                let temp = tempfile::Builder::new()
                    .prefix("extfs-")
                    .suffix(".db")
                    .tempfile()
                    .map_err(|source| SessionError::StoreFile {
                        path: std::env::temp_dir(),
                        source,
                    })?
                    .into_temp_path();
                BackingStore::Temp(temp)
            }
        };

        let db = IndexDb::open(store.path())?;
        tracing::info!(store = %store.path().display(), "session opened");

        Ok(Self {
            db,
            store,
            config,
            init: Mutex::new(()),
            ready: OnceLock::new(),
        })
    }

    /// Populate the index. Runs the scan on the first call only; later calls
    /// return the first summary.
    ///
    /// With `skip_scan` the existing store is adopted as-is.
    pub fn initialize(&self) -> Result<ScanSummary, SessionError> {
        if let Some(summary) = self.ready.get() {
            return Ok(*summary);
        }

        let _guard = self.init.lock();
        if let Some(summary) = self.ready.get() {
            return Ok(*summary);
        }

        let summary = if self.config.skip_scan {
            let indexed = self.db.count()?;
            tracing::info!(indexed, "reusing existing index, scan skipped");
            ScanSummary {
                indexed,
                skipped: 0,
            }
        } else {
            Scanner::new(&self.db, self.config.on_duplicate).run(&self.config)?
        };

        Ok(*self.ready.get_or_init(|| summary))
    }

    /// True once the scan has committed.
    pub fn is_ready(&self) -> bool {
        self.ready.get().is_some()
    }

    /// The index, available only after [`Session::initialize`] succeeded.
    pub fn index(&self) -> Result<&IndexDb, SessionError> {
        if self.is_ready() {
            Ok(&self.db)
        } else {
            Err(SessionError::NotReady)
        }
    }

    /// Location of the backing store.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }
}
