//! Session configuration.
//!
//! Every recognized option lives in [`SessionConfig`]. It can be loaded from
//! a TOML file; the `extfs` binary layers its command-line flags on top.
//!
//! ```toml
//! root_path = "/home/amy/music"
//! store_path = "/var/tmp/extfs.db"
//! delete_on_teardown = true
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// File-list source meaning "read from stdin".
pub const STDIN_SOURCE: &str = "-";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("root_path and file_list are mutually exclusive")]
    ConflictingSources,

    #[error("one of root_path or file_list is required")]
    NoSource,

    #[error("skip_scan requires an existing store_path")]
    SkipScanWithoutStore,
}

/// Record separator for file lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListDelimiter {
    #[default]
    Newline,
    Nul,
}

impl ListDelimiter {
    pub fn byte(self) -> u8 {
        match self {
            ListDelimiter::Newline => b'\n',
            ListDelimiter::Nul => b'\0',
        }
    }
}

/// What the scanner does when a real path shows up twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Fail the scan; the session never starts.
    #[default]
    Abort,
    /// Keep the first occurrence and log the rest.
    Skip,
}

/// Where the scanner takes its files from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanSource<'a> {
    /// Recursive walk under a directory.
    Walk(&'a Path),
    /// Delimited list of paths, from a file or [`STDIN_SOURCE`].
    List {
        source: &'a Path,
        delimiter: ListDelimiter,
    },
}

/// Options for one filesystem session.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Directory to walk. Exclusive with `file_list`.
    pub root_path: Option<PathBuf>,
    /// File holding the paths to index, or `-` for stdin.
    pub file_list: Option<PathBuf>,
    pub list_delimiter: ListDelimiter,
    /// Backing database. A temporary file is used when unset.
    pub store_path: Option<PathBuf>,
    /// Reuse an existing store instead of scanning.
    pub skip_scan: bool,
    /// Remove `store_path` when the session ends.
    pub delete_on_teardown: bool,
    pub verbose: bool,
    pub on_duplicate: DuplicatePolicy,
}

impl SessionConfig {
    /// Config that walks `root`.
    pub fn walk(root: impl Into<PathBuf>) -> Self {
        Self {
            root_path: Some(root.into()),
            ..Default::default()
        }
    }

    /// Config that reads a path list.
    pub fn list(source: impl Into<PathBuf>, delimiter: ListDelimiter) -> Self {
        Self {
            file_list: Some(source.into()),
            list_delimiter: delimiter,
            ..Default::default()
        }
    }

    /// Parse a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the option combination before a session is opened.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_path.is_some() && self.file_list.is_some() {
            return Err(ConfigError::ConflictingSources);
        }
        if self.skip_scan {
            return match &self.store_path {
                Some(path) if path.exists() => Ok(()),
                _ => Err(ConfigError::SkipScanWithoutStore),
            };
        }
        self.source().map(|_| ())
    }

    /// The scan source selected by this config.
    pub fn source(&self) -> Result<ScanSource<'_>, ConfigError> {
        match (&self.root_path, &self.file_list) {
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSources),
            (None, None) => Err(ConfigError::NoSource),
            (Some(root), None) => Ok(ScanSource::Walk(root)),
            (None, Some(list)) => Ok(ScanSource::List {
                source: list,
                delimiter: self.list_delimiter,
            }),
        }
    }
}
