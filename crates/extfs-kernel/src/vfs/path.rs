//! Synthetic path grammar.
//!
//! The tree has exactly two levels below the root:
//!
//! ```text
//! /                         root, one directory per extension
//! /<ext>                    extension directory
//! /<ext>/<base>_<id>.<ext>  leaf (symlink); no `.<ext>` suffix for the sentinel
//! ```
//!
//! Depth is the number of non-empty `/`-separated components. Everything
//! here is pure string work; nothing touches the index.

use std::path::Path;

use thiserror::Error;

use crate::db::SENTINEL_EXTENSION;

/// Path grammar errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The path is not valid UTF-8, so it cannot name anything in the tree.
    #[error("path is not valid UTF-8: {0}")]
    NonUtf8(String),

    /// A leaf whose trailing id segment is missing or not a number.
    #[error("malformed leaf name: {0}")]
    MalformedLeaf(String),
}

/// A synthetic path classified by depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticPath<'a> {
    /// `/`
    Root,
    /// `/<ext>`
    Extension(&'a str),
    /// `/<ext>/<leaf>`
    Leaf { extension: &'a str, name: &'a str },
    /// Anything three or more levels deep.
    TooDeep { depth: usize },
}

impl<'a> SyntheticPath<'a> {
    /// Classify `path`.
    ///
    /// Leading, trailing and repeated separators are ignored; `.` and `..`
    /// are ordinary names.
    pub fn parse(path: &'a Path) -> Result<Self, PathError> {
        let s = path
            .to_str()
            .ok_or_else(|| PathError::NonUtf8(path.to_string_lossy().into_owned()))?;
        Ok(Self::parse_str(s))
    }

    /// Classify a path given as a string.
    pub fn parse_str(s: &'a str) -> Self {
        let mut parts = s.split('/').filter(|c| !c.is_empty());
        match (parts.next(), parts.next(), parts.next()) {
            (None, _, _) => SyntheticPath::Root,
            (Some(ext), None, _) => SyntheticPath::Extension(ext),
            (Some(extension), Some(name), None) => SyntheticPath::Leaf { extension, name },
            (Some(_), Some(_), Some(_)) => SyntheticPath::TooDeep {
                depth: 3 + parts.count(),
            },
        }
    }

    /// Number of components below the root.
    pub fn depth(&self) -> usize {
        match self {
            SyntheticPath::Root => 0,
            SyntheticPath::Extension(_) => 1,
            SyntheticPath::Leaf { .. } => 2,
            SyntheticPath::TooDeep { depth } => *depth,
        }
    }
}

/// A parsed leaf name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeafName<'a> {
    /// `<base>_<id>`, the form stored in the index.
    pub display_name: &'a str,
    /// Record id recovered from the trailing `_<id>`.
    pub id: u64,
}

impl<'a> LeafName<'a> {
    /// Parse a leaf that lives in the directory for `extension`.
    pub fn parse(extension: &str, leaf: &'a str) -> Result<Self, PathError> {
        let malformed = || PathError::MalformedLeaf(leaf.to_string());

        let display_name = if extension == SENTINEL_EXTENSION {
            leaf
        } else {
            leaf.strip_suffix(extension)
                .and_then(|s| s.strip_suffix('.'))
                .ok_or_else(malformed)?
        };

        let (_, digits) = display_name.rsplit_once('_').ok_or_else(malformed)?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let id = digits.parse::<u64>().map_err(|_| malformed())?;

        Ok(Self { display_name, id })
    }
}

/// Format the name a record shows inside its extension directory.
pub fn leaf_name(display_name: &str, extension: &str) -> String {
    if extension == SENTINEL_EXTENSION {
        display_name.to_string()
    } else {
        format!("{display_name}.{extension}")
    }
}

/// Format the absolute synthetic path of a record.
pub fn leaf_path(display_name: &str, extension: &str) -> String {
    format!("/{extension}/{}", leaf_name(display_name, extension))
}
