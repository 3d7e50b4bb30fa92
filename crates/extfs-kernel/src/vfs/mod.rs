//! Virtual filesystem surface.
//!
//! Key components:
//!
//! - [`VfsOps`] - Handler set a filesystem transport drives
//! - [`ExtFs`] - The extension-grouped, read-only implementation
//! - [`path`] - Synthetic path grammar (`/`, `/<ext>`, `/<ext>/<name>_<id>.<ext>`)
//!
//! ## Design Decisions
//!
//! - **Path-based, no inodes**: a FUSE or 9P adapter keeps its own inode map.
//! - **Leaves are symlinks**: their only content is the real path, served by
//!   `readlink`; there is no byte-range read.

mod error;
mod extfs;
mod ops;
pub mod path;
mod types;

pub use error::{VfsError, VfsResult};
pub use extfs::ExtFs;
pub use ops::VfsOps;
pub use path::{LeafName, PathError, SyntheticPath};
pub use types::{DirEntry, FileAttr, FileType, OpenFlags, SetAttr, StatFs};
