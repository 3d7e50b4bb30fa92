//! End-to-end scenarios: scan a source, then drive the handlers the way a
//! filesystem transport would.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use extfs_kernel::vfs::path::leaf_path;
use extfs_kernel::{
    ExtFs, ListDelimiter, OpenFlags, SENTINEL_EXTENSION, Session, SessionConfig, SetAttr,
    VfsError, VfsOps,
};
use tempfile::{NamedTempFile, TempDir};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("extfs_kernel=debug")
        .with_test_writer()
        .try_init();
}

/// Session over a NUL-delimited list of raw paths.
fn list_session(paths: &[&[u8]]) -> (ExtFs, NamedTempFile) {
    init_tracing();
    let mut list = NamedTempFile::new().unwrap();
    for p in paths {
        list.write_all(p).unwrap();
        list.write_all(b"\0").unwrap();
    }
    let session = Session::open(SessionConfig::list(list.path(), ListDelimiter::Nul)).unwrap();
    session.initialize().unwrap();
    (ExtFs::new(Arc::new(session)), list)
}

fn walk_session(root: &Path) -> ExtFs {
    init_tracing();
    let session = Session::open(SessionConfig::walk(root)).unwrap();
    session.initialize().unwrap();
    ExtFs::new(Arc::new(session))
}

async fn names(fs: &ExtFs, path: &str) -> Vec<String> {
    fs.readdir(Path::new(path))
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .filter(|n| n != "." && n != "..")
        .collect()
}

/// Every leaf in the tree, mapped to its link target.
async fn resolve_all(fs: &ExtFs) -> Vec<(String, PathBuf)> {
    let mut out = Vec::new();
    for ext in names(fs, "/").await {
        for leaf in names(fs, &format!("/{ext}")).await {
            let path = format!("/{ext}/{leaf}");
            assert!(fs.getattr(Path::new(&path)).await.unwrap().is_symlink());
            let target = fs.readlink(Path::new(&path)).await.unwrap();
            out.push((path, target));
        }
    }
    out
}

#[tokio::test]
async fn test_report_and_notes_scenario() {
    let (fs, _list) = list_session(&[b"/data/report.txt", b"/data/notes"]);

    let root: HashSet<_> = names(&fs, "/").await.into_iter().collect();
    assert_eq!(root, HashSet::from(["txt".to_string(), "_.".to_string()]));

    assert_eq!(names(&fs, "/txt").await, vec!["report_0.txt"]);
    assert_eq!(
        fs.readlink(Path::new("/txt/report_0.txt")).await.unwrap(),
        Path::new("/data/report.txt")
    );

    assert_eq!(names(&fs, "/_.").await, vec!["notes_1"]);
    assert_eq!(
        fs.readlink(Path::new("/_./notes_1")).await.unwrap(),
        Path::new("/data/notes")
    );
}

#[tokio::test]
async fn test_same_base_name_gets_distinct_leaves() {
    let (fs, _list) = list_session(&[b"/a/x.log", b"/b/x.log"]);

    assert_eq!(names(&fs, "/log").await, vec!["x_0.log", "x_1.log"]);
    assert_eq!(
        fs.readlink(Path::new("/log/x_0.log")).await.unwrap(),
        Path::new("/a/x.log")
    );
    assert_eq!(
        fs.readlink(Path::new("/log/x_1.log")).await.unwrap(),
        Path::new("/b/x.log")
    );
}

#[tokio::test]
async fn test_missing_leaf_and_deep_paths() {
    let (fs, _list) = list_session(&[b"/data/report.txt"]);

    assert!(matches!(
        fs.getattr(Path::new("/txt/missing_99.txt")).await,
        Err(VfsError::NotFound(_))
    ));
    assert!(matches!(
        fs.getattr(Path::new("/a/b/c")).await,
        Err(VfsError::NotFound(_))
    ));
    assert!(matches!(
        fs.getattr(Path::new("/txt/report_0.txt/deeper")).await,
        Err(VfsError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_round_trip_of_awkward_paths() {
    let awkward: Vec<&[u8]> = vec![
        b"/srv/it's.txt",
        b"/srv/''double''.txt",
        b"/srv/back\\slash.txt",
        b"/srv/semi;colon -- DROP TABLE files.sql",
        b"/srv/line\nbreak.md",
        b"/srv/tab\there",
        b"/srv/caf\xe9.txt",
        b"/srv/under_score_7.rs",
    ];
    let (fs, _list) = list_session(&awkward);

    let resolved = resolve_all(&fs).await;
    assert_eq!(resolved.len(), awkward.len());

    let got: HashSet<Vec<u8>> = resolved
        .iter()
        .map(|(_, target)| target.as_os_str().as_bytes().to_vec())
        .collect();
    let want: HashSet<Vec<u8>> = awkward.iter().map(|p| p.to_vec()).collect();
    assert_eq!(got, want);
}

#[tokio::test]
async fn test_walk_round_trip() {
    let dir = TempDir::new().unwrap();
    let files = [
        "a/x.log",
        "b/x.log",
        "b/nested/deeper/y.LOG",
        "README",
        "c/.hidden",
        "c/quote'd \"name\".txt",
    ];
    for f in files {
        let path = dir.path().join(f);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, f).unwrap();
    }

    let fs = walk_session(dir.path());
    let resolved = resolve_all(&fs).await;

    let got: HashSet<PathBuf> = resolved.into_iter().map(|(_, t)| t).collect();
    let want: HashSet<PathBuf> = files.iter().map(|f| dir.path().join(f)).collect();
    assert_eq!(got, want);

    // case is preserved, so these are two directories
    let root: HashSet<_> = names(&fs, "/").await.into_iter().collect();
    assert!(root.contains("log"));
    assert!(root.contains("LOG"));
    assert!(root.contains(SENTINEL_EXTENSION));
}

#[tokio::test]
async fn test_relative_root_links_are_absolute() {
    let dir = TempDir::new_in(".").unwrap();
    std::fs::write(dir.path().join("r.txt"), "r").unwrap();
    let relative = Path::new(".").join(dir.path().file_name().unwrap());

    let fs = walk_session(&relative);
    let target = fs.readlink(Path::new("/txt/r_0.txt")).await.unwrap();

    assert!(target.is_absolute(), "{}", target.display());
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "r");
}

#[tokio::test]
async fn test_extensions_listed_once_and_nonempty() {
    let (fs, _list) = list_session(&[b"/1.c", b"/2.c", b"/3.h", b"/4", b"/5.c", b"/6"]);
    let db = fs.session().index().unwrap();

    let root = names(&fs, "/").await;
    let unique: HashSet<_> = root.iter().collect();
    assert_eq!(unique.len(), root.len());
    assert_eq!(root.len(), 3);

    for ext in &root {
        assert!(db.count_by_extension(ext).unwrap() >= 1);
    }
}

#[tokio::test]
async fn test_listing_matches_records() {
    let (fs, _list) = list_session(&[b"/x/a.rs", b"/y/a.rs", b"/z/b"]);
    let db = fs.session().index().unwrap();

    for id in 0..3 {
        let record = db.get(id).unwrap().unwrap();
        let path = leaf_path(&record.display_name, &record.extension);
        assert_eq!(fs.readlink(Path::new(&path)).await.unwrap(), record.full_path);
    }
}

#[tokio::test]
async fn test_second_initialize_is_noop() {
    let (fs, _list) = list_session(&[b"/a.txt", b"/b.txt"]);
    let session = fs.session();

    let before = session.index().unwrap().count().unwrap();
    let summary = session.initialize().unwrap();
    let after = session.index().unwrap().count().unwrap();

    assert_eq!(before, 2);
    assert_eq!(after, 2);
    assert_eq!(summary.indexed, 2);
}

#[tokio::test]
async fn test_mutations_rejected_everywhere() {
    let (fs, _list) = list_session(&[b"/data/report.txt"]);
    let before = fs.readdir(Path::new("/txt")).await.unwrap();

    for p in ["/", "/txt", "/txt/report_0.txt", "/new", "/txt/new.txt", "/a/b/c"] {
        let path = Path::new(p);
        let other = Path::new("/txt/other_1.txt");

        assert!(matches!(fs.create(path, 0o644).await, Err(VfsError::ReadOnly)), "create {p}");
        assert!(matches!(fs.mkdir(path, 0o755).await, Err(VfsError::ReadOnly)), "mkdir {p}");
        assert!(matches!(fs.unlink(path).await, Err(VfsError::ReadOnly)), "unlink {p}");
        assert!(matches!(fs.rmdir(path).await, Err(VfsError::ReadOnly)), "rmdir {p}");
        assert!(matches!(fs.write(path, 0, b"x").await, Err(VfsError::ReadOnly)), "write {p}");
        assert!(matches!(fs.truncate(path, 0).await, Err(VfsError::ReadOnly)), "truncate {p}");
        assert!(
            matches!(fs.setattr(path, SetAttr::new().with_perm(0o777)).await, Err(VfsError::ReadOnly)),
            "chmod {p}"
        );
        assert!(matches!(fs.rename(path, other).await, Err(VfsError::ReadOnly)), "rename {p}");
        assert!(matches!(fs.symlink(other, path).await, Err(VfsError::ReadOnly)), "symlink {p}");
        assert!(matches!(fs.link(path, other).await, Err(VfsError::ReadOnly)), "link {p}");
        assert!(
            matches!(fs.open(path, OpenFlags::write()).await, Err(VfsError::ReadOnly)),
            "open {p}"
        );
    }

    assert_eq!(fs.readdir(Path::new("/txt")).await.unwrap(), before);
    assert_eq!(fs.session().index().unwrap().count().unwrap(), 1);
}

#[tokio::test]
async fn test_read_only_maps_to_erofs() {
    let (fs, _list) = list_session(&[b"/data/report.txt"]);
    let err: std::io::Error = fs.unlink(Path::new("/txt/report_0.txt")).await.unwrap_err().into();
    assert_eq!(err.kind(), std::io::ErrorKind::ReadOnlyFilesystem);
}

#[tokio::test]
async fn test_concurrent_lookups() {
    let (fs, _list) = list_session(&[b"/a/x.log", b"/b/x.log", b"/c/y.txt"]);
    let fs = Arc::new(fs);

    let mut tasks = Vec::new();
    for i in 0..16u64 {
        let fs = fs.clone();
        tasks.push(tokio::spawn(async move {
            let id = i % 2;
            let leaf = format!("/log/x_{id}.log");
            let target = fs.readlink(Path::new(&leaf)).await.unwrap();
            let expected = if id == 0 { "/a/x.log" } else { "/b/x.log" };
            assert_eq!(target, Path::new(expected));
            assert!(fs.getattr(Path::new("/txt")).await.unwrap().is_dir());
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }
}

#[tokio::test]
async fn test_non_utf8_lookup_is_not_found() {
    let (fs, _list) = list_session(&[b"/a.txt"]);
    let raw = Path::new(OsStr::from_bytes(b"/txt/\xff_0.txt"));
    assert!(fs.getattr(raw).await.unwrap_err().is_not_found());
}
