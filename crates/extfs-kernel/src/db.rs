//! SQLite index of scanned files.
//!
//! One row per real file. The table is written once, by the scanner, inside a
//! single transaction; everything afterwards is read-only lookups.

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Transaction};
use thiserror::Error;

/// Extension assigned to files that have none (or an empty one).
///
/// Real extensions never contain a `.`, so this cannot collide.
pub const SENTINEL_EXTENSION: &str = "_.";

/// Index store errors.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The real path is already indexed.
    #[error("duplicate source path: {}", .0.display())]
    DuplicatePath(PathBuf),

    /// No record carries the requested id.
    #[error("no record with id {0}")]
    NotFound(u64),

    /// The backing database failed.
    #[error("index store unavailable: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Index store result type.
pub type IndexResult<T> = Result<T, IndexError>;

/// One indexed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: u64,
    pub full_path: PathBuf,
    pub display_name: String,
    pub extension: String,
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY,
    full_path BLOB NOT NULL UNIQUE,
    display_name TEXT NOT NULL,
    extension TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_files_extension ON files(extension);
CREATE INDEX IF NOT EXISTS idx_files_display_name ON files(display_name);
"#;

/// Build the collision-free name for a record: `<base_name>_<id>`.
pub fn display_name(base_name: &str, id: u64) -> String {
    format!("{base_name}_{id}")
}

/// Database handle for the file index.
///
/// The connection sits behind a mutex: SQLite connections are not shareable
/// across threads, so every query is a short serialized critical section.
pub struct IndexDb {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for IndexDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDb").field("conn", &"<locked>").finish()
    }
}

impl IndexDb {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> IndexResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> IndexResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.create_schema()?;
        Ok(db)
    }

    /// Create the table and its lookups. Safe to call repeatedly.
    pub fn create_schema(&self) -> IndexResult<()> {
        self.conn.lock().execute_batch(SCHEMA)?;
        Ok(())
    }

    // =========================================================================
    // Writing
    // =========================================================================

    /// Insert a single record, committing immediately.
    pub fn insert(&self, full_path: &Path, base_name: &str, extension: &str) -> IndexResult<u64> {
        let conn = self.conn.lock();
        let id = next_id(&conn)?;
        insert_row(&conn, id, full_path, base_name, extension)?;
        Ok(id)
    }

    /// Run `load` against a writer holding one transaction.
    ///
    /// The transaction commits only if `load` returns `Ok`; otherwise nothing
    /// it inserted becomes visible. The store lock is held throughout, so no
    /// reader can observe a partial load.
    pub fn bulk_load<T, E, F>(&self, load: F) -> Result<T, E>
    where
        F: FnOnce(&mut IndexWriter<'_>) -> Result<T, E>,
        E: From<IndexError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(IndexError::from)?;
        let next = next_id(&tx)?;
        let mut writer = IndexWriter { tx, next_id: next };
        let out = load(&mut writer)?;
        writer.tx.commit().map_err(IndexError::from)?;
        Ok(out)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Total number of records.
    pub fn count(&self) -> IndexResult<u64> {
        let n: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Number of records carrying `extension`.
    pub fn count_by_extension(&self, extension: &str) -> IndexResult<u64> {
        let n: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM files WHERE extension = ?1",
            params![extension],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }

    /// Distinct extensions, in no particular order.
    pub fn list_extensions(&self) -> IndexResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT extension FROM files")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    /// Display names of every record under `extension`, by id.
    pub fn list_by_extension(&self, extension: &str) -> IndexResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT display_name FROM files WHERE extension = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![extension], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    /// The real path recorded for `id`.
    pub fn lookup_full_path(&self, id: u64) -> IndexResult<PathBuf> {
        let bytes: Option<Vec<u8>> = self
            .conn
            .lock()
            .query_row(
                "SELECT full_path FROM files WHERE id = ?1",
                params![id as i64],
                |row| row.get(0),
            )
            .optional()?;
        bytes
            .map(path_from_bytes)
            .ok_or(IndexError::NotFound(id))
    }

    /// Whether `display_name` exists under `extension`.
    pub fn lookup_by_display_name(&self, extension: &str, display_name: &str) -> IndexResult<bool> {
        let found: Option<i64> = self
            .conn
            .lock()
            .query_row(
                "SELECT id FROM files WHERE display_name = ?1 AND extension = ?2",
                params![display_name, extension],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Fetch a whole record by id.
    pub fn get(&self, id: u64) -> IndexResult<Option<FileRecord>> {
        let conn = self.conn.lock();
        let record = conn
            .query_row(
                "SELECT id, full_path, display_name, extension FROM files WHERE id = ?1",
                params![id as i64],
                |row| {
                    let id: i64 = row.get(0)?;
                    let bytes: Vec<u8> = row.get(1)?;
                    Ok(FileRecord {
                        id: id as u64,
                        full_path: path_from_bytes(bytes),
                        display_name: row.get(2)?,
                        extension: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }
}

/// Inserts records inside a [`IndexDb::bulk_load`] transaction.
pub struct IndexWriter<'a> {
    tx: Transaction<'a>,
    next_id: u64,
}

impl IndexWriter<'_> {
    /// Insert a record and return its id.
    ///
    /// Ids are consumed only on success, so a rejected duplicate leaves no gap.
    pub fn insert(&mut self, full_path: &Path, base_name: &str, extension: &str) -> IndexResult<u64> {
        let id = self.next_id;
        insert_row(&self.tx, id, full_path, base_name, extension)?;
        self.next_id += 1;
        Ok(id)
    }
}

fn next_id(conn: &Connection) -> IndexResult<u64> {
    let next: i64 = conn.query_row("SELECT COALESCE(MAX(id) + 1, 0) FROM files", [], |row| {
        row.get(0)
    })?;
    Ok(next as u64)
}

fn insert_row(
    conn: &Connection,
    id: u64,
    full_path: &Path,
    base_name: &str,
    extension: &str,
) -> IndexResult<()> {
    let result = conn.execute(
        "INSERT INTO files (id, full_path, display_name, extension) VALUES (?1, ?2, ?3, ?4)",
        params![
            id as i64,
            full_path.as_os_str().as_bytes(),
            display_name(base_name, id),
            extension,
        ],
    );
    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Err(IndexError::DuplicatePath(full_path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

fn path_from_bytes(bytes: Vec<u8>) -> PathBuf {
    PathBuf::from(OsStr::from_bytes(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_idempotent() {
        let db = IndexDb::in_memory().unwrap();
        db.create_schema().unwrap();
        db.create_schema().unwrap();
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let db = IndexDb::in_memory().unwrap();

        let a = db.insert(Path::new("/data/report.txt"), "report", "txt").unwrap();
        let b = db.insert(Path::new("/data/notes"), "notes", SENTINEL_EXTENSION).unwrap();

        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(db.lookup_full_path(0).unwrap(), Path::new("/data/report.txt"));
        assert_eq!(db.lookup_full_path(1).unwrap(), Path::new("/data/notes"));
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let db = IndexDb::in_memory().unwrap();
        db.insert(Path::new("/a/x.log"), "x", "log").unwrap();

        let err = db.insert(Path::new("/a/x.log"), "x", "log").unwrap_err();
        assert!(matches!(err, IndexError::DuplicatePath(p) if p == Path::new("/a/x.log")));
        assert_eq!(db.count().unwrap(), 1);
    }

    #[test]
    fn test_extension_queries() {
        let db = IndexDb::in_memory().unwrap();
        db.insert(Path::new("/a/x.log"), "x", "log").unwrap();
        db.insert(Path::new("/b/x.log"), "x", "log").unwrap();
        db.insert(Path::new("/b/y.rs"), "y", "rs").unwrap();

        assert_eq!(db.count_by_extension("log").unwrap(), 2);
        assert_eq!(db.count_by_extension("md").unwrap(), 0);

        let mut exts = db.list_extensions().unwrap();
        exts.sort();
        assert_eq!(exts, vec!["log", "rs"]);

        assert_eq!(db.list_by_extension("log").unwrap(), vec!["x_0", "x_1"]);
        assert!(db.lookup_by_display_name("log", "x_1").unwrap());
        assert!(!db.lookup_by_display_name("rs", "x_1").unwrap());
    }

    #[test]
    fn test_quotes_and_escapes_round_trip() {
        let db = IndexDb::in_memory().unwrap();
        let nasty = Path::new("/tmp/it's a \"test\"\\; DROP TABLE files;--\n.txt");
        let id = db.insert(nasty, "it's", "txt").unwrap();

        assert_eq!(db.lookup_full_path(id).unwrap(), nasty);
        assert!(db.lookup_by_display_name("txt", "it's_0").unwrap());
    }

    #[test]
    fn test_non_utf8_path_round_trip() {
        let db = IndexDb::in_memory().unwrap();
        let raw = PathBuf::from(OsStr::from_bytes(b"/data/caf\xe9.txt"));
        let id = db.insert(&raw, "caf\u{fffd}", "txt").unwrap();

        assert_eq!(db.lookup_full_path(id).unwrap(), raw);
    }

    #[test]
    fn test_lookup_missing_id() {
        let db = IndexDb::in_memory().unwrap();
        assert!(matches!(db.lookup_full_path(99), Err(IndexError::NotFound(99))));
        assert!(db.get(99).unwrap().is_none());
    }

    #[test]
    fn test_bulk_load_rolls_back_on_error() {
        let db = IndexDb::in_memory().unwrap();

        let result: IndexResult<()> = db.bulk_load(|w| {
            w.insert(Path::new("/a"), "a", SENTINEL_EXTENSION)?;
            w.insert(Path::new("/a"), "a", SENTINEL_EXTENSION)?;
            Ok(())
        });

        assert!(matches!(result, Err(IndexError::DuplicatePath(_))));
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_bulk_load_commits() {
        let db = IndexDb::in_memory().unwrap();

        let ids: IndexResult<Vec<u64>> = db.bulk_load(|w| {
            Ok(vec![
                w.insert(Path::new("/a.c"), "a", "c")?,
                w.insert(Path::new("/b.c"), "b", "c")?,
            ])
        });

        assert_eq!(ids.unwrap(), vec![0, 1]);
        let record = db.get(1).unwrap().unwrap();
        assert_eq!(record.display_name, "b_1");
        assert_eq!(record.extension, "c");
    }
}
