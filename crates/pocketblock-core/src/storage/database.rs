//! SQLite-backed key/value store.
//!
//! Two databases live in the data directory:
//! - `<app_group>.db`, shared with the monitor extension
//! - `local.db`, private to the app (override deadline, onboarding flag)

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection};

use super::{data_dir, SharedStore};
use crate::error::{CoreError, StorageError};

/// SQLite key/value store.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the store shared between processes for the given app group.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_shared(app_group: &str) -> Result<Self, CoreError> {
        let path = data_dir()?.join(format!("{}.db", sanitize(app_group)));
        Ok(Self::open_at(&path)?)
    }

    /// Open the app-private store.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open_local() -> Result<Self, CoreError> {
        let path = data_dir()?.join("local.db");
        Ok(Self::open_at(&path)?)
    }

    /// Open (and create if needed) a database file.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.conn()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection mutex poisoned".into()))
    }
}

impl SharedStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.conn()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}
