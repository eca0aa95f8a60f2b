//! Database connection management.

use crate::environment::Environment;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A single connection to one environment's database.
///
/// Connections are opened per logical operation and closed on drop, so no
/// SQLite lock outlives the call that needed it.
#[derive(Debug)]
pub struct Database {
    connection: Connection,
    path: Option<PathBuf>,
}

impl Database {
    /// Get the default data root based on the GESTIA_HOME environment variable.
    ///
    /// Falls back to the current working directory, which is where the
    /// `data/<environment>/` directories live in a checkout.
    pub fn default_root() -> PathBuf {
        std::env::var_os("GESTIA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Open the database of `environment` under `root`.
    pub fn open_environment(root: &Path, environment: Environment) -> crate::Result<Self> {
        Self::open(environment.database_path(root))
    }

    /// Open a database connection at the specified path.
    ///
    /// If the file or its parent directory doesn't exist, they are created.
    /// Every failure is reported as [`crate::Error::StorageUnavailable`].
    pub fn open<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| crate::Error::storage_unavailable(path, e.to_string()))?;
        }

        let connection = Connection::open(path)
            .map_err(|e| crate::Error::storage_unavailable(path, e.to_string()))?;
        Self::configure(&connection)
            .map_err(|e| crate::Error::storage_unavailable(path, e.to_string()))?;

        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing database without write access.
    ///
    /// Used by read-only reports; a missing file is an error rather than
    /// being created.
    pub fn open_read_only<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| crate::Error::storage_unavailable(path, e.to_string()))?;
        Self::configure(&connection)
            .map_err(|e| crate::Error::storage_unavailable(path, e.to_string()))?;

        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> crate::Result<Self> {
        let connection = Connection::open_in_memory()?;
        Self::configure(&connection)?;
        Ok(Self {
            connection,
            path: None,
        })
    }

    fn configure(conn: &Connection) -> rusqlite::Result<()> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        // SQLite reads the file header lazily; touch it so a file that is not
        // a database fails here rather than at the first real query.
        conn.query_row("SELECT COUNT(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })?;
        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Get the database file path (None for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `table` exists in this database.
    pub fn table_exists(&self, table: &str) -> crate::Result<bool> {
        let count: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// List the columns currently defined on `table`, in declaration order.
    ///
    /// A table that does not exist has no columns.
    pub fn table_columns(&self, table: &str) -> crate::Result<Vec<String>> {
        let mut stmt = self
            .connection
            .prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    /// Execute a transaction with automatic rollback on error.
    pub fn transaction<F, T>(&self, f: F) -> crate::Result<T>
    where
        F: FnOnce(&Connection) -> crate::Result<T>,
    {
        let tx = self.connection.unchecked_transaction()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                tx.rollback()?;
                Err(e)
            }
        }
    }
}
