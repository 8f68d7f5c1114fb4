//! The embedded SQL engine wrapper.
//!
//! `Store` owns exactly one `rusqlite::Connection`. It is synchronous by
//! design — the same way `rusqlite` itself is synchronous — and is
//! always driven from inside `tokio::task::spawn_blocking` by
//! [`crate::pool::ConnectionPool`]; nothing in this module touches an
//! async runtime directly.

use crate::error::from_rusqlite;
use crate::migrations::{self, MIGRATIONS};
use chronicle_types::ChronicleError;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction};
use std::fs;
use std::path::Path;

/// Tunable pragma values; defaults match the documented tunables below.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Page cache size, in kibibytes. Negative `cache_size` pragma values
    /// are KB-denominated in SQLite; this is stored as a positive KB
    /// count and negated when applied.
    pub cache_size_kb: u32,
    /// Memory-mapped I/O region size, in bytes.
    pub mmap_size_bytes: u64,
    /// Milliseconds SQLite will wait on a locked database before
    /// returning `SQLITE_BUSY`.
    pub busy_timeout_ms: u32,
    /// Open the database read-only and skip migrations.
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_size_kb: 2000,
            mmap_size_bytes: 256 * 1024 * 1024,
            busy_timeout_ms: 5000,
            read_only: false,
        }
    }
}

/// Owns one SQLite connection: pragmas, migrations, and the primitive
/// `exec`/`query`/`tx` operations every repository is built on.
pub struct Store {
    conn: Connection,
    read_only: bool,
}

impl Store {
    /// Open (creating if absent, and creating the parent directory if
    /// absent) the database at `path`, apply pragmas, and — unless
    /// `config.read_only` — run pending migrations.
    ///
    /// Fails with `StoreUnavailable` if the connection cannot be
    /// established, `SchemaTooNew` if the on-disk version exceeds the
    /// latest version this binary knows about.
    pub fn open(path: &Path, config: &StoreConfig) -> Result<Self, ChronicleError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ChronicleError::StoreUnavailable(format!(
                        "creating db directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }

        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
        };

        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| ChronicleError::StoreUnavailable(format!("opening {}: {e}", path.display())))?;

        let mut store = Self {
            conn,
            read_only: config.read_only,
        };
        store.apply_pragmas(config)?;

        if !config.read_only {
            store.init_persistence_state()?;
            store.run_migrations()?;
        } else {
            store.check_schema_not_too_new()?;
        }

        Ok(store)
    }

    /// Open an in-memory database. Used by tests and by components that
    /// need a throwaway store (e.g. benchmarks).
    pub fn open_in_memory() -> Result<Self, ChronicleError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ChronicleError::StoreUnavailable(format!("opening in-memory db: {e}")))?;
        let mut store = Self {
            conn,
            read_only: false,
        };
        let config = StoreConfig::default();
        store.apply_pragmas(&config)?;
        store.init_persistence_state()?;
        store.run_migrations()?;
        Ok(store)
    }

    fn apply_pragmas(&mut self, config: &StoreConfig) -> Result<(), ChronicleError> {
        let cache_size_pragma = -(config.cache_size_kb as i64);
        self.conn
            .execute_batch(&format!(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
                PRAGMA cache_size = {cache_size_pragma};
                PRAGMA mmap_size = {mmap};
                PRAGMA busy_timeout = {timeout};
                PRAGMA foreign_keys = ON;
                "#,
                mmap = config.mmap_size_bytes,
                timeout = config.busy_timeout_ms,
            ))
            .map_err(from_rusqlite)
    }

    fn init_persistence_state(&mut self) -> Result<(), ChronicleError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS persistence_state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                );",
            )
            .map_err(from_rusqlite)?;

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT value FROM persistence_state WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
            )
            .optional()
            .map_err(from_rusqlite)?;

        if existing.is_none() {
            self.conn
                .execute(
                    "INSERT INTO persistence_state(key, value, updated_at) VALUES ('schema_version', '0', ?1)",
                    [now_millis()],
                )
                .map_err(from_rusqlite)?;
        }
        Ok(())
    }

    fn current_version(&self) -> Result<i64, ChronicleError> {
        self.conn
            .query_row(
                "SELECT value FROM persistence_state WHERE key = 'schema_version'",
                [],
                |row| row.get::<_, String>(0).map(|s| s.parse().unwrap_or(0)),
            )
            .optional()
            .map_err(from_rusqlite)
            .map(|v| v.unwrap_or(0))
    }

    fn check_schema_not_too_new(&self) -> Result<(), ChronicleError> {
        let on_disk = self.current_version()?;
        let latest = migrations::latest_version();
        if on_disk > latest {
            return Err(ChronicleError::SchemaTooNew { on_disk, latest });
        }
        Ok(())
    }

    fn run_migrations(&mut self) -> Result<(), ChronicleError> {
        migrations::validate(MIGRATIONS).map_err(ChronicleError::Internal)?;

        let on_disk = self.current_version()?;
        let latest = migrations::latest_version();
        if on_disk > latest {
            return Err(ChronicleError::SchemaTooNew { on_disk, latest });
        }

        for migration in MIGRATIONS.iter().filter(|m| m.version > on_disk) {
            tracing::info!(version = migration.version, description = migration.description, "applying migration");
            let tx = self.conn.transaction().map_err(from_rusqlite)?;
            for stmt in migration.up {
                tx.execute_batch(stmt).map_err(from_rusqlite)?;
            }
            tx.execute(
                "UPDATE persistence_state SET value = ?1, updated_at = ?2 WHERE key = 'schema_version'",
                rusqlite::params![migration.version.to_string(), now_millis()],
            )
            .map_err(from_rusqlite)?;
            tx.commit().map_err(from_rusqlite)?;
        }
        Ok(())
    }

    /// Apply `down` statements for every migration newer than `target`,
    /// in descending version order.
    pub fn rollback_to(&mut self, target: i64) -> Result<(), ChronicleError> {
        let on_disk = self.current_version()?;
        let mut pending: Vec<&migrations::Migration> =
            MIGRATIONS.iter().filter(|m| m.version > target && m.version <= on_disk).collect();
        pending.sort_by(|a, b| b.version.cmp(&a.version));

        for migration in pending {
            let tx = self.conn.transaction().map_err(from_rusqlite)?;
            for stmt in migration.down {
                tx.execute_batch(stmt).map_err(from_rusqlite)?;
            }
            tx.execute(
                "UPDATE persistence_state SET value = ?1, updated_at = ?2 WHERE key = 'schema_version'",
                rusqlite::params![(migration.version - 1).to_string(), now_millis()],
            )
            .map_err(from_rusqlite)?;
            tx.commit().map_err(from_rusqlite)?;
        }
        Ok(())
    }

    /// The schema version currently recorded in `persistence_state`.
    pub fn schema_version(&self) -> Result<i64, ChronicleError> {
        self.current_version()
    }

    /// Run `f` inside a transaction; the transaction commits if `f`
    /// returns `Ok`, rolls back (dropped, never committed) otherwise.
    /// Serializable from the caller's perspective because `rusqlite`
    /// holds the one connection's write lock for the duration.
    pub fn tx<T>(
        &mut self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, ChronicleError>,
    ) -> Result<T, ChronicleError> {
        if self.read_only {
            return Err(ChronicleError::StoreUnavailable(
                "store is read-only".to_string(),
            ));
        }
        let tx = self.conn.transaction().map_err(from_rusqlite)?;
        let result = f(&tx)?;
        tx.commit().map_err(from_rusqlite)?;
        Ok(result)
    }

    /// Borrow the underlying connection for direct `rusqlite` use by
    /// repositories that need statement-level control.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Force a WAL checkpoint, flushing the write-ahead log into the
    /// main database file.
    pub fn checkpoint(&self) -> Result<(), ChronicleError> {
        self.conn
            .execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            .map_err(from_rusqlite)
    }

    /// Refresh the query planner's table statistics.
    pub fn analyze(&self) -> Result<(), ChronicleError> {
        self.conn.execute_batch("ANALYZE;").map_err(from_rusqlite)
    }

    /// Rebuild the database file to reclaim free space. Not available on
    /// a read-only store.
    pub fn vacuum(&self) -> Result<(), ChronicleError> {
        if self.read_only {
            return Err(ChronicleError::StoreUnavailable(
                "cannot VACUUM a read-only store".to_string(),
            ));
        }
        self.conn.execute_batch("VACUUM;").map_err(from_rusqlite)
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_in_memory_runs_all_migrations() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), migrations::latest_version());
    }

    #[test]
    fn running_migrations_twice_is_a_fixpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chronicle.db");
        let config = StoreConfig::default();
        {
            let _store = Store::open(&path, &config).unwrap();
        }
        let store = Store::open(&path, &config).unwrap();
        assert_eq!(store.schema_version().unwrap(), migrations::latest_version());
    }

    #[test]
    fn tx_commits_on_success_and_is_visible_after() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .tx(|tx| {
                tx.execute(
                    "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES (?1, ?2, ?2, NULL, '{}')",
                    rusqlite::params!["c1", 1000_i64],
                )
                .map_err(from_rusqlite)?;
                Ok(())
            })
            .unwrap();

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn tx_rolls_back_on_error() {
        let mut store = Store::open_in_memory().unwrap();
        let result = store.tx(|tx| {
            tx.execute(
                "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES (?1, ?2, ?2, NULL, '{}')",
                rusqlite::params!["c1", 1000_i64],
            )
            .map_err(from_rusqlite)?;
            Err(ChronicleError::Internal("boom".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM conversations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn self_parent_message_is_rejected() {
        let mut store = Store::open_in_memory().unwrap();
        store
            .tx(|tx| {
                tx.execute(
                    "INSERT INTO conversations(id, created_at, updated_at, title, metadata) VALUES ('c1', 1, 1, NULL, '{}')",
                    [],
                )
                .map_err(from_rusqlite)
            })
            .unwrap();

        let result = store.tx(|tx| {
            tx.execute(
                "INSERT INTO messages(id, conversation_id, role, content, created_at, parent_message_id, metadata)
                 VALUES ('m1', 'c1', 'user', 'hi', 1, 'm1', '{}')",
                [],
            )
            .map_err(from_rusqlite)
        });
        assert!(result.is_err());
    }
}
