//! Connection handling for the ticket store.
//!
//! [`Database`] owns a single [`rusqlite::Connection`] and runs migrations
//! before handing it to anyone. The server wraps one instance in a mutex and
//! keeps critical sections short; WAL mode plus a busy timeout make that
//! sharing model cheap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

const DB_FILE: &str = "tickets.db";

/// SQLite-backed ticket store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the ticket database in the platform data directory,
    /// e.g. `~/.local/share/helpline/tickets.db` on Linux.
    pub fn new() -> Result<Self> {
        let dirs = ProjectDirs::from("dev", "helpline", "helpline").ok_or(StoreError::NoDataDir)?;
        std::fs::create_dir_all(dirs.data_dir())?;

        let path = dirs.data_dir().join(DB_FILE);
        tracing::info!(path = %path.display(), "opening ticket database");
        Self::open_at(&path)
    }

    /// Open (or create) the database at an explicit path. Tests and
    /// volume-mounted deployments use this directly.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        configure(&conn)?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// The underlying connection, for ad-hoc queries. The typed helpers in
    /// [`crate::tickets`] cover everything the application needs.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Mutable access, required by `rusqlite` to start a transaction.
    pub fn conn_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Filesystem path of the open database, when it is file-backed.
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

fn configure(conn: &Connection) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    // Writers queue briefly instead of failing when the file is contended.
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DB_FILE);

        let db = Database::open_at(&path).expect("first open");
        drop(db);

        let db = Database::open_at(&path).expect("reopen");
        assert_eq!(db.path().unwrap(), path);
    }

    #[test]
    fn wal_mode_is_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join(DB_FILE)).unwrap();

        let mode: String = db
            .conn()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
