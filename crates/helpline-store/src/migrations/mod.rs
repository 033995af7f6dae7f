//! Schema migrations for the ticket store.
//!
//! Each migration bumps the SQLite `user_version` pragma, so a database file
//! records exactly how far it has been upgraded and reopening is idempotent.

pub mod v001_initial;

use rusqlite::Connection;

use crate::error::{Result, StoreError};

type Migration = fn(&Connection) -> std::result::Result<(), rusqlite::Error>;

/// Ordered migration table. Entry `i` upgrades a database from version `i`
/// to `i + 1`.
const MIGRATIONS: &[(&str, Migration)] = &[("v001_initial", v001_initial::up)];

/// Bring the connected database up to the latest schema version.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let applied: u32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = applied,
        target_version = MIGRATIONS.len(),
        "checking ticket schema"
    );

    for (idx, (name, up)) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        tracing::info!(migration = name, "applying schema migration");
        up(conn).map_err(|e| StoreError::Migration(format!("{name}: {e}")))?;
        conn.pragma_update(None, "user_version", (idx + 1) as u32)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        let version: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version as usize, MIGRATIONS.len());

        // Running again against an up-to-date file is a no-op.
        run_migrations(&conn).unwrap();
    }
}
