//! Schema migration runner. A single migration creates the whole schema;
//! later migrations would be appended in version order.

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "organizations, projects, api keys, provider keys, custom providers, logs, transactions, locks",
    sql: include_str!("migrations/v001_schema.sql"),
}];

pub fn run_migrations(conn: &Connection) -> Result<u32> {
    ensure_version_table(conn)?;
    let current = current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version <= current {
            debug!(version = migration.version, "migration already applied");
            continue;
        }
        info!(version = migration.version, description = migration.description, "applying migration");
        apply_migration(conn, migration)?;
        applied += 1;
    }
    Ok(applied)
}

fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)")?;
    Ok(())
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0)).ok();
    Ok(version.unwrap_or(0))
}

fn apply_migration(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute_batch("BEGIN")
        .map_err(|e| StoreError::Migration { message: e.to_string() })?;
    let result = conn
        .execute_batch(migration.sql)
        .and_then(|()| conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [migration.version]));
    match result {
        Ok(_) => {
            conn.execute_batch("COMMIT").map_err(|e| StoreError::Migration { message: e.to_string() })?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(StoreError::Migration {
                message: format!("migration {} failed: {e}", migration.version),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_migrations_from_zero() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, 1);
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn second_run_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let applied = run_migrations(&conn).unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn schema_creates_expected_tables() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='logs'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }
}
