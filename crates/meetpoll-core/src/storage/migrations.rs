//! Database schema migrations for meetpoll.
//!
//! Migrations are versioned and applied automatically when opening the database.
//! The `schema_version` table tracks the current migration version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
///
/// Increment this when adding new migrations.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version from the database.
///
/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| {
        row.get::<_, i32>(0)
    })
    .unwrap_or_else(|e| {
        if !matches!(e, rusqlite::Error::QueryReturnedNoRows) {
            tracing::warn!(error = %e, "failed to read schema_version");
        }
        0
    })
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: meetings and polls.
///
/// Poll options and votes are stored as JSON arrays. Vote counts inside the
/// options column are ignored and recomputed on load.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS meetings (
            id               TEXT PRIMARY KEY,
            title            TEXT NOT NULL,
            organizer        TEXT NOT NULL,
            participants     TEXT NOT NULL DEFAULT '[]',
            start_at         TEXT,
            end_at           TEXT,
            duration_minutes INTEGER NOT NULL,
            status           TEXT NOT NULL DEFAULT 'awaiting_poll'
        );

        CREATE TABLE IF NOT EXISTS polls (
            id                TEXT PRIMARY KEY,
            meeting_ref       TEXT NOT NULL,
            organizer         TEXT NOT NULL,
            options           TEXT NOT NULL,
            votes             TEXT NOT NULL DEFAULT '[]',
            status            TEXT NOT NULL DEFAULT 'open',
            winning_option_id TEXT,
            closed_at         TEXT,
            deadline          TEXT,
            created_at        TEXT NOT NULL,
            version           INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_polls_meeting_ref ON polls(meeting_ref);",
    )?;

    set_schema_version(&tx, 1)?;
    tx.commit()?;
    Ok(())
}

/// Migration v2: track meeting write-back separately from closing.
///
/// Adds `outcome_committed` so a failed write-back can be retried after the
/// poll has already closed, and an index for the deadline sweep.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute_batch(
        "ALTER TABLE polls ADD COLUMN outcome_committed INTEGER NOT NULL DEFAULT 0;
         UPDATE polls SET outcome_committed = 1 WHERE status = 'closed';
         CREATE INDEX IF NOT EXISTS idx_polls_status_deadline ON polls(status, deadline);",
    )?;

    set_schema_version(&tx, 2)?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_database_reaches_current_version() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);
    }

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let has_column: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('polls') WHERE name = 'outcome_committed'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(has_column, 1);
    }
}
