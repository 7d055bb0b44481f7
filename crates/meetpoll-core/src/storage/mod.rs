mod config;
pub mod meeting_db;
pub mod migrations;
pub mod poll_db;

pub use config::{AuthSettings, Config, PollSettings, SuggestionSettings, SIGNING_SEED_ENV};
pub use meeting_db::MeetingDb;
pub use poll_db::PollDb;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;

use crate::error::DatabaseError;

/// Returns `~/.config/meetpoll[-dev]/` based on MEETPOLL_ENV.
///
/// Set MEETPOLL_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("MEETPOLL_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("meetpoll-dev")
    } else {
        base_dir.join("meetpoll")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Open `meetpoll.db` in the data directory and apply migrations.
///
/// Poll and meeting tables share one file; callers open one connection per
/// store.
pub fn open_database() -> Result<Connection, DatabaseError> {
    let dir = data_dir().map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
    open_database_at(dir.join("meetpoll.db"))
}

/// Open (creating if needed) a database file at `path` and migrate it.
pub fn open_database_at(path: PathBuf) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
        path: path.clone(),
        source,
    })?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
    Ok(conn)
}

/// In-memory database with the current schema (tests, dry runs).
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    migrations::migrate(&conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
    Ok(conn)
}

/// A connection shared by async callers; each call runs on the blocking pool.
#[derive(Clone)]
pub(crate) struct BlockingConnection {
    conn: Arc<Mutex<Connection>>,
}

impl BlockingConnection {
    pub(crate) fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&guard)
        })
        .await?
    }
}

/// UTC timestamps that sort and compare as text for years 0000 to 9999;
/// later years gain a sign and extra digits.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt(format!("bad timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamps_sort_as_text() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert!(format_timestamp(a) < format_timestamp(b));
        assert_eq!(parse_timestamp(&format_timestamp(b)).unwrap(), b);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
