//! SQLite-backed [`PollStore`].

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, BlockingConnection};
use crate::error::{CoreError, DatabaseError, NotFoundError};
use crate::poll::{Poll, PollStatus, PollStore, StoredPoll};

const SELECT_POLL: &str = "SELECT id, meeting_ref, organizer, options, votes, status,
        winning_option_id, closed_at, deadline, created_at, version, outcome_committed
     FROM polls";

/// Poll storage in the `polls` table.
#[derive(Clone)]
pub struct PollDb {
    conn: BlockingConnection,
}

impl PollDb {
    /// Open `meetpoll.db` in the data directory.
    pub fn open() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_database()?))
    }

    pub fn open_at(path: PathBuf) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_database_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_memory_database()?))
    }

    /// Wrap an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: BlockingConnection::new(conn),
        }
    }
}

fn status_columns(status: &PollStatus) -> (&'static str, Option<String>, Option<String>) {
    match status {
        PollStatus::Open => ("open", None, None),
        PollStatus::Closed {
            winning_option_id,
            closed_at,
        } => (
            "closed",
            Some(winning_option_id.clone()),
            Some(format_timestamp(*closed_at)),
        ),
    }
}

/// Raw column values, decoded outside the rusqlite row callback.
struct PollRow {
    id: String,
    meeting_ref: String,
    organizer: String,
    options: String,
    votes: String,
    status: String,
    winning_option_id: Option<String>,
    closed_at: Option<String>,
    deadline: Option<String>,
    created_at: String,
    version: i64,
    outcome_committed: bool,
}

impl PollRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            meeting_ref: row.get(1)?,
            organizer: row.get(2)?,
            options: row.get(3)?,
            votes: row.get(4)?,
            status: row.get(5)?,
            winning_option_id: row.get(6)?,
            closed_at: row.get(7)?,
            deadline: row.get(8)?,
            created_at: row.get(9)?,
            version: row.get(10)?,
            outcome_committed: row.get(11)?,
        })
    }

    fn into_poll(self) -> Result<Poll, DatabaseError> {
        let corrupt = |what: &str, e: &dyn std::fmt::Display| {
            DatabaseError::Corrupt(format!("poll '{}' {what}: {e}", self.id))
        };

        let status = match (self.status.as_str(), self.winning_option_id, self.closed_at) {
            ("open", _, _) => PollStatus::Open,
            ("closed", Some(winning_option_id), Some(closed_at)) => PollStatus::Closed {
                winning_option_id,
                closed_at: parse_timestamp(&closed_at)?,
            },
            (other, _, _) => return Err(corrupt("status", &other)),
        };
        let stored = StoredPoll {
            options: serde_json::from_str(&self.options).map_err(|e| corrupt("options", &e))?,
            votes: serde_json::from_str(&self.votes).map_err(|e| corrupt("votes", &e))?,
            deadline: self.deadline.as_deref().map(parse_timestamp).transpose()?,
            created_at: parse_timestamp(&self.created_at)?,
            version: u64::try_from(self.version).map_err(|e| corrupt("version", &e))?,
            outcome_committed: self.outcome_committed,
            status,
            id: self.id.clone(),
            meeting_ref: self.meeting_ref,
            organizer: self.organizer,
        };
        Poll::restore(stored).map_err(|e| corrupt("invariant", &e))
    }
}

#[async_trait]
impl PollStore for PollDb {
    async fn insert(&self, poll: &Poll) -> Result<(), CoreError> {
        let (status, winning_option_id, closed_at) = status_columns(poll.status());
        let id = poll.id().to_string();
        let meeting_ref = poll.meeting_ref().to_string();
        let organizer = poll.organizer().to_string();
        let options = serde_json::to_string(poll.options())?;
        let votes = serde_json::to_string(poll.votes())?;
        let deadline = poll.deadline().map(format_timestamp);
        let created_at = format_timestamp(poll.created_at());
        let version = i64::try_from(poll.version()).unwrap_or(i64::MAX);
        let committed = poll.outcome_committed();

        self.conn
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO polls (id, meeting_ref, organizer, options, votes, status,
                        winning_option_id, closed_at, deadline, created_at, version, outcome_committed)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    params![
                        id,
                        meeting_ref,
                        organizer,
                        options,
                        votes,
                        status,
                        winning_option_id,
                        closed_at,
                        deadline,
                        created_at,
                        version,
                        committed
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get(&self, poll_id: &str) -> Result<Option<Poll>, CoreError> {
        let poll_id = poll_id.to_string();
        let row = self
            .conn
            .run(move |conn| {
                let row = conn
                    .query_row(&format!("{SELECT_POLL} WHERE id = ?1"), [poll_id], PollRow::from_row)
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(row.map(PollRow::into_poll).transpose()?)
    }

    async fn save(&self, poll: &Poll, expected_version: u64) -> Result<(), CoreError> {
        let (status, winning_option_id, closed_at) = status_columns(poll.status());
        let poll_id = poll.id().to_string();
        let votes = serde_json::to_string(poll.votes())?;
        let new_version = i64::try_from(poll.version()).unwrap_or(i64::MAX);
        let expected = i64::try_from(expected_version).unwrap_or(i64::MAX);
        let committed = poll.outcome_committed();

        let id = poll_id.clone();
        let (updated, exists) = self
            .conn
            .run(move |conn| {
                let updated = conn.execute(
                    "UPDATE polls
                     SET votes = ?3, status = ?4, winning_option_id = ?5, closed_at = ?6,
                         version = ?7, outcome_committed = ?8
                     WHERE id = ?1 AND version = ?2",
                    params![id, expected, votes, status, winning_option_id, closed_at, new_version, committed],
                )?;
                let exists = updated > 0
                    || conn
                        .query_row("SELECT 1 FROM polls WHERE id = ?1", [&id], |_| Ok(()))
                        .optional()?
                        .is_some();
                Ok((updated, exists))
            })
            .await?;

        match (updated, exists) {
            (0, false) => Err(NotFoundError::Poll(poll_id).into()),
            (0, true) => Err(DatabaseError::VersionConflict {
                poll_id,
                expected: expected_version,
            }
            .into()),
            _ => Ok(()),
        }
    }

    async fn list_expired_open(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError> {
        let now = format_timestamp(now);
        let ids = self
            .conn
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM polls
                     WHERE status = 'open' AND deadline IS NOT NULL AND deadline <= ?1
                     ORDER BY deadline",
                )?;
                let ids = stmt
                    .query_map([now], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }

    async fn list_uncommitted_closed(&self) -> Result<Vec<String>, CoreError> {
        let ids = self
            .conn
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id FROM polls
                     WHERE status = 'closed' AND outcome_committed = 0
                     ORDER BY closed_at",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<Result<Vec<String>, _>>()?;
                Ok(ids)
            })
            .await?;
        Ok(ids)
    }
}
