//! SQLite-backed [`MeetingStore`].

use std::path::PathBuf;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_timestamp, parse_timestamp, BlockingConnection};
use crate::availability::TimeInterval;
use crate::error::{CoreError, DatabaseError, NotFoundError};
use crate::integrations::MeetingStore;
use crate::meeting::{Meeting, MeetingStatus};

/// Meeting records in the `meetings` table.
#[derive(Clone)]
pub struct MeetingDb {
    conn: BlockingConnection,
}

impl MeetingDb {
    pub fn open() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_database()?))
    }

    pub fn open_at(path: PathBuf) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_database_at(path)?))
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(super::open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: BlockingConnection::new(conn),
        }
    }

    pub async fn insert(&self, meeting: &Meeting) -> Result<(), CoreError> {
        let participants = serde_json::to_string(&meeting.participants)?;
        let meeting = meeting.clone();
        self.conn
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO meetings (id, title, organizer, participants, start_at, end_at,
                        duration_minutes, status)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        meeting.id,
                        meeting.title,
                        meeting.organizer,
                        participants,
                        meeting.start.map(format_timestamp),
                        meeting.end.map(format_timestamp),
                        meeting.duration_minutes,
                        meeting.status.as_str(),
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// All meetings, most recently scheduled last.
    pub async fn list(&self) -> Result<Vec<Meeting>, CoreError> {
        let rows = self
            .conn
            .run(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, organizer, participants, start_at, end_at,
                        duration_minutes, status
                     FROM meetings ORDER BY start_at IS NULL, start_at, title",
                )?;
                let rows = stmt
                    .query_map([], MeetingRow::from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows
            .into_iter()
            .map(MeetingRow::into_meeting)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

struct MeetingRow {
    id: String,
    title: String,
    organizer: String,
    participants: String,
    start_at: Option<String>,
    end_at: Option<String>,
    duration_minutes: i64,
    status: String,
}

impl MeetingRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            organizer: row.get(2)?,
            participants: row.get(3)?,
            start_at: row.get(4)?,
            end_at: row.get(5)?,
            duration_minutes: row.get(6)?,
            status: row.get(7)?,
        })
    }

    fn into_meeting(self) -> Result<Meeting, DatabaseError> {
        let status = MeetingStatus::parse(&self.status).ok_or_else(|| {
            DatabaseError::Corrupt(format!("meeting '{}' status '{}'", self.id, self.status))
        })?;
        let participants = serde_json::from_str(&self.participants)
            .map_err(|e| DatabaseError::Corrupt(format!("meeting '{}' participants: {e}", self.id)))?;
        Ok(Meeting {
            start: self.start_at.as_deref().map(parse_timestamp).transpose()?,
            end: self.end_at.as_deref().map(parse_timestamp).transpose()?,
            id: self.id,
            title: self.title,
            organizer: self.organizer,
            participants,
            duration_minutes: self.duration_minutes,
            status,
        })
    }
}

#[async_trait]
impl MeetingStore for MeetingDb {
    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, CoreError> {
        let meeting_id = meeting_id.to_string();
        let row = self
            .conn
            .run(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT id, title, organizer, participants, start_at, end_at,
                            duration_minutes, status
                         FROM meetings WHERE id = ?1",
                        [meeting_id],
                        MeetingRow::from_row,
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(row.map(MeetingRow::into_meeting).transpose()?)
    }

    async fn commit_decided_time(
        &self,
        meeting_id: &str,
        slot: TimeInterval,
    ) -> Result<(), CoreError> {
        let id = meeting_id.to_string();
        let updated = self
            .conn
            .run(move |conn| {
                let updated = conn.execute(
                    "UPDATE meetings SET start_at = ?2, end_at = ?3, status = ?4 WHERE id = ?1",
                    params![
                        id,
                        format_timestamp(slot.start()),
                        format_timestamp(slot.end()),
                        MeetingStatus::Scheduled.as_str(),
                    ],
                )?;
                Ok(updated)
            })
            .await?;
        if updated == 0 {
            return Err(NotFoundError::Meeting(meeting_id.to_string()).into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    #[tokio::test]
    async fn commit_marks_meeting_scheduled() {
        let db = MeetingDb::open_in_memory().unwrap();
        let meeting = Meeting::new("Review", "org@example.com", &["a@x.com".to_string()], 45);
        db.insert(&meeting).await.unwrap();

        let start = Utc.with_ymd_and_hms(2026, 4, 1, 14, 0, 0).unwrap();
        let slot = TimeInterval::new(start, start + Duration::minutes(45)).unwrap();
        db.commit_decided_time(&meeting.id, slot).await.unwrap();

        let stored = db.get_meeting(&meeting.id).await.unwrap().unwrap();
        assert_eq!(stored.status, MeetingStatus::Scheduled);
        assert_eq!(stored.start, Some(start));
        assert_eq!(stored.end, Some(slot.end()));
        assert_eq!(stored.participants, vec!["a@x.com".to_string()]);
        assert_eq!(db.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_to_unknown_meeting_is_not_found() {
        let db = MeetingDb::open_in_memory().unwrap();
        let start = Utc.with_ymd_and_hms(2026, 4, 1, 14, 0, 0).unwrap();
        let slot = TimeInterval::new(start, start + Duration::minutes(30)).unwrap();
        let err = db.commit_decided_time("nope", slot).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(NotFoundError::Meeting(_))));
    }
}
