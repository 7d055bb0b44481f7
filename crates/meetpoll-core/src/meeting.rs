//! Meeting records as seen by the poll engine.
//!
//! The meeting store itself is an external collaborator; this module only
//! defines the shape the engine reads (participants, organizer) and the
//! decided-time write-back it performs.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::normalize_identity;

/// Scheduling status of a meeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    /// Time is being decided by a poll
    AwaitingPoll,
    /// Time is fixed
    Scheduled,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::AwaitingPoll => "awaiting_poll",
            MeetingStatus::Scheduled => "scheduled",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "awaiting_poll" => Some(MeetingStatus::AwaitingPoll),
            "scheduled" => Some(MeetingStatus::Scheduled),
            "cancelled" => Some(MeetingStatus::Cancelled),
            _ => None,
        }
    }
}

/// A meeting whose time may be decided by a poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    pub id: String,
    pub title: String,
    pub organizer: String,
    pub participants: Vec<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub status: MeetingStatus,
}

impl Meeting {
    /// Create a meeting awaiting a poll, with normalized identities.
    pub fn new(title: &str, organizer: &str, participants: &[String], duration_minutes: i64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            organizer: normalize_identity(organizer),
            participants: participants.iter().map(|p| normalize_identity(p)).collect(),
            start: None,
            end: None,
            duration_minutes,
            status: MeetingStatus::AwaitingPoll,
        }
    }

    /// Everyone allowed to vote: participants plus the organizer.
    pub fn invitees(&self) -> BTreeSet<String> {
        self.participants
            .iter()
            .chain(std::iter::once(&self.organizer))
            .map(|p| normalize_identity(p))
            .collect()
    }

    pub fn summary(&self) -> MeetingSummary {
        MeetingSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            organizer: self.organizer.clone(),
            start: self.start,
            end: self.end,
            status: self.status,
            participant_count: self.participants.len(),
        }
    }
}

/// Read-only meeting context attached to poll views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingSummary {
    pub id: String,
    pub title: String,
    pub organizer: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub status: MeetingStatus,
    pub participant_count: usize,
}
