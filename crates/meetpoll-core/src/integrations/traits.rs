use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::TimeInterval;
use crate::error::{CalendarError, CoreError};
use crate::meeting::Meeting;
use crate::poll::Poll;

/// A busy block exactly as a provider reported it.
///
/// Not yet validated: providers occasionally return zero-length or inverted
/// blocks, which the collector drops before merging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Free/busy source for participant calendars.
///
/// Implementations are stateless between calls; one call covers one
/// participant.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Unique identifier (e.g. "google", "file").
    fn name(&self) -> &str;

    /// Busy blocks for `identity` overlapping `window`.
    async fn busy_intervals(
        &self,
        identity: &str,
        window: TimeInterval,
    ) -> Result<Vec<BusyBlock>, CalendarError>;
}

/// Meeting record store: read access plus the decided-time write-back.
#[async_trait]
pub trait MeetingStore: Send + Sync {
    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, CoreError>;

    /// Set the meeting's start/end and mark it scheduled.
    async fn commit_decided_time(&self, meeting_id: &str, slot: TimeInterval)
        -> Result<(), CoreError>;
}

/// Best-effort delivery of poll invites and results.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Called once per invitee when a poll opens.
    async fn poll_invite(&self, _poll: &Poll, _recipient: &str, _token: &str) -> Result<(), CoreError> {
        Ok(()) // default no-op
    }

    /// Called after a poll closes.
    async fn poll_result(&self, _poll: &Poll, _recipients: &[String]) -> Result<(), CoreError> {
        Ok(()) // default no-op
    }
}
