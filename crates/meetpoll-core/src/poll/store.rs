use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::Poll;
use crate::error::CoreError;

/// Persistence for polls with compare-and-set on [`Poll::version`].
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Store a freshly created poll.
    async fn insert(&self, poll: &Poll) -> Result<(), CoreError>;

    async fn get(&self, poll_id: &str) -> Result<Option<Poll>, CoreError>;

    /// Persist `poll` only if the stored version still equals
    /// `expected_version`.
    ///
    /// # Errors
    /// `DatabaseError::VersionConflict` when another writer got there first.
    async fn save(&self, poll: &Poll, expected_version: u64) -> Result<(), CoreError>;

    /// Ids of open polls whose deadline is at or before `now`.
    async fn list_expired_open(&self, now: DateTime<Utc>) -> Result<Vec<String>, CoreError>;

    /// Ids of closed polls whose outcome has not reached the meeting store.
    async fn list_uncommitted_closed(&self) -> Result<Vec<String>, CoreError>;
}
