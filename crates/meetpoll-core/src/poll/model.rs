//! Poll aggregate: options, votes, status and deadline.
//!
//! Fields are private. Vote counts are derived from the vote set by
//! [`Poll::retally`], and [`Poll::close`] is the only status transition.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::availability::TimeInterval;
use crate::error::ValidationError;
use crate::identity::{normalize_identity, same_identity};

/// One candidate time in a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    id: String,
    #[serde(flatten)]
    slot: TimeInterval,
    /// Derived from the poll's votes; ignored when deserializing.
    #[serde(default, skip_deserializing)]
    vote_count: usize,
}

impl PollOption {
    fn new(slot: TimeInterval) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slot,
            vote_count: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn slot(&self) -> TimeInterval {
        self.slot
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.slot.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.slot.end()
    }

    pub fn vote_count(&self) -> usize {
        self.vote_count
    }
}

/// Latest year a deadline may fall in; stored timestamps stay fixed-width
/// through it.
pub const MAX_DEADLINE_YEAR: i32 = 9999;

/// A single voter's current choice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub option_id: String,
    pub voter: String,
    pub cast_at: DateTime<Utc>,
}

/// Lifecycle state. A winner exists exactly when the poll is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollStatus {
    Open,
    Closed {
        winning_option_id: String,
        closed_at: DateTime<Utc>,
    },
}

/// A time-boxed vote over candidate meeting times.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Poll {
    id: String,
    meeting_ref: String,
    organizer: String,
    options: Vec<PollOption>,
    votes: Vec<Vote>,
    status: PollStatus,
    deadline: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    version: u64,
    outcome_committed: bool,
}

/// Persisted poll fields, as read back from storage.
#[derive(Debug, Clone)]
pub struct StoredPoll {
    pub id: String,
    pub meeting_ref: String,
    pub organizer: String,
    pub options: Vec<PollOption>,
    pub votes: Vec<Vote>,
    pub status: PollStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub version: u64,
    pub outcome_committed: bool,
}

impl Poll {
    /// Open a new poll over `slots`.
    ///
    /// # Errors
    /// Returns [`ValidationError::EmptyCollection`] with no slots, and
    /// [`ValidationError::InvalidValue`] for a deadline not after `now` or
    /// past [`MAX_DEADLINE_YEAR`].
    pub fn new(
        meeting_ref: &str,
        organizer: &str,
        slots: Vec<TimeInterval>,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if slots.is_empty() {
            return Err(ValidationError::EmptyCollection("poll options".to_string()));
        }
        if let Some(deadline) = deadline {
            if deadline <= now {
                return Err(ValidationError::InvalidValue {
                    field: "deadline".to_string(),
                    message: format!("{deadline} is not in the future"),
                });
            }
            if deadline.year() > MAX_DEADLINE_YEAR {
                return Err(ValidationError::InvalidValue {
                    field: "deadline".to_string(),
                    message: format!("{deadline} is after the year {MAX_DEADLINE_YEAR}"),
                });
            }
        }

        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            meeting_ref: meeting_ref.to_string(),
            organizer: normalize_identity(organizer),
            options: slots.into_iter().map(PollOption::new).collect(),
            votes: Vec::new(),
            status: PollStatus::Open,
            deadline,
            created_at: now,
            version: 0,
            outcome_committed: false,
        })
    }

    /// Rebuild from storage, dropping votes that reference unknown options.
    pub fn restore(stored: StoredPoll) -> Result<Self, ValidationError> {
        if stored.options.is_empty() {
            return Err(ValidationError::EmptyCollection("poll options".to_string()));
        }
        if let PollStatus::Closed {
            winning_option_id, ..
        } = &stored.status
        {
            if !stored.options.iter().any(|o| &o.id == winning_option_id) {
                return Err(ValidationError::InvalidValue {
                    field: "winning_option_id".to_string(),
                    message: format!("'{winning_option_id}' is not an option of this poll"),
                });
            }
        }

        let mut poll = Self {
            id: stored.id,
            meeting_ref: stored.meeting_ref,
            organizer: stored.organizer,
            options: stored.options,
            votes: stored.votes,
            status: stored.status,
            deadline: stored.deadline,
            created_at: stored.created_at,
            version: stored.version,
            outcome_committed: stored.outcome_committed,
        };
        let options = &poll.options;
        poll.votes
            .retain(|v| options.iter().any(|o| o.id == v.option_id));
        poll.retally();
        Ok(poll)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meeting_ref(&self) -> &str {
        &self.meeting_ref
    }

    pub fn organizer(&self) -> &str {
        &self.organizer
    }

    pub fn options(&self) -> &[PollOption] {
        &self.options
    }

    pub fn votes(&self) -> &[Vote] {
        &self.votes
    }

    pub fn status(&self) -> &PollStatus {
        &self.status
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.deadline
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Compare-and-set key; bumped on every persisted mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether the decided time has been written back to the meeting.
    pub fn outcome_committed(&self) -> bool {
        self.outcome_committed
    }

    pub fn is_open(&self) -> bool {
        matches!(self.status, PollStatus::Open)
    }

    pub fn is_organizer(&self, identity: &str) -> bool {
        same_identity(&self.organizer, identity)
    }

    /// `now >= deadline`. Always false without a deadline.
    pub fn is_deadline_passed(&self, now: DateTime<Utc>) -> bool {
        self.deadline.is_some_and(|d| now >= d)
    }

    pub fn option(&self, option_id: &str) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn winning_option_id(&self) -> Option<&str> {
        match &self.status {
            PollStatus::Open => None,
            PollStatus::Closed {
                winning_option_id, ..
            } => Some(winning_option_id),
        }
    }

    pub fn winning_option(&self) -> Option<&PollOption> {
        self.winning_option_id().and_then(|id| self.option(id))
    }

    /// The voter's current vote, if any.
    pub fn vote_of(&self, voter: &str) -> Option<&Vote> {
        self.votes.iter().find(|v| same_identity(&v.voter, voter))
    }

    /// Replace any vote by the same voter with `vote` and retally.
    pub(crate) fn replace_vote(&mut self, vote: Vote) {
        self.votes.retain(|v| !same_identity(&v.voter, &vote.voter));
        self.votes.push(vote);
        self.retally();
    }

    /// Recompute every option's count from the vote set.
    pub(crate) fn retally(&mut self) {
        for option in &mut self.options {
            option.vote_count = self
                .votes
                .iter()
                .filter(|v| v.option_id == option.id)
                .count();
        }
    }

    /// Open -> Closed. Returns false, leaving the poll untouched, if it was
    /// already closed.
    pub(crate) fn close(&mut self, winning_option_id: String, now: DateTime<Utc>) -> bool {
        if !self.is_open() {
            return false;
        }
        self.status = PollStatus::Closed {
            winning_option_id,
            closed_at: now,
        };
        true
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub(crate) fn mark_outcome_committed(&mut self) {
        self.outcome_committed = true;
    }
}
