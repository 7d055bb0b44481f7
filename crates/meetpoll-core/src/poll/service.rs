//! Poll operations with per-poll serialization.
//!
//! Every mutation runs "load, apply, save" under a per-poll async lock and
//! saves with compare-and-set on the poll version, reloading on conflict.
//! The deadline sweeper goes through [`PollService::close_poll`], the same
//! path as an organizer's explicit finalize.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, instrument, warn};

use super::finalize::{finalize, Finalization};
use super::model::{Poll, PollOption, PollStatus};
use super::store::PollStore;
use super::vote::{cast_vote, ensure_accepting_votes};
use crate::auth::{TokenAuthorizer, VoteCredentials};
use crate::availability::TimeInterval;
use crate::clock::{Clock, SystemClock};
use crate::error::{AuthError, CoreError, DatabaseError, NotFoundError};
use crate::identity::same_identity;
use crate::integrations::{MeetingStore, Notifier};
use crate::meeting::{Meeting, MeetingSummary};

/// Attempts at a compare-and-set save before giving up.
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// Request to open a poll over candidate slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePoll {
    pub meeting_ref: String,
    pub organizer: String,
    pub options: Vec<TimeInterval>,
    #[serde(default)]
    pub deadline: Option<DateTime<Utc>>,
}

/// A freshly created poll with one vote token per invitee.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPoll {
    pub poll: PollView,
    pub tokens: BTreeMap<String, String>,
}

/// Poll as returned to a caller.
#[derive(Debug, Clone, Serialize)]
pub struct PollView {
    pub id: String,
    pub meeting_ref: String,
    pub organizer: String,
    pub options: Vec<PollOption>,
    pub status: PollStatus,
    pub deadline: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub is_deadline_passed: bool,
    pub total_votes: usize,
    /// Resolved identity of the caller, when credentials were presented
    pub viewer: Option<String>,
    /// Option id the caller currently votes for
    pub my_vote: Option<String>,
    pub winning_option: Option<PollOption>,
    pub meeting: Option<MeetingSummary>,
}

impl PollView {
    fn build(
        poll: &Poll,
        now: DateTime<Utc>,
        viewer: Option<String>,
        meeting: Option<&Meeting>,
    ) -> Self {
        let my_vote = viewer
            .as_deref()
            .and_then(|v| poll.vote_of(v))
            .map(|v| v.option_id.clone());
        Self {
            id: poll.id().to_string(),
            meeting_ref: poll.meeting_ref().to_string(),
            organizer: poll.organizer().to_string(),
            options: poll.options().to_vec(),
            status: poll.status().clone(),
            deadline: poll.deadline(),
            created_at: poll.created_at(),
            is_deadline_passed: poll.is_deadline_passed(now),
            total_votes: poll.votes().len(),
            viewer,
            my_vote,
            winning_option: poll.winning_option().cloned(),
            meeting: meeting.map(Meeting::summary),
        }
    }
}

/// Per-poll async locks. Entries nobody holds are pruned on access.
#[derive(Default)]
struct PollLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PollLocks {
    async fn acquire(&self, poll_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.retain(|_, m| Arc::strong_count(m) > 1);
            Arc::clone(map.entry(poll_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// Poll lifecycle operations over injected collaborators.
pub struct PollService {
    polls: Arc<dyn PollStore>,
    meetings: Arc<dyn MeetingStore>,
    notifier: Arc<dyn Notifier>,
    authorizer: TokenAuthorizer,
    clock: Arc<dyn Clock>,
    locks: PollLocks,
}

impl PollService {
    pub fn new(
        polls: Arc<dyn PollStore>,
        meetings: Arc<dyn MeetingStore>,
        notifier: Arc<dyn Notifier>,
        authorizer: TokenAuthorizer,
    ) -> Self {
        Self {
            polls,
            meetings,
            notifier,
            authorizer,
            clock: Arc::new(SystemClock),
            locks: PollLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store(&self) -> &Arc<dyn PollStore> {
        &self.polls
    }

    /// Open a poll for a meeting and invite every participant.
    ///
    /// `organizer` must be the meeting's organizer. Invites are sent in the
    /// background; the returned tokens are the same ones sent.
    #[instrument(skip(self, request), fields(meeting = %request.meeting_ref))]
    pub async fn create_poll(&self, request: CreatePoll) -> Result<CreatedPoll, CoreError> {
        let now = self.now();
        let meeting = self.require_meeting(&request.meeting_ref).await?;
        if !same_identity(&meeting.organizer, &request.organizer) {
            return Err(AuthError::OrganizerOnly("open a poll for this meeting".to_string()).into());
        }

        let poll = Poll::new(
            &meeting.id,
            &request.organizer,
            request.options,
            request.deadline,
            now,
        )?;
        self.polls.insert(&poll).await?;

        let mut tokens = BTreeMap::new();
        for invitee in meeting.invitees() {
            let token = self.authorizer.issue(&poll, &invitee, now)?;
            tokens.insert(invitee, token);
        }
        info!(
            poll_id = poll.id(),
            options = poll.options().len(),
            invitees = tokens.len(),
            "poll created"
        );

        let notifier = Arc::clone(&self.notifier);
        let invited = poll.clone();
        let invites = tokens.clone();
        tokio::spawn(async move {
            for (recipient, token) in &invites {
                if let Err(e) = notifier.poll_invite(&invited, recipient, token).await {
                    warn!(poll_id = invited.id(), recipient = %recipient, error = %e, "poll invite failed");
                }
            }
        });

        let view = PollView::build(&poll, now, Some(poll.organizer().to_string()), Some(&meeting));
        Ok(CreatedPoll { poll: view, tokens })
    }

    /// Read a poll. With credentials, the view carries the caller's vote.
    pub async fn get_poll(
        &self,
        poll_id: &str,
        viewer: Option<&VoteCredentials>,
    ) -> Result<PollView, CoreError> {
        let now = self.now();
        let poll = self.load(poll_id).await?;
        let meeting = match self.meetings.get_meeting(poll.meeting_ref()).await {
            Ok(meeting) => meeting,
            Err(e) => {
                warn!(poll_id, error = %e, "meeting context unavailable");
                None
            }
        };

        let identity = match viewer {
            Some(credentials) => {
                let invitees = invitees_of(&poll, meeting.as_ref());
                Some(self.authorizer.authorize(&poll, &invitees, credentials, now)?)
            }
            None => None,
        };
        Ok(PollView::build(&poll, now, identity, meeting.as_ref()))
    }

    /// Cast or replace the caller's vote.
    ///
    /// Closed or expired polls are rejected with a state error before any
    /// credential is examined.
    #[instrument(skip(self, credentials))]
    pub async fn vote(
        &self,
        poll_id: &str,
        option_id: &str,
        credentials: &VoteCredentials,
    ) -> Result<PollView, CoreError> {
        let _guard = self.locks.acquire(poll_id).await;
        let now = self.now();

        let poll = self.load(poll_id).await?;
        ensure_accepting_votes(&poll, now)?;
        let meeting = self.require_meeting(poll.meeting_ref()).await?;
        let voter = self
            .authorizer
            .authorize(&poll, &meeting.invitees(), credentials, now)?;

        let (poll, _) = self
            .mutate(poll, |p| cast_vote(p, option_id, &voter, now).map(|()| true))
            .await?;
        debug!(poll_id, voter = %voter, option_id, "vote recorded");

        Ok(PollView::build(&poll, now, Some(voter), Some(&meeting)))
    }

    /// Organizer-initiated close, optionally naming the winner.
    #[instrument(skip(self))]
    pub async fn finalize(
        &self,
        poll_id: &str,
        caller: &str,
        option_id: Option<&str>,
    ) -> Result<PollView, CoreError> {
        let poll = self.load(poll_id).await?;
        if !poll.is_organizer(caller) {
            return Err(AuthError::OrganizerOnly("finalize this poll".to_string()).into());
        }

        let (poll, _) = self.close_poll(poll_id, option_id).await?;
        let meeting = self.meetings.get_meeting(poll.meeting_ref()).await.unwrap_or_else(|e| {
            warn!(poll_id, error = %e, "meeting context unavailable");
            None
        });
        Ok(PollView::build(
            &poll,
            self.now(),
            Some(poll.organizer().to_string()),
            meeting.as_ref(),
        ))
    }

    /// Close a poll, write the outcome back to the meeting and notify
    /// invitees. A no-op on a closed poll.
    ///
    /// A failed write-back is logged and leaves `outcome_committed` unset
    /// for [`PollService::retry_writeback`].
    pub async fn close_poll(
        &self,
        poll_id: &str,
        explicit_option_id: Option<&str>,
    ) -> Result<(Poll, Finalization), CoreError> {
        let _guard = self.locks.acquire(poll_id).await;
        let now = self.now();

        let poll = self.load(poll_id).await?;
        let (poll, closed) = self
            .mutate(poll, |p| {
                let outcome = finalize(p, explicit_option_id, now)?;
                Ok(matches!(outcome, Finalization::Closed { .. }))
            })
            .await?;

        let Some(winning_option_id) = poll.winning_option_id().map(str::to_string) else {
            return Err(CoreError::external("poll", "closed poll has no winner"));
        };
        if !closed {
            debug!(poll_id, "poll already closed");
            return Ok((poll, Finalization::AlreadyClosed));
        }
        info!(poll_id, winning_option_id = %winning_option_id, "poll closed");

        let poll = match self.commit_outcome(poll.clone()).await {
            Ok(committed) => committed,
            Err(e) => {
                warn!(poll_id, error = %e, "meeting write-back failed; will retry");
                poll
            }
        };
        self.notify_result(&poll).await;

        Ok((poll, Finalization::Closed { winning_option_id }))
    }

    /// Retry the meeting write-back for a closed poll.
    ///
    /// Returns `true` if this call committed the outcome.
    pub async fn retry_writeback(&self, poll_id: &str) -> Result<bool, CoreError> {
        let _guard = self.locks.acquire(poll_id).await;
        let poll = self.load(poll_id).await?;
        if poll.is_open() || poll.outcome_committed() {
            return Ok(false);
        }
        self.commit_outcome(poll).await?;
        info!(poll_id, "meeting write-back committed");
        Ok(true)
    }

    /// Issue a vote token for `voter`. Organizer only.
    pub async fn issue_vote_token(
        &self,
        poll_id: &str,
        caller: &str,
        voter: &str,
    ) -> Result<String, CoreError> {
        let poll = self.load(poll_id).await?;
        if !poll.is_organizer(caller) {
            return Err(AuthError::OrganizerOnly("issue vote tokens".to_string()).into());
        }
        let meeting = self.require_meeting(poll.meeting_ref()).await?;
        if !meeting.invitees().iter().any(|i| same_identity(i, voter)) {
            return Err(AuthError::NotInvited(voter.to_string()).into());
        }
        self.authorizer.issue(&poll, voter, self.now())
    }

    async fn load(&self, poll_id: &str) -> Result<Poll, CoreError> {
        self.polls
            .get(poll_id)
            .await?
            .ok_or_else(|| NotFoundError::Poll(poll_id.to_string()).into())
    }

    async fn require_meeting(&self, meeting_id: &str) -> Result<Meeting, CoreError> {
        self.meetings
            .get_meeting(meeting_id)
            .await?
            .ok_or_else(|| NotFoundError::Meeting(meeting_id.to_string()).into())
    }

    /// Apply `apply` and save with compare-and-set, reloading and reapplying
    /// on a version conflict. `apply` returns whether it changed the poll.
    async fn mutate<F>(&self, mut poll: Poll, mut apply: F) -> Result<(Poll, bool), CoreError>
    where
        F: FnMut(&mut Poll) -> Result<bool, CoreError>,
    {
        let mut attempt = 1;
        loop {
            if !apply(&mut poll)? {
                return Ok((poll, false));
            }
            let expected = poll.version();
            poll.bump_version();
            match self.polls.save(&poll, expected).await {
                Ok(()) => return Ok((poll, true)),
                Err(CoreError::Database(DatabaseError::VersionConflict { .. }))
                    if attempt < MAX_SAVE_ATTEMPTS =>
                {
                    warn!(poll_id = poll.id(), attempt, "version conflict, reloading");
                    attempt += 1;
                    let poll_id = poll.id().to_string();
                    poll = self.load(&poll_id).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Write the winning slot to the meeting and mark the poll committed.
    /// Caller holds the poll lock.
    async fn commit_outcome(&self, poll: Poll) -> Result<Poll, CoreError> {
        let Some(slot) = poll.winning_option().map(PollOption::slot) else {
            return Ok(poll);
        };
        self.meetings
            .commit_decided_time(poll.meeting_ref(), slot)
            .await?;

        let (poll, _) = self
            .mutate(poll, |p| {
                if p.outcome_committed() {
                    return Ok(false);
                }
                p.mark_outcome_committed();
                Ok(true)
            })
            .await?;
        Ok(poll)
    }

    async fn notify_result(&self, poll: &Poll) {
        let recipients: Vec<String> = match self.meetings.get_meeting(poll.meeting_ref()).await {
            Ok(Some(meeting)) => meeting.invitees().into_iter().collect(),
            _ => poll.votes().iter().map(|v| v.voter.clone()).collect(),
        };
        let notifier = Arc::clone(&self.notifier);
        let poll = poll.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.poll_result(&poll, &recipients).await {
                warn!(poll_id = poll.id(), error = %e, "poll result notification failed");
            }
        });
    }
}

fn invitees_of(poll: &Poll, meeting: Option<&Meeting>) -> BTreeSet<String> {
    match meeting {
        Some(meeting) => meeting.invitees(),
        None => BTreeSet::from([poll.organizer().to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::{MeetingDb, PollDb};
    use chrono::{Duration, TimeZone};

    struct Silent;

    #[async_trait::async_trait]
    impl Notifier for Silent {}

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn slots() -> Vec<TimeInterval> {
        [9, 10]
            .iter()
            .map(|h| {
                let start = Utc.with_ymd_and_hms(2026, 3, 5, *h, 0, 0).unwrap();
                TimeInterval::new(start, start + Duration::minutes(30)).unwrap()
            })
            .collect()
    }

    async fn setup() -> (PollService, Arc<MeetingDb>, Meeting) {
        let meetings = Arc::new(MeetingDb::open_in_memory().unwrap());
        let meeting = Meeting::new(
            "Sync",
            "org@example.com",
            &["alice@example.com".to_string()],
            30,
        );
        meetings.insert(&meeting).await.unwrap();
        let service = PollService::new(
            Arc::new(PollDb::open_in_memory().unwrap()),
            meetings.clone(),
            Arc::new(Silent),
            TokenAuthorizer::from_seed("seed", Duration::hours(168)),
        )
        .with_clock(Arc::new(ManualClock::new(t0())));
        (service, meetings, meeting)
    }

    #[tokio::test]
    async fn only_the_meeting_organizer_can_open_a_poll() {
        let (service, _, meeting) = setup().await;
        let err = service
            .create_poll(CreatePoll {
                meeting_ref: meeting.id.clone(),
                organizer: "alice@example.com".to_string(),
                options: slots(),
                deadline: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization(AuthError::OrganizerOnly(_))));
    }

    #[tokio::test]
    async fn vote_then_finalize_writes_back() {
        let (service, meetings, meeting) = setup().await;
        let created = service
            .create_poll(CreatePoll {
                meeting_ref: meeting.id.clone(),
                organizer: "org@example.com".to_string(),
                options: slots(),
                deadline: None,
            })
            .await
            .unwrap();
        assert_eq!(created.tokens.len(), 2);

        let poll_id = created.poll.id.clone();
        let ten = created.poll.options[1].id().to_string();
        let token = created.tokens["alice@example.com"].clone();
        let view = service
            .vote(&poll_id, &ten, &VoteCredentials::token(token))
            .await
            .unwrap();
        assert_eq!(view.my_vote.as_deref(), Some(ten.as_str()));

        let closed = service.finalize(&poll_id, "org@example.com", None).await.unwrap();
        assert_eq!(closed.winning_option.unwrap().id(), ten);

        let stored = meetings.get_meeting(&meeting.id).await.unwrap().unwrap();
        assert_eq!(stored.start, Some(slots()[1].start()));
        let poll = service.store().get(&poll_id).await.unwrap().unwrap();
        assert!(poll.outcome_committed());
    }

    #[tokio::test]
    async fn non_organizer_cannot_finalize() {
        let (service, _, meeting) = setup().await;
        let created = service
            .create_poll(CreatePoll {
                meeting_ref: meeting.id.clone(),
                organizer: "org@example.com".to_string(),
                options: slots(),
                deadline: None,
            })
            .await
            .unwrap();
        let err = service
            .finalize(&created.poll.id, "alice@example.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Authorization(AuthError::OrganizerOnly(_))));
    }

    #[tokio::test]
    async fn unknown_poll_is_not_found() {
        let (service, _, _) = setup().await;
        let err = service.get_poll("missing", None).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(NotFoundError::Poll(_))));
    }
}
