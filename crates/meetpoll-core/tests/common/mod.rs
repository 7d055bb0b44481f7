//! Shared fixtures for meetpoll-core integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use meetpoll_core::integrations::{MeetingStore, Notifier};
use meetpoll_core::{
    CoreError, CreatePoll, ManualClock, Meeting, MeetingDb, Poll, PollDb, PollService,
    TimeInterval, TokenAuthorizer,
};

pub const ORGANIZER: &str = "olga@example.com";
pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const CAROL: &str = "carol@example.com";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Three half-hour options on 2026-03-05 at 09:00, 10:00, 11:00 UTC.
pub fn three_slots() -> Vec<TimeInterval> {
    [9, 10, 11]
        .iter()
        .map(|h| {
            let start = Utc.with_ymd_and_hms(2026, 3, 5, *h, 0, 0).unwrap();
            TimeInterval::new(start, start + Duration::minutes(30)).unwrap()
        })
        .collect()
}

// ============================================================================
// Collaborator doubles
// ============================================================================

/// Records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    pub invites: Mutex<Vec<(String, String)>>,
    pub results: Mutex<Vec<(String, Vec<String>)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn poll_invite(&self, poll: &Poll, recipient: &str, _token: &str) -> Result<(), CoreError> {
        self.invites
            .lock()
            .unwrap()
            .push((poll.id().to_string(), recipient.to_string()));
        Ok(())
    }

    async fn poll_result(&self, poll: &Poll, recipients: &[String]) -> Result<(), CoreError> {
        self.results
            .lock()
            .unwrap()
            .push((poll.id().to_string(), recipients.to_vec()));
        Ok(())
    }
}

/// Meeting store whose write-back fails until `failures` runs out.
pub struct FlakyMeetings {
    pub inner: Arc<MeetingDb>,
    pub failures: AtomicUsize,
    pub commits: AtomicUsize,
}

impl FlakyMeetings {
    pub fn new(inner: Arc<MeetingDb>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            commits: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl MeetingStore for FlakyMeetings {
    async fn get_meeting(&self, meeting_id: &str) -> Result<Option<Meeting>, CoreError> {
        self.inner.get_meeting(meeting_id).await
    }

    async fn commit_decided_time(&self, meeting_id: &str, slot: TimeInterval) -> Result<(), CoreError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CoreError::external("meetings", "write-back unavailable"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_decided_time(meeting_id, slot).await
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub service: Arc<PollService>,
    pub polls: Arc<PollDb>,
    pub meetings: Arc<MeetingDb>,
    pub flaky: Arc<FlakyMeetings>,
    pub notifier: Arc<RecordingNotifier>,
    pub clock: Arc<ManualClock>,
    pub meeting: Meeting,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_writeback_failures(0).await
    }

    pub async fn with_writeback_failures(failures: usize) -> Self {
        let polls = Arc::new(PollDb::open_in_memory().unwrap());
        let meetings = Arc::new(MeetingDb::open_in_memory().unwrap());
        let flaky = Arc::new(FlakyMeetings::new(meetings.clone(), failures));
        let notifier = Arc::new(RecordingNotifier::default());
        let clock = Arc::new(ManualClock::new(t0()));

        let meeting = Meeting::new(
            "Quarterly planning",
            ORGANIZER,
            &[ALICE.to_string(), BOB.to_string(), CAROL.to_string()],
            30,
        );
        meetings.insert(&meeting).await.unwrap();

        let service = PollService::new(
            polls.clone(),
            flaky.clone(),
            notifier.clone(),
            TokenAuthorizer::from_seed("integration-seed", Duration::hours(168)),
        )
        .with_clock(clock.clone());

        Self {
            service: Arc::new(service),
            polls,
            meetings,
            flaky,
            notifier,
            clock,
            meeting,
        }
    }

    pub fn create_request(&self, deadline: Option<DateTime<Utc>>) -> CreatePoll {
        CreatePoll {
            meeting_ref: self.meeting.id.clone(),
            organizer: ORGANIZER.to_string(),
            options: three_slots(),
            deadline,
        }
    }
}
