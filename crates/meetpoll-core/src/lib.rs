//! # Meetpoll Core Library
//!
//! Availability suggestions and meeting-time polls. The CLI in
//! `meetpoll-cli` is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Availability**: collects participants' busy time concurrently, merges
//!   it, enumerates free slots in a window and ranks them across dayparts
//! - **Polls**: a poll aggregate with a single close transition, voting and
//!   finalization, a service that serializes mutations per poll, and a
//!   cancellable background sweep for expired polls
//! - **Auth**: HMAC-signed vote tokens scoped to one voter and one poll
//! - **Storage**: SQLite persistence for polls and meetings, TOML config
//! - **Integrations**: calendar providers, meeting store and notifier
//!   traits, with Google free/busy, file-backed and logging implementations
//!
//! ## Key Components
//!
//! - [`SuggestionService`]: ranked candidate slots for a set of participants
//! - [`PollService`]: create, vote, finalize and read polls
//! - [`AutoFinalizer`]: closes polls whose deadline has passed
//! - [`TokenAuthorizer`]: issues and checks vote tokens
//! - [`Config`]: application configuration management

pub mod auth;
pub mod availability;
pub mod clock;
pub mod error;
pub mod identity;
pub mod integrations;
pub mod meeting;
pub mod poll;
pub mod storage;

pub use auth::{TokenAuthorizer, VoteCredentials};
pub use availability::{
    merge_intervals, SlotGenerator, SlotPrioritizer, SuggestionRequest, SuggestionResponse,
    SuggestionService, TimeInterval,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    AuthError, CalendarError, ConfigError, CoreError, DatabaseError, NotFoundError, StateError,
    ValidationError,
};
pub use integrations::{CalendarProvider, MeetingStore, Notifier};
pub use meeting::{Meeting, MeetingStatus, MeetingSummary};
pub use poll::{
    AutoFinalizer, CreatePoll, CreatedPoll, Finalization, Poll, PollOption, PollService,
    PollStatus, PollView, SweepReport,
};
pub use storage::{Config, MeetingDb, PollDb};
