//! Meeting-time polls: the aggregate, voting, finalization and the
//! services that serialize mutations and close expired polls.

pub mod finalize;
pub mod model;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod vote;

pub use finalize::{finalize, select_winner, Finalization};
pub use model::{Poll, PollOption, PollStatus, StoredPoll, Vote};
pub use service::{CreatePoll, CreatedPoll, PollService, PollView};
pub use store::PollStore;
pub use sweeper::{AutoFinalizer, SweepReport, SweeperError};
pub use vote::{cast_vote, ensure_accepting_votes};
