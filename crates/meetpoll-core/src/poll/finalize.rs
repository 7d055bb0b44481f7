//! Winner selection and poll closing.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::model::{Poll, PollOption};
use crate::error::NotFoundError;

/// Outcome of a [`finalize`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Finalization {
    /// This call closed the poll.
    Closed { winning_option_id: String },
    /// The poll was closed earlier; nothing changed.
    AlreadyClosed,
}

/// Highest vote count wins; ties go to the earliest start, then to the
/// option listed first.
pub fn select_winner(options: &[PollOption]) -> Option<&PollOption> {
    options.iter().reduce(|best, candidate| {
        let better = candidate.vote_count() > best.vote_count()
            || (candidate.vote_count() == best.vote_count() && candidate.start() < best.start());
        if better {
            candidate
        } else {
            best
        }
    })
}

/// Close `poll`, choosing `explicit_option_id` or the majority winner.
///
/// Finalizing a closed poll is a no-op that returns
/// [`Finalization::AlreadyClosed`].
///
/// # Errors
/// [`NotFoundError::Option`] when `explicit_option_id` is not an option.
pub fn finalize(
    poll: &mut Poll,
    explicit_option_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Finalization, NotFoundError> {
    if !poll.is_open() {
        return Ok(Finalization::AlreadyClosed);
    }

    let winner = match explicit_option_id {
        Some(id) => poll.option(id).ok_or_else(|| NotFoundError::Option {
            poll_id: poll.id().to_string(),
            option_id: id.to_string(),
        })?,
        None => select_winner(poll.options()).ok_or_else(|| NotFoundError::Option {
            poll_id: poll.id().to_string(),
            option_id: "(none)".to_string(),
        })?,
    };
    let winning_option_id = winner.id().to_string();

    poll.close(winning_option_id.clone(), now);
    Ok(Finalization::Closed { winning_option_id })
}
