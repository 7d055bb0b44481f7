//! Vote validation and application.

use chrono::{DateTime, Utc};

use super::model::{Poll, Vote};
use crate::error::{CoreError, NotFoundError, StateError};
use crate::identity::normalize_identity;

/// Fail unless the poll is open and before its deadline.
pub fn ensure_accepting_votes(poll: &Poll, now: DateTime<Utc>) -> Result<(), StateError> {
    if !poll.is_open() {
        return Err(StateError::PollClosed(poll.id().to_string()));
    }
    if let Some(deadline) = poll.deadline() {
        if now >= deadline {
            return Err(StateError::DeadlinePassed {
                poll_id: poll.id().to_string(),
                deadline,
            });
        }
    }
    Ok(())
}

/// Record `voter`'s choice of `option_id`, replacing any earlier vote.
///
/// # Errors
/// [`StateError`] when the poll is closed or past its deadline;
/// [`NotFoundError::Option`] when the option does not exist.
pub fn cast_vote(
    poll: &mut Poll,
    option_id: &str,
    voter: &str,
    now: DateTime<Utc>,
) -> Result<(), CoreError> {
    ensure_accepting_votes(poll, now)?;
    if poll.option(option_id).is_none() {
        return Err(NotFoundError::Option {
            poll_id: poll.id().to_string(),
            option_id: option_id.to_string(),
        }
        .into());
    }

    poll.replace_vote(Vote {
        option_id: option_id.to_string(),
        voter: normalize_identity(voter),
        cast_at: now,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::availability::TimeInterval;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn poll_with_deadline(deadline: Option<DateTime<Utc>>) -> Poll {
        let slots = [9, 10, 11]
            .iter()
            .map(|h| {
                let start = Utc.with_ymd_and_hms(2026, 3, 2, *h, 0, 0).unwrap();
                TimeInterval::new(start, start + Duration::minutes(30)).unwrap()
            })
            .collect();
        Poll::new("m1", "org@example.com", slots, deadline, now()).unwrap()
    }

    fn option(poll: &Poll, idx: usize) -> String {
        poll.options()[idx].id().to_string()
    }

    #[test]
    fn revote_replaces_previous_choice() {
        let mut poll = poll_with_deadline(None);
        let (a, b) = (option(&poll, 0), option(&poll, 1));

        cast_vote(&mut poll, &a, "Alice@Example.com", now()).unwrap();
        cast_vote(&mut poll, &b, "alice@example.com", now() + Duration::minutes(1)).unwrap();

        assert_eq!(poll.votes().len(), 1);
        assert_eq!(poll.vote_of("alice@example.com").unwrap().option_id, b);
        assert_eq!(poll.option(&a).unwrap().vote_count(), 0);
        assert_eq!(poll.option(&b).unwrap().vote_count(), 1);
    }

    #[test]
    fn counts_always_sum_to_votes() {
        let mut poll = poll_with_deadline(None);
        let ids: Vec<String> = (0..3).map(|i| option(&poll, i)).collect();
        for (n, voter) in ["a@x.com", "b@x.com", "c@x.com", "a@x.com", "d@x.com"].iter().enumerate() {
            cast_vote(&mut poll, &ids[n % 3], voter, now()).unwrap();
            let total: usize = poll.options().iter().map(|o| o.vote_count()).sum();
            assert_eq!(total, poll.votes().len());
        }
        assert_eq!(poll.votes().len(), 4);
    }

    #[test]
    fn unknown_option_is_not_found() {
        let mut poll = poll_with_deadline(None);
        let err = cast_vote(&mut poll, "nope", "a@x.com", now()).unwrap_err();
        assert!(matches!(err, CoreError::NotFound(NotFoundError::Option { .. })));
        assert!(poll.votes().is_empty());
    }

    #[test]
    fn vote_at_or_after_deadline_is_rejected() {
        let deadline = now() + Duration::hours(1);
        let mut poll = poll_with_deadline(Some(deadline));
        let a = option(&poll, 0);

        cast_vote(&mut poll, &a, "a@x.com", deadline - Duration::seconds(1)).unwrap();
        let err = cast_vote(&mut poll, &a, "b@x.com", deadline).unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::DeadlinePassed { .. })));
    }

    #[test]
    fn vote_on_closed_poll_is_rejected() {
        let mut poll = poll_with_deadline(None);
        let a = option(&poll, 0);
        poll.close(a.clone(), now());
        let err = cast_vote(&mut poll, &a, "a@x.com", now()).unwrap_err();
        assert!(matches!(err, CoreError::State(StateError::PollClosed(_))));
    }
}
