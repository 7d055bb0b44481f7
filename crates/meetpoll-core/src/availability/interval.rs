//! Half-open UTC time intervals and busy-timeline merging.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A half-open `[start, end)` range in UTC.
///
/// `end > start` holds for every value of this type: construction and
/// deserialization both go through [`TimeInterval::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawInterval> for TimeInterval {
    type Error = ValidationError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        TimeInterval::new(raw.start, raw.end)
    }
}

impl TimeInterval {
    /// Create an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::InvalidTimeRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build from bounds the caller has already checked.
    pub(crate) fn new_unchecked(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        debug_assert!(end > start);
        Self { start, end }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Get duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        self.duration().num_minutes()
    }

    /// True when the two ranges share at least one instant.
    ///
    /// Touching intervals (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// True when `other` lies entirely inside `self`.
    pub fn contains(&self, other: &TimeInterval) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// Merge possibly-overlapping intervals into a sorted, non-overlapping list.
///
/// Touching intervals are merged as well, so the output never contains two
/// entries where one ends exactly when the next begins.
pub fn merge_intervals(mut intervals: Vec<TimeInterval>) -> Vec<TimeInterval> {
    intervals.sort_by_key(|i| (i.start, i.end));

    let mut merged: Vec<TimeInterval> = Vec::with_capacity(intervals.len());
    for next in intervals {
        match merged.last_mut() {
            Some(current) if next.start <= current.end => {
                current.end = current.end.max(next.end);
            }
            _ => merged.push(next),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, h, m, 0).unwrap()
    }

    fn iv(sh: u32, sm: u32, eh: u32, em: u32) -> TimeInterval {
        TimeInterval::new(at(sh, sm), at(eh, em)).unwrap()
    }

    #[test]
    fn rejects_empty_and_inverted_ranges() {
        assert!(TimeInterval::new(at(9, 0), at(9, 0)).is_err());
        assert!(matches!(
            TimeInterval::new(at(10, 0), at(9, 0)),
            Err(ValidationError::InvalidTimeRange { .. })
        ));
    }

    #[test]
    fn deserialize_enforces_ordering() {
        let ok: TimeInterval = serde_json::from_str(
            r#"{"start":"2026-03-02T09:00:00Z","end":"2026-03-02T09:30:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ok.duration_minutes(), 30);

        let bad = serde_json::from_str::<TimeInterval>(
            r#"{"start":"2026-03-02T09:30:00Z","end":"2026-03-02T09:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn merge_empty_is_empty() {
        assert!(merge_intervals(Vec::new()).is_empty());
    }

    #[test]
    fn merge_overlapping_and_touching() {
        let merged = merge_intervals(vec![
            iv(13, 0, 14, 0),
            iv(9, 0, 10, 0),
            iv(9, 30, 10, 30),
            iv(10, 30, 11, 0),
            iv(9, 45, 9, 50),
        ]);
        assert_eq!(merged, vec![iv(9, 0, 11, 0), iv(13, 0, 14, 0)]);
    }

    #[test]
    fn overlap_excludes_touching() {
        assert!(!iv(9, 0, 10, 0).overlaps(&iv(10, 0, 11, 0)));
        assert!(iv(9, 0, 10, 1).overlaps(&iv(10, 0, 11, 0)));
        assert!(iv(9, 0, 11, 0).contains(&iv(10, 0, 11, 0)));
    }

    fn arb_interval() -> impl Strategy<Value = TimeInterval> {
        (0i64..24 * 60, 1i64..240).prop_map(|(offset, len)| {
            let base = at(0, 0);
            TimeInterval::new(
                base + Duration::minutes(offset),
                base + Duration::minutes(offset + len),
            )
            .unwrap()
        })
    }

    proptest! {
        #[test]
        fn merged_output_is_sorted_and_disjoint(input in prop::collection::vec(arb_interval(), 0..40)) {
            let merged = merge_intervals(input.clone());
            prop_assert!(merged.len() <= input.len());
            for pair in merged.windows(2) {
                prop_assert!(pair[0].end < pair[1].start);
            }
        }

        #[test]
        fn merged_output_covers_every_input(input in prop::collection::vec(arb_interval(), 1..40)) {
            let merged = merge_intervals(input.clone());
            for original in &input {
                prop_assert!(merged.iter().any(|m| m.contains(original)));
            }
        }
    }
}
