//! Daypart-diversified ranking of candidate slots.
//!
//! Candidates from the generator come out in chronological order, which tends
//! to propose five consecutive slots on the first free morning. The
//! prioritizer instead draws one slot per daypart (morning, afternoon,
//! evening) per round in the participant-facing time zone, and only falls
//! back to slots outside quiet hours once every daypart is exhausted.

use std::collections::VecDeque;

use chrono::Timelike;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use super::interval::TimeInterval;
use crate::error::ConfigError;

/// A named local-time band `[start_hour, end_hour)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Daypart {
    pub name: String,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Daypart {
    pub fn new(name: &str, start_hour: u32, end_hour: u32) -> Self {
        Self {
            name: name.to_string(),
            start_hour,
            end_hour,
        }
    }

    fn contains_hour(&self, hour: u32) -> bool {
        self.start_hour <= hour && hour < self.end_hour
    }
}

/// Morning 06-12, afternoon 12-17, evening 17-22.
pub fn default_dayparts() -> Vec<Daypart> {
    vec![
        Daypart::new("morning", 6, 12),
        Daypart::new("afternoon", 12, 17),
        Daypart::new("evening", 17, 22),
    ]
}

/// Reorders candidate slots by daypart and caps the result size.
#[derive(Debug, Clone)]
pub struct SlotPrioritizer {
    quiet_start: u32,
    quiet_end: u32,
    dayparts: Vec<Daypart>,
}

impl Default for SlotPrioritizer {
    fn default() -> Self {
        Self {
            quiet_start: 6,
            quiet_end: 22,
            dayparts: default_dayparts(),
        }
    }
}

impl SlotPrioritizer {
    /// Create a prioritizer for quiet hours `[quiet_start, quiet_end)`.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] unless the dayparts are listed in
    /// order, are contiguous, and exactly cover the quiet-hours band.
    pub fn new(
        quiet_start: u32,
        quiet_end: u32,
        dayparts: Vec<Daypart>,
    ) -> Result<Self, ConfigError> {
        let invalid = |key: &str, message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        if quiet_start >= quiet_end || quiet_end > 24 {
            return Err(invalid(
                "suggestions.quiet_hours",
                format!("expected 0 <= start < end <= 24, got {quiet_start}..{quiet_end}"),
            ));
        }
        if dayparts.is_empty() {
            return Err(invalid(
                "suggestions.dayparts",
                "at least one daypart is required".to_string(),
            ));
        }

        let mut expected_start = quiet_start;
        for part in &dayparts {
            if part.start_hour != expected_start || part.end_hour <= part.start_hour {
                return Err(invalid(
                    "suggestions.dayparts",
                    format!(
                        "daypart '{}' ({}..{}) must start at {expected_start} and be non-empty",
                        part.name, part.start_hour, part.end_hour
                    ),
                ));
            }
            expected_start = part.end_hour;
        }
        if expected_start != quiet_end {
            return Err(invalid(
                "suggestions.dayparts",
                format!("dayparts end at {expected_start}, quiet hours end at {quiet_end}"),
            ));
        }

        Ok(Self {
            quiet_start,
            quiet_end,
            dayparts,
        })
    }

    pub fn dayparts(&self) -> &[Daypart] {
        &self.dayparts
    }

    /// Index of the daypart the slot starts in, or `None` outside quiet hours.
    pub fn classify(&self, slot: &TimeInterval, tz: Tz) -> Option<usize> {
        let hour = slot.start().with_timezone(&tz).hour();
        if hour < self.quiet_start || hour >= self.quiet_end {
            return None;
        }
        self.dayparts.iter().position(|p| p.contains_hour(hour))
    }

    /// Pick up to `k` slots, round-robin across dayparts.
    ///
    /// Every daypart bucket is drained before any out-of-quiet-hours slot is
    /// considered; those are appended last in chronological order.
    pub fn prioritize(&self, slots: &[TimeInterval], tz: Tz, k: usize) -> Vec<TimeInterval> {
        let mut buckets: Vec<VecDeque<TimeInterval>> = vec![VecDeque::new(); self.dayparts.len()];
        let mut outside = Vec::new();

        for slot in slots {
            match self.classify(slot, tz) {
                Some(idx) => buckets[idx].push_back(*slot),
                None => outside.push(*slot),
            }
        }

        let mut ranked = Vec::with_capacity(k.min(slots.len()));
        while ranked.len() < k && buckets.iter().any(|b| !b.is_empty()) {
            for bucket in buckets.iter_mut() {
                if ranked.len() >= k {
                    break;
                }
                if let Some(slot) = bucket.pop_front() {
                    ranked.push(slot);
                }
            }
        }

        outside.sort_by_key(|s| s.start());
        let remaining = k.saturating_sub(ranked.len());
        ranked.extend(outside.into_iter().take(remaining));
        ranked
    }
}
