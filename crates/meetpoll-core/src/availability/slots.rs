//! Candidate slot enumeration against a merged busy timeline.
//!
//! Walks a search window with a cursor, emitting fixed-duration slots at a
//! configurable step and jumping the cursor past every busy block.

use chrono::{DateTime, Duration, Utc};

use super::interval::TimeInterval;
use crate::error::ValidationError;

/// Default upper bound on generated candidates per request.
pub const DEFAULT_POOL_CAP: usize = 96;

/// Enumerates busy-free candidate slots inside a window.
#[derive(Debug, Clone)]
pub struct SlotGenerator {
    duration: Duration,
    increment: Duration,
    pool_cap: usize,
}

impl SlotGenerator {
    /// Create a generator for slots of `duration`, stepping by `increment`.
    ///
    /// # Errors
    /// Returns [`ValidationError::NonPositive`] if either duration is not
    /// strictly positive.
    pub fn new(duration: Duration, increment: Duration) -> Result<Self, ValidationError> {
        if duration <= Duration::zero() {
            return Err(ValidationError::NonPositive {
                field: "duration".to_string(),
                value: duration.num_minutes(),
            });
        }
        if increment <= Duration::zero() {
            return Err(ValidationError::NonPositive {
                field: "increment".to_string(),
                value: increment.num_minutes(),
            });
        }
        Ok(Self {
            duration,
            increment,
            pool_cap: DEFAULT_POOL_CAP,
        })
    }

    /// Set the hard cap on emitted candidates.
    pub fn with_pool_cap(mut self, cap: usize) -> Self {
        self.pool_cap = cap;
        self
    }

    /// Generate slots inside `window` that avoid every interval in `busy`.
    ///
    /// `busy` must already be merged (sorted, non-overlapping); see
    /// [`super::merge_intervals`].
    pub fn generate(&self, busy: &[TimeInterval], window: TimeInterval) -> Vec<TimeInterval> {
        let mut slots = Vec::new();
        let mut cursor = Some(window.start());
        let window_end = window.end();

        for block in busy {
            let Some(at) = cursor else { break };
            if slots.len() >= self.pool_cap || at >= window_end {
                break;
            }
            cursor = self.fill(&mut slots, at, block.start().min(window_end));
            cursor = cursor.map(|at| at.max(block.end()));
        }

        if let Some(at) = cursor {
            self.fill(&mut slots, at, window_end);
        }
        slots
    }

    /// Emit slots from `cursor` while they end by `limit`. Returns the next
    /// cursor, or `None` once stepping past the representable range.
    fn fill(
        &self,
        slots: &mut Vec<TimeInterval>,
        mut cursor: DateTime<Utc>,
        limit: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        while slots.len() < self.pool_cap {
            match cursor.checked_add_signed(self.duration) {
                Some(end) if end <= limit => slots.push(TimeInterval::new_unchecked(cursor, end)),
                _ => break,
            }
            cursor = cursor.checked_add_signed(self.increment)?;
        }
        Some(cursor)
    }
}
