//! Concurrent busy-time collection across participants.
//!
//! One provider lookup per participant, at most `max_concurrent` in flight,
//! each bounded by a timeout. A failed lookup never fails the collection:
//! the participant is reported as missing and contributes no busy time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, warn};

use super::interval::{merge_intervals, TimeInterval};
use crate::error::CalendarError;
use crate::identity::normalize_identity;
use crate::integrations::CalendarProvider;

/// Merged busy timeline plus the participants it does not cover.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CollectedBusy {
    /// Sorted, non-overlapping
    pub busy: Vec<TimeInterval>,
    /// In request order
    pub missing: Vec<String>,
    /// Reason per missing participant
    pub missing_details: BTreeMap<String, String>,
}

pub struct BusyIntervalCollector {
    provider: Arc<dyn CalendarProvider>,
    timeout: Duration,
    max_concurrent: usize,
}

impl BusyIntervalCollector {
    pub fn new(provider: Arc<dyn CalendarProvider>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            provider,
            timeout,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub async fn collect(&self, participants: &[String], window: TimeInterval) -> CollectedBusy {
        let mut seen = HashSet::new();
        let identities: Vec<String> = participants
            .iter()
            .map(|p| normalize_identity(p))
            .filter(|p| !p.is_empty() && seen.insert(p.clone()))
            .collect();

        let mut results: Vec<(usize, Result<Vec<TimeInterval>, CalendarError>)> =
            stream::iter(identities.iter().enumerate())
                .map(|(idx, identity)| async move { (idx, self.fetch_one(identity, window).await) })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;
        results.sort_by_key(|(idx, _)| *idx);

        let mut collected = CollectedBusy::default();
        let mut busy = Vec::new();
        for (idx, result) in results {
            let identity = &identities[idx];
            match result {
                Ok(blocks) => busy.extend(blocks),
                Err(e) => {
                    debug!(participant = %identity, reason = %e, "participant missing");
                    collected.missing.push(identity.clone());
                    collected.missing_details.insert(identity.clone(), e.to_string());
                }
            }
        }
        collected.busy = merge_intervals(busy);
        collected
    }

    async fn fetch_one(
        &self,
        identity: &str,
        window: TimeInterval,
    ) -> Result<Vec<TimeInterval>, CalendarError> {
        let blocks = tokio::time::timeout(self.timeout, self.provider.busy_intervals(identity, window))
            .await
            .map_err(|_| CalendarError::Timeout(self.timeout))??;

        Ok(blocks
            .into_iter()
            .filter_map(|b| match TimeInterval::new(b.start, b.end) {
                Ok(interval) => Some(interval),
                Err(e) => {
                    warn!(
                        participant = %identity,
                        provider = self.provider.name(),
                        error = %e,
                        "dropping malformed busy block"
                    );
                    None
                }
            })
            .collect())
    }
}
