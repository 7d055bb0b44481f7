//! Busy calendars read from a local JSON file.
//!
//! The file maps identities to busy blocks:
//!
//! ```json
//! { "alice@example.com": [{ "start": "2026-03-02T10:00:00Z", "end": "2026-03-02T10:30:00Z" }] }
//! ```
//!
//! Identities absent from the file are reported as not connected.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

use super::traits::{BusyBlock, CalendarProvider};
use crate::availability::TimeInterval;
use crate::error::{CalendarError, CoreError};
use crate::identity::normalize_identity;

#[derive(Debug, Clone, Default)]
pub struct FileCalendarProvider {
    calendars: HashMap<String, Vec<BusyBlock>>,
}

impl FileCalendarProvider {
    pub fn from_map(calendars: HashMap<String, Vec<BusyBlock>>) -> Self {
        Self {
            calendars: calendars
                .into_iter()
                .map(|(identity, blocks)| (normalize_identity(&identity), blocks))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, CoreError> {
        Ok(Self::from_map(serde_json::from_str(json)?))
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[async_trait]
impl CalendarProvider for FileCalendarProvider {
    fn name(&self) -> &str {
        "file"
    }

    async fn busy_intervals(
        &self,
        identity: &str,
        window: TimeInterval,
    ) -> Result<Vec<BusyBlock>, CalendarError> {
        let blocks = self
            .calendars
            .get(&normalize_identity(identity))
            .ok_or(CalendarError::NotConnected)?;
        Ok(blocks
            .iter()
            .filter(|b| b.start < window.end() && b.end > window.start())
            .cloned()
            .collect())
    }
}
