//! Google Calendar free/busy lookups.
//!
//! Issues one `freeBusy` query per participant against their primary
//! calendar, authenticated with that participant's OAuth access token.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::traits::{BusyBlock, CalendarProvider};
use crate::availability::TimeInterval;
use crate::error::CalendarError;
use crate::identity::normalize_identity;

const GOOGLE_CALENDAR_API: &str = "https://www.googleapis.com/calendar/v3";

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Free/busy provider backed by the Google Calendar API.
pub struct GoogleFreeBusyProvider {
    client: Client,
    base_url: String,
    /// Access token per normalized identity
    tokens: HashMap<String, String>,
}

impl GoogleFreeBusyProvider {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            client: Client::new(),
            base_url: GOOGLE_CALENDAR_API.to_string(),
            tokens: tokens
                .into_iter()
                .map(|(identity, token)| (normalize_identity(&identity), token))
                .collect(),
        }
    }

    /// Point requests at another host (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CalendarProvider for GoogleFreeBusyProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn busy_intervals(
        &self,
        identity: &str,
        window: TimeInterval,
    ) -> Result<Vec<BusyBlock>, CalendarError> {
        let token = self
            .tokens
            .get(&normalize_identity(identity))
            .ok_or(CalendarError::NotConnected)?;

        let body = json!({
            "timeMin": window.start().to_rfc3339(),
            "timeMax": window.end().to_rfc3339(),
            "items": [{ "id": "primary" }],
        });

        let resp = self
            .client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CalendarError::NotConnected);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::Provider(format!("freeBusy returned {status}: {text}")));
        }

        let parsed: FreeBusyResponse = resp.json().await?;
        let primary = parsed
            .calendars
            .get("primary")
            .ok_or_else(|| CalendarError::Provider("missing primary calendar in response".to_string()))?;
        if let Some(err) = primary.errors.first() {
            return Err(CalendarError::Provider(format!("calendar error: {err}")));
        }

        Ok(primary
            .busy
            .iter()
            .map(|p| BusyBlock {
                start: p.start,
                end: p.end,
            })
            .collect())
    }
}
