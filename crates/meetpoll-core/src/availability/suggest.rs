//! The suggestion pipeline: collect, merge, generate, prioritize.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::collector::BusyIntervalCollector;
use super::interval::TimeInterval;
use super::priority::SlotPrioritizer;
use super::slots::SlotGenerator;
use crate::error::{ConfigError, ValidationError};
use crate::integrations::CalendarProvider;
use crate::storage::SuggestionSettings;

/// Ask for candidate times shared by `participants`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub participants: Vec<String>,
    pub duration_minutes: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Falls back to `suggestions.default_increment_minutes`
    #[serde(default)]
    pub slot_increment_minutes: Option<i64>,
    /// Falls back to `suggestions.default_max_suggestions`
    #[serde(default)]
    pub max_suggestions: Option<i64>,
    /// IANA zone used for daypart classification; UTC when absent
    #[serde(default)]
    pub client_timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionResponse {
    pub suggestions: Vec<TimeInterval>,
    pub participants_missing: Vec<String>,
    pub participants_missing_details: BTreeMap<String, String>,
}

/// Stateless suggestion engine over a calendar provider.
pub struct SuggestionService {
    collector: BusyIntervalCollector,
    prioritizer: SlotPrioritizer,
    pool_cap: usize,
    default_increment_minutes: i64,
    default_max_suggestions: i64,
}

impl SuggestionService {
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] for an invalid daypart layout.
    pub fn new(
        provider: Arc<dyn CalendarProvider>,
        settings: &SuggestionSettings,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            collector: BusyIntervalCollector::new(
                provider,
                settings.fetch_timeout(),
                settings.max_concurrent_fetches,
            ),
            prioritizer: settings.prioritizer()?,
            pool_cap: settings.pool_cap,
            default_increment_minutes: settings.default_increment_minutes,
            default_max_suggestions: settings.default_max_suggestions,
        })
    }

    #[instrument(skip(self, request), fields(participants = request.participants.len()))]
    pub async fn suggest(
        &self,
        request: SuggestionRequest,
    ) -> Result<SuggestionResponse, ValidationError> {
        let increment = request
            .slot_increment_minutes
            .unwrap_or(self.default_increment_minutes);
        let max = request.max_suggestions.unwrap_or(self.default_max_suggestions);
        positive("max_suggestions", max)?;
        let duration = minutes("duration_minutes", request.duration_minutes)?;
        let generator = SlotGenerator::new(duration, minutes("slot_increment_minutes", increment)?)?
            .with_pool_cap(self.pool_cap);
        let window = TimeInterval::new(request.window_start, request.window_end)?;
        if duration > window.duration() {
            return Err(ValidationError::InvalidValue {
                field: "duration_minutes".to_string(),
                message: format!(
                    "{} minutes does not fit in a {} minute window",
                    request.duration_minutes,
                    window.duration_minutes()
                ),
            });
        }
        let tz = parse_timezone(request.client_timezone.as_deref())?;

        let collected = self.collector.collect(&request.participants, window).await;
        let pool = generator.generate(&collected.busy, window);
        let suggestions = self
            .prioritizer
            .prioritize(&pool, tz, usize::try_from(max).unwrap_or(usize::MAX));

        info!(
            pool = pool.len(),
            suggestions = suggestions.len(),
            missing = collected.missing.len(),
            "suggestions computed"
        );
        Ok(SuggestionResponse {
            suggestions,
            participants_missing: collected.missing,
            participants_missing_details: collected.missing_details,
        })
    }
}

fn positive(field: &str, value: i64) -> Result<i64, ValidationError> {
    if value <= 0 {
        return Err(ValidationError::NonPositive {
            field: field.to_string(),
            value,
        });
    }
    Ok(value)
}

fn minutes(field: &str, value: i64) -> Result<Duration, ValidationError> {
    let value = positive(field, value)?;
    Duration::try_minutes(value).ok_or_else(|| ValidationError::InvalidValue {
        field: field.to_string(),
        message: format!("{value} minutes is out of range"),
    })
}

fn parse_timezone(name: Option<&str>) -> Result<Tz, ValidationError> {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        None => Ok(Tz::UTC),
        Some(name) => name
            .parse::<Tz>()
            .map_err(|_| ValidationError::InvalidTimezone(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrations::FileCalendarProvider;
    use chrono::TimeZone;

    fn request() -> SuggestionRequest {
        SuggestionRequest {
            participants: vec!["alice@example.com".to_string()],
            duration_minutes: 30,
            window_start: Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
            window_end: Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap(),
            slot_increment_minutes: Some(30),
            max_suggestions: Some(5),
            client_timezone: None,
        }
    }

    fn service() -> SuggestionService {
        let provider = FileCalendarProvider::from_json(
            r#"{"alice@example.com": [{"start": "2026-03-02T10:00:00Z", "end": "2026-03-02T10:30:00Z"}]}"#,
        )
        .unwrap();
        SuggestionService::new(Arc::new(provider), &SuggestionSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let svc = service();

        let mut bad = request();
        bad.duration_minutes = 0;
        assert!(matches!(
            svc.suggest(bad).await,
            Err(ValidationError::NonPositive { .. })
        ));

        let mut bad = request();
        bad.window_end = bad.window_start;
        assert!(matches!(
            svc.suggest(bad).await,
            Err(ValidationError::InvalidTimeRange { .. })
        ));

        let mut bad = request();
        bad.max_suggestions = Some(-1);
        assert!(svc.suggest(bad).await.is_err());

        let mut bad = request();
        bad.client_timezone = Some("Mars/Olympus".to_string());
        assert_eq!(
            svc.suggest(bad).await.unwrap_err(),
            ValidationError::InvalidTimezone("Mars/Olympus".to_string())
        );
    }

    #[tokio::test]
    async fn oversized_duration_and_increment_are_handled() {
        let svc = service();

        let mut bad = request();
        bad.duration_minutes = 1_000_000_000_000;
        assert!(matches!(
            svc.suggest(bad).await,
            Err(ValidationError::InvalidValue { .. })
        ));

        let mut bad = request();
        bad.duration_minutes = 121;
        assert!(matches!(
            svc.suggest(bad).await,
            Err(ValidationError::InvalidValue { .. })
        ));

        let mut wide = request();
        wide.slot_increment_minutes = Some(1_000_000_000_000);
        let response = svc.suggest(wide).await.unwrap();
        assert_eq!(response.suggestions.len(), 1);
        assert_eq!(response.suggestions[0].start(), request().window_start);
    }

    #[tokio::test]
    async fn suggests_around_busy_block() {
        let response = service().suggest(request()).await.unwrap();
        let starts: Vec<String> = response
            .suggestions
            .iter()
            .map(|s| s.start().format("%H:%M").to_string())
            .collect();
        assert_eq!(starts, vec!["09:00", "09:30", "10:30"]);
        assert!(response.participants_missing.is_empty());
    }
}
