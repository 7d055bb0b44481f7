//! Suggestion pipeline against an in-process calendar provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Timelike, Utc};
use meetpoll_core::integrations::{BusyBlock, CalendarProvider};
use meetpoll_core::storage::SuggestionSettings;
use meetpoll_core::{CalendarError, SuggestionRequest, SuggestionService, TimeInterval};

fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, h, m, 0).unwrap()
}

/// Serves fixed calendars and tracks peak concurrency.
#[derive(Default)]
struct FakeCalendars {
    busy: HashMap<String, Vec<BusyBlock>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CalendarProvider for FakeCalendars {
    fn name(&self) -> &str {
        "fake"
    }

    async fn busy_intervals(
        &self,
        identity: &str,
        _window: TimeInterval,
    ) -> Result<Vec<BusyBlock>, CalendarError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.busy
            .get(identity)
            .cloned()
            .ok_or(CalendarError::NotConnected)
    }
}

fn request(participants: &[&str]) -> SuggestionRequest {
    SuggestionRequest {
        participants: participants.iter().map(|p| p.to_string()).collect(),
        duration_minutes: 30,
        window_start: at(2, 9, 0),
        window_end: at(2, 11, 0),
        slot_increment_minutes: Some(30),
        max_suggestions: Some(5),
        client_timezone: None,
    }
}

#[tokio::test]
async fn busy_time_of_all_participants_is_avoided() {
    let mut calendars = FakeCalendars::default();
    calendars.busy.insert(
        "alice@example.com".to_string(),
        vec![BusyBlock { start: at(2, 9, 0), end: at(2, 9, 20) }],
    );
    calendars.busy.insert(
        "bob@example.com".to_string(),
        vec![BusyBlock { start: at(2, 10, 0), end: at(2, 10, 30) }],
    );
    let service =
        SuggestionService::new(Arc::new(calendars), &SuggestionSettings::default()).unwrap();

    let response = service
        .suggest(request(&["alice@example.com", "bob@example.com"]))
        .await
        .unwrap();

    // 09:00 is blocked by alice; the cursor resumes at 09:20
    let starts: Vec<(u32, u32)> = response
        .suggestions
        .iter()
        .map(|s| (s.start().hour(), s.start().minute()))
        .collect();
    assert_eq!(starts, vec![(9, 20), (10, 30)]);
    for s in &response.suggestions {
        assert_eq!(s.duration_minutes(), 30);
    }
}

#[tokio::test]
async fn missing_participants_are_reported_not_fatal() {
    let mut calendars = FakeCalendars::default();
    calendars.busy.insert("alice@example.com".to_string(), Vec::new());
    let service =
        SuggestionService::new(Arc::new(calendars), &SuggestionSettings::default()).unwrap();

    let response = service
        .suggest(request(&["alice@example.com", "ghost@example.com"]))
        .await
        .unwrap();
    assert_eq!(response.suggestions.len(), 4);
    assert_eq!(response.participants_missing, vec!["ghost@example.com"]);
    assert!(response.participants_missing_details.contains_key("ghost@example.com"));
}

#[tokio::test]
async fn fetch_parallelism_is_bounded() {
    let mut calendars = FakeCalendars::default();
    let participants: Vec<String> = (0..20).map(|i| format!("p{i}@example.com")).collect();
    for p in &participants {
        calendars.busy.insert(p.clone(), Vec::new());
    }
    let calendars = Arc::new(calendars);
    let settings = SuggestionSettings {
        max_concurrent_fetches: 3,
        ..SuggestionSettings::default()
    };
    let service = SuggestionService::new(calendars.clone(), &settings).unwrap();

    let refs: Vec<&str> = participants.iter().map(String::as_str).collect();
    service.suggest(request(&refs)).await.unwrap();
    assert!(calendars.peak.load(Ordering::SeqCst) <= 3);
    assert!(calendars.peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn dayparts_follow_client_timezone() {
    let calendars = FakeCalendars {
        busy: HashMap::from([("alice@example.com".to_string(), Vec::new())]),
        ..FakeCalendars::default()
    };
    let service =
        SuggestionService::new(Arc::new(calendars), &SuggestionSettings::default()).unwrap();

    // 13:00-23:00 UTC is 09:00-19:00 in New York (EDT from 2026-03-08)
    let mut req = request(&["alice@example.com"]);
    req.window_start = at(10, 13, 0);
    req.window_end = at(10, 23, 0);
    req.slot_increment_minutes = Some(60);
    req.max_suggestions = Some(3);
    req.client_timezone = Some("America/New_York".to_string());

    let response = service.suggest(req).await.unwrap();
    let hours: Vec<u32> = response.suggestions.iter().map(|s| s.start().hour()).collect();
    // local 09:00 morning, 12:00 afternoon, 17:00 evening
    assert_eq!(hours, vec![13, 16, 21]);
}
