//! Pulse Test Utilities
//!
//! Shared test infrastructure for the Pulse workspace:
//! - Proptest generators for filter, settings and event types
//! - Mock fetchers for driving the query cache
//! - Fixtures for common scenarios
//! - Assertions over cache entries

pub use pulse_cache::{
    CacheEntry, CacheKey, CachePolicy, CacheStatus, QueryCache, QueryFetcher, SharedFetcher,
};
pub use pulse_core::{
    Event, EventsPage, ExportFormat, FetchError, FetchErrorKind, FilterState, FilterUpdate,
    SettingUpdate, SettingsSnapshot, Timestamp,
};

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

// ============================================================================
// MOCK FETCHERS
// ============================================================================

/// Returns the same value on every call and counts invocations.
#[derive(Debug)]
pub struct CountingFetcher<V> {
    value: V,
    delay: Duration,
    calls: AtomicUsize,
}

impl<V: Clone> CountingFetcher<V> {
    pub fn new(value: V) -> Arc<Self> {
        Self::with_delay(value, Duration::ZERO)
    }

    /// Every call sleeps for `delay` (on the tokio clock) before answering.
    pub fn with_delay(value: V, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            value,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<V> QueryFetcher<V> for CountingFetcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn fetch(&self) -> Result<V, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.value.clone())
    }
}

/// Replays a fixed sequence of outcomes. Once only one outcome is left it is
/// repeated for every further call.
#[derive(Debug)]
pub struct ScriptedFetcher<V> {
    outcomes: Mutex<VecDeque<Result<V, FetchError>>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl<V: Clone> ScriptedFetcher<V> {
    pub fn new(outcomes: Vec<Result<V, FetchError>>) -> Arc<Self> {
        Self::with_delay(outcomes, Duration::ZERO)
    }

    pub fn with_delay(outcomes: Vec<Result<V, FetchError>>, delay: Duration) -> Arc<Self> {
        assert!(!outcomes.is_empty(), "scripted fetcher needs at least one outcome");
        Arc::new(Self {
            outcomes: Mutex::new(outcomes.into()),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Result<V, FetchError> {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        if outcomes.len() > 1 {
            if let Some(next) = outcomes.pop_front() {
                return next;
            }
        }
        outcomes
            .front()
            .cloned()
            .unwrap_or(Err(FetchError::Runtime))
    }
}

#[async_trait]
impl<V> QueryFetcher<V> for ScriptedFetcher<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn fetch(&self) -> Result<V, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.next_outcome()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Pulse value types.

    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    /// A calendar date between 2020 and 2030.
    pub fn arb_date() -> impl Strategy<Value = NaiveDate> {
        (2020i32..2030, 1u32..=12, 1u32..=28).prop_map(|(y, m, d)| {
            NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN)
        })
    }

    /// Short filter text, including blank input.
    pub fn arb_filter_text() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some(String::new())),
            Just(Some("   ".to_string())),
            "[a-z_]{1,12}".prop_map(Some),
        ]
    }

    pub fn arb_filter_update() -> impl Strategy<Value = FilterUpdate> {
        prop_oneof![
            proptest::option::of(arb_date()).prop_map(FilterUpdate::StartDate),
            proptest::option::of(arb_date()).prop_map(FilterUpdate::EndDate),
            arb_filter_text().prop_map(FilterUpdate::EventType),
            arb_filter_text().prop_map(FilterUpdate::UserId),
            arb_filter_text().prop_map(FilterUpdate::MetadataQuery),
            (0u32..200).prop_map(FilterUpdate::Limit),
            (0u32..50).prop_map(FilterUpdate::Page),
        ]
    }

    /// Filter edits excluding page moves.
    pub fn arb_criteria_update() -> impl Strategy<Value = FilterUpdate> {
        arb_filter_update().prop_filter("criteria edits only", |u| !u.is_pagination())
    }

    /// A filter state reached through a random edit history.
    pub fn arb_filter_state() -> impl Strategy<Value = FilterState> {
        (1u32..100, prop::collection::vec(arb_filter_update(), 0..8)).prop_map(
            |(limit, updates)| {
                updates
                    .into_iter()
                    .fold(FilterState::new(limit), FilterState::with)
            },
        )
    }

    pub fn arb_export_format() -> impl Strategy<Value = ExportFormat> {
        prop_oneof![
            Just(ExportFormat::Csv),
            Just(ExportFormat::Json),
            Just(ExportFormat::Xlsx),
        ]
    }

    pub fn arb_settings_snapshot() -> impl Strategy<Value = SettingsSnapshot> {
        (1u32..500, any::<bool>(), arb_export_format(), any::<bool>()).prop_map(
            |(events_per_page, chart_animations_enabled, export_format, include_metadata)| {
                SettingsSnapshot {
                    events_per_page,
                    chart_animations_enabled,
                    export_format,
                    include_metadata,
                }
            },
        )
    }

    pub fn arb_setting_update() -> impl Strategy<Value = SettingUpdate> {
        prop_oneof![
            (1u32..500).prop_map(SettingUpdate::EventsPerPage),
            any::<bool>().prop_map(SettingUpdate::ChartAnimationsEnabled),
            arb_export_format().prop_map(SettingUpdate::ExportFormat),
            any::<bool>().prop_map(SettingUpdate::IncludeMetadata),
        ]
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    pub fn arb_event() -> impl Strategy<Value = Event> {
        (
            "[0-9]{1,6}",
            "user[0-9]{1,3}",
            prop_oneof![
                Just("page_view"),
                Just("button_click"),
                Just("form_submit"),
                Just("search"),
            ],
            arb_timestamp(),
            proptest::option::of("[a-z]{1,8}=[a-z0-9/,]{1,10}"),
        )
            .prop_map(|(id, user_id, event_type, event_timestamp, metadata)| Event {
                id,
                user_id,
                event_type: event_type.to_string(),
                event_timestamp,
                metadata: metadata.map(serde_json::Value::String),
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use chrono::TimeZone;

    /// Policy with short delays so paused-clock tests stay readable.
    pub fn fast_policy() -> CachePolicy {
        CachePolicy::default()
            .with_retry_delay(Duration::from_millis(100))
            .with_request_timeout(Duration::from_secs(2))
    }

    pub fn event(id: &str, user_id: &str, event_type: &str, day: u32, metadata: &str) -> Event {
        Event {
            id: id.to_string(),
            user_id: user_id.to_string(),
            event_type: event_type.to_string(),
            event_timestamp: chrono::Utc
                .with_ymd_and_hms(2024, 1, day, 10, 0, 0)
                .single()
                .unwrap_or_default(),
            metadata: Some(serde_json::Value::String(metadata.to_string())),
        }
    }

    /// Five events spread over the first days of January 2024.
    pub fn sample_events() -> Vec<Event> {
        vec![
            event("1", "user1", "page_view", 1, "page=/home"),
            event("2", "user2", "button_click", 1, "button=signup"),
            event("3", "user1", "form_submit", 2, "form=contact"),
            event("4", "user3", "page_view", 3, "page=/pricing"),
            event("5", "user2", "search", 4, "query=analytics, dashboards"),
        ]
    }

    pub fn events_page(events: Vec<Event>, total: u64, page: u32, limit: u32) -> EventsPage {
        EventsPage {
            events,
            total,
            page,
            limit,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over cache entries and filter state.

    use super::*;

    #[track_caller]
    pub fn assert_status<V>(entry: &CacheEntry<V>, expected: CacheStatus) {
        assert_eq!(
            entry.status(),
            expected,
            "Entry {} status mismatch: expected {:?}, got {:?}",
            entry.key(),
            expected,
            entry.status()
        );
    }

    #[track_caller]
    pub fn assert_fresh_with<V: PartialEq + std::fmt::Debug>(entry: &CacheEntry<V>, value: &V) {
        assert_status(entry, CacheStatus::Fresh);
        assert_eq!(entry.data(), Some(value), "Entry {} data mismatch", entry.key());
    }

    #[track_caller]
    pub fn assert_error_kind<V>(entry: &CacheEntry<V>, kind: FetchErrorKind) {
        assert_status(entry, CacheStatus::Error);
        match entry.last_error() {
            Some(err) => assert_eq!(err.kind(), kind, "Unexpected error: {err}"),
            None => panic!("Entry {} is in Error without a last_error", entry.key()),
        }
    }

    #[track_caller]
    pub fn assert_filter_bounds(state: &FilterState) {
        assert!(state.page() >= 1, "page below 1: {}", state.page());
        assert!(state.limit() >= 1, "limit below 1: {}", state.limit());
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_counting_fetcher_counts() {
        let fetcher = CountingFetcher::new(3u32);
        assert_eq!(fetcher.fetch().await, Ok(3));
        assert_eq!(fetcher.fetch().await, Ok(3));
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_fetcher_repeats_last() {
        let fetcher = ScriptedFetcher::new(vec![Err(FetchError::network("x")), Ok(1u32)]);
        assert!(fetcher.fetch().await.is_err());
        assert_eq!(fetcher.fetch().await, Ok(1));
        assert_eq!(fetcher.fetch().await, Ok(1));
        assert_eq!(fetcher.calls(), 3);
    }

    #[test]
    fn test_sample_events_fixture() {
        let events = fixtures::sample_events();
        assert_eq!(events.len(), 5);
        assert!(events.iter().all(|e| e.metadata_text().is_some()));
    }

    proptest! {
        #[test]
        fn generated_filter_states_are_in_bounds(state in generators::arb_filter_state()) {
            assertions::assert_filter_bounds(&state);
        }

        #[test]
        fn generated_settings_are_valid(snapshot in generators::arb_settings_snapshot()) {
            prop_assert!(snapshot.events_per_page >= 1);
        }
    }
}
