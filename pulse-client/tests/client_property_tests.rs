use proptest::prelude::*;
use pulse_cache::{CachePolicy, CacheStatus, QueryCache};
use pulse_client::fixtures::{page_events, render_export, FixtureGateway};
use pulse_client::{
    Dashboard, EventFilterController, ExportCoordinator, FileStore, MemoryStore, Payload,
    PulseConfig, SettingsReconciler, SettingsStore, SharedGateway,
};
use pulse_core::{
    ExportFormat, ExportRequest, FilterState, FilterUpdate, SettingUpdate, SettingsSnapshot,
};
use pulse_test_utils::assertions::assert_filter_bounds;
use pulse_test_utils::generators::{
    arb_event, arb_filter_state, arb_filter_update, arb_setting_update,
};
use std::sync::Arc;
use std::time::Duration;

const STALE: Duration = Duration::from_secs(30);

fn paused_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .unwrap()
}

fn fixture_gateway() -> SharedGateway {
    Arc::new(FixtureGateway::new())
}

#[test]
fn example_config_parses() {
    let config = PulseConfig::parse(include_str!("../pulse.example.toml")).unwrap();
    assert_eq!(config.request_timeout(), Duration::from_secs(10));
    assert_eq!(config.cache_policy().max_retries, 2);
}

#[tokio::test(start_paused = true)]
async fn filter_edit_keeps_other_criteria_and_resets_page() {
    let cache = QueryCache::new(CachePolicy::default());
    let mut events = EventFilterController::new(&cache, fixture_gateway(), 20, STALE);
    events.set_filter(FilterUpdate::EventType(Some("page_view".to_string())));
    events.set_page(2);
    events.set_filter(FilterUpdate::UserId(Some("u1".to_string())));

    let params = events.current_request_params();
    assert_eq!(params.page, 1);
    assert_eq!(params.limit, 20);
    assert_eq!(params.event_type.as_deref(), Some("page_view"));
    assert_eq!(params.user_id.as_deref(), Some("u1"));

    let entry = events.settled().await.unwrap();
    assert_eq!(entry.status(), CacheStatus::Fresh);
    assert_eq!(events.events_page().unwrap().total, 0);
    assert_eq!(events.total_pages(), Some(1));
}

#[tokio::test(start_paused = true)]
async fn abandoned_filter_response_is_not_observed() {
    let cache = QueryCache::new(CachePolicy::default());
    let slow: SharedGateway =
        Arc::new(FixtureGateway::new().with_latency(Duration::from_secs(2)));
    let mut events = EventFilterController::new(&cache, slow, 20, STALE);
    let abandoned = pulse_client::ResourceRequest::Events(events.current_request_params()).cache_key();

    events.set_filter(FilterUpdate::EventType(Some("search".to_string())));
    let current = pulse_client::ResourceRequest::Events(events.current_request_params()).cache_key();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while let Ok(Some(entry)) = tokio::time::timeout_at(deadline, events.next_update()).await {
        assert_eq!(entry.key(), &current);
    }
    assert!(cache.peek(&abandoned).unwrap().has_data());
    let page = events.events_page().unwrap();
    assert!(page.events.iter().all(|e| e.event_type == "search"));
}

#[tokio::test]
async fn settings_save_persists_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    let settings = SettingsReconciler::load(Arc::new(FileStore::new(&path))).await;

    settings.set_draft(SettingUpdate::EventsPerPage(50));
    assert!(settings.is_dirty());
    settings.save().await.unwrap();
    assert!(!settings.is_dirty());

    let store = FileStore::new(&path);
    assert_eq!(
        store
            .read(SettingsSnapshot::KEY_EVENTS_PER_PAGE)
            .await
            .unwrap()
            .as_deref(),
        Some("50")
    );
}

#[tokio::test]
async fn rejected_save_leaves_committed_unchanged() {
    let store = Arc::new(MemoryStore::new());
    store.set_reject_writes(true);
    let settings = SettingsReconciler::load(store).await;
    settings.set_draft(SettingUpdate::ExportFormat(ExportFormat::Json));

    assert!(settings.save().await.is_err());
    assert_eq!(settings.committed(), SettingsSnapshot::default());
    assert!(settings.is_dirty());
}

#[tokio::test]
async fn export_request_is_fixed_at_dispatch() {
    let exporter = ExportCoordinator::new(fixture_gateway());
    let mut filters = FilterState::default().with(FilterUpdate::EventType(Some("download".to_string())));
    let pending = exporter.export(&filters, ExportFormat::Json, true);
    filters.apply(FilterUpdate::EventType(Some("search".to_string())));

    let payload = pending.await.unwrap();
    assert_eq!(payload.request.filters.event_type.as_deref(), Some("download"));
    let rows: Vec<pulse_core::Event> = serde_json::from_slice(&payload.bytes).unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|e| e.event_type == "download"));
}

#[tokio::test(start_paused = true)]
async fn dashboard_loads_every_statistic_once() {
    let dash = Dashboard::with_gateway(
        fixture_gateway(),
        Arc::new(MemoryStore::new()),
        CachePolicy::default(),
    )
    .await;

    let mut observers: Vec<_> = pulse_core::StatisticKind::ALL
        .iter()
        .map(|kind| dash.subscribe_statistic(*kind))
        .collect();
    for observer in observers.iter_mut() {
        let entry = observer.settled().await.unwrap();
        assert_eq!(entry.status(), CacheStatus::Fresh);
    }
    assert_eq!(dash.cache().stats().fetches, 10);

    let top = dash.top_users();
    let users = top.data().and_then(Payload::as_top_users).unwrap();
    assert_eq!(users[0].display_name(), "John Doe");
    assert_eq!(dash.cache().stats().fetches, 10);
}

proptest! {
    #[test]
    fn controller_tracks_filter_model(updates in prop::collection::vec(arb_filter_update(), 1..20)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let cache = QueryCache::new(CachePolicy::default());
            let mut events = EventFilterController::new(&cache, fixture_gateway(), 20, STALE);
            let mut model = FilterState::new(20);
            for update in updates {
                let pagination = update.is_pagination();
                events.set_filter(update.clone());
                model.apply(update);

                assert_filter_bounds(events.filter_state());
                assert_eq!(events.filter_state(), &model);
                if !pagination {
                    assert_eq!(events.filter_state().page(), 1);
                }
            }
        });
    }

    #[test]
    fn settings_round_trip_through_store(edits in prop::collection::vec(arb_setting_update(), 0..10)) {
        let rt = paused_runtime();
        rt.block_on(async {
            let store = Arc::new(MemoryStore::new());
            let settings = SettingsReconciler::load(store.clone()).await;
            for edit in edits {
                settings.set_draft(edit);
            }
            let saved = settings.save().await.unwrap();
            assert!(!settings.is_dirty());

            let reloaded = SettingsReconciler::load(store).await;
            assert_eq!(reloaded.committed(), saved);
        });
    }

    #[test]
    fn fixture_pages_never_exceed_limit(state in arb_filter_state()) {
        let events = pulse_client::fixtures::sample_events();
        let page = page_events(&events, &state.to_query()).unwrap();
        prop_assert!(page.events.len() <= state.limit() as usize);
        prop_assert!(page.total <= events.len() as u64);
        prop_assert_eq!(page.page, state.page());
    }

    #[test]
    fn csv_rows_keep_five_columns(events in prop::collection::vec(arb_event(), 0..20)) {
        let request = ExportRequest::new(&FilterState::default(), ExportFormat::Csv, true);
        let csv = String::from_utf8(render_export(&events, &request).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        prop_assert_eq!(lines.len(), events.len() + 1);
        for line in lines {
            prop_assert_eq!(line.split(',').count(), 5);
        }
    }
}
