//! Built-in sample data and the gateway strategy that serves it.
//!
//! The fixture strategy answers every request locally with the same
//! filtering, pagination and export rules the HTTP service applies, so the
//! dashboard behaves identically with and without a backend.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, TimeZone, Utc};
use pulse_core::{
    AverageStat, CountStat, DailyEventsPerUser, Event, EventQuery, EventTypeCount, EventsPage,
    EventsPerUserDistribution, ExportFormat, ExportRequest, FetchError, MonthCount, RateStat,
    RetentionPeriod, StatisticKind, TopUser,
};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::gateway::{Gateway, ResourceRequest};
use crate::payload::Payload;

const EVENT_TYPES: [&str; 5] = ["page_view", "button_click", "form_submit", "download", "search"];

const USERS: [(&str, &str); 5] = [
    ("user_123", "John Doe"),
    ("user_456", "Jane Smith"),
    ("user_789", "Bob Johnson"),
    ("user_101", "Alice Brown"),
    ("user_202", "Charlie Wilson"),
];

/// In-memory gateway strategy.
#[derive(Debug, Clone)]
pub struct FixtureGateway {
    events: Vec<Event>,
    latency: Duration,
}

impl FixtureGateway {
    pub fn new() -> Self {
        Self::with_events(sample_events())
    }

    pub fn with_events(events: Vec<Event>) -> Self {
        Self {
            events,
            latency: Duration::ZERO,
        }
    }

    /// Delay every answer by `latency`, to exercise loading states.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    fn statistic(&self, kind: StatisticKind) -> Payload {
        match kind {
            StatisticKind::TotalEvents => Payload::Count(CountStat {
                count: 1247,
                trend: Some(12.5),
            }),
            StatisticKind::TotalUsers => Payload::Count(CountStat {
                count: 89,
                trend: Some(8.3),
            }),
            StatisticKind::AverageEventsPerUser => Payload::Average(AverageStat {
                average: 14.02,
                trend: Some(3.7),
            }),
            StatisticKind::UserRetentionRate => Payload::Rate(RateStat {
                rate: 78.5,
                trend: Some(-2.1),
            }),
            StatisticKind::EventsByType => Payload::EventsByType(
                [456, 234, 123, 87, 65]
                    .into_iter()
                    .zip(EVENT_TYPES)
                    .map(|(count, event_type)| EventTypeCount {
                        event_type: event_type.to_string(),
                        count,
                    })
                    .collect(),
            ),
            StatisticKind::EventsByMonth => Payload::EventsByMonth(
                [145, 167, 189, 223, 201, 234]
                    .into_iter()
                    .enumerate()
                    .map(|(i, count)| MonthCount {
                        month: format!("2024-{:02}", i + 1),
                        count,
                    })
                    .collect(),
            ),
            StatisticKind::TopUsers => Payload::TopUsers(
                [45, 38, 32, 28, 24]
                    .into_iter()
                    .zip(USERS)
                    .map(|(event_count, (user_id, name))| TopUser {
                        user_id: user_id.to_string(),
                        user_name: Some(name.to_string()),
                        event_count,
                    })
                    .collect(),
            ),
            StatisticKind::UserRetention => Payload::UserRetention(
                [("Day 1", 78.5), ("Day 7", 45.2), ("Day 30", 23.8)]
                    .into_iter()
                    .map(|(period, retention_rate)| RetentionPeriod {
                        period: period.to_string(),
                        retention_rate,
                    })
                    .collect(),
            ),
            StatisticKind::EventsPerUserDistribution => {
                Payload::Distribution(events_per_user_distribution(&self.events))
            }
            StatisticKind::DailyEventsPerUser => {
                Payload::DailyEventsPerUser(daily_events_per_user(&self.events))
            }
        }
    }
}

impl Default for FixtureGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Gateway for FixtureGateway {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn fetch(&self, request: &ResourceRequest) -> Result<Payload, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match request {
            ResourceRequest::Statistic(kind) => Ok(self.statistic(*kind)),
            ResourceRequest::Events(query) => page_events(&self.events, query).map(Payload::Events),
        }
    }

    async fn export(&self, request: &ExportRequest) -> Result<Vec<u8>, FetchError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        render_export(&self.events, request)
    }
}

/// Deterministic sample log: 48 events over the first week of January 2024.
pub fn sample_events() -> Vec<Event> {
    let origin = Utc
        .with_ymd_and_hms(2024, 1, 1, 8, 0, 0)
        .single()
        .unwrap_or_default();
    let pages = ["/dashboard", "/events", "/settings", "/pricing"];
    (0..48usize)
        .map(|i| {
            let event_type = EVENT_TYPES[i % EVENT_TYPES.len()];
            let (user_id, _) = USERS[(i * 7 + i / 5) % USERS.len()];
            let metadata = match event_type {
                "page_view" => format!("page={}", pages[i % pages.len()]),
                "button_click" => "button=export, section=events".to_string(),
                "form_submit" => "form=contact".to_string(),
                "download" => "file=report.csv".to_string(),
                _ => format!("query=term{}", i % 3),
            };
            Event {
                id: (i + 1).to_string(),
                user_id: user_id.to_string(),
                event_type: event_type.to_string(),
                event_timestamp: origin + ChronoDuration::hours(3 * i as i64),
                metadata: Some(serde_json::Value::String(metadata)),
            }
        })
        .collect()
}

/// Apply the service's filter rules: inclusive date range, exact event type
/// and user id, substring match on metadata text.
pub fn filter_events<'a>(
    events: &'a [Event],
    start: Option<&str>,
    end: Option<&str>,
    event_type: Option<&str>,
    user_id: Option<&str>,
    metadata: Option<&str>,
) -> Result<Vec<&'a Event>, FetchError> {
    let start = start.map(parse_instant).transpose()?;
    let end = end.map(parse_instant).transpose()?;
    Ok(events
        .iter()
        .filter(|e| start.map_or(true, |s| e.event_timestamp >= s))
        .filter(|e| end.map_or(true, |t| e.event_timestamp <= t))
        .filter(|e| event_type.map_or(true, |t| e.event_type == t))
        .filter(|e| user_id.map_or(true, |u| e.user_id == u))
        .filter(|e| {
            metadata.map_or(true, |needle| {
                e.metadata_text().is_some_and(|text| text.contains(needle))
            })
        })
        .collect())
}

/// Filter then slice `[(page-1)*limit, page*limit)`, clamped to the result set.
pub fn page_events(events: &[Event], query: &EventQuery) -> Result<EventsPage, FetchError> {
    let matched = filter_events(
        events,
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.event_type.as_deref(),
        query.user_id.as_deref(),
        query.metadata.as_deref(),
    )?;
    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let total = matched.len();
    let start = usize::try_from(u64::from(page - 1) * u64::from(limit))
        .unwrap_or(usize::MAX)
        .min(total);
    let end = start.saturating_add(limit as usize).min(total);
    Ok(EventsPage {
        events: matched[start..end].iter().map(|e| (*e).clone()).collect(),
        total: total as u64,
        page,
        limit,
    })
}

/// Render the export body the service would return for `request`.
pub fn render_export(events: &[Event], request: &ExportRequest) -> Result<Vec<u8>, FetchError> {
    let f = &request.filters;
    let matched = filter_events(
        events,
        f.start_date.as_deref(),
        f.end_date.as_deref(),
        f.event_type.as_deref(),
        f.user_id.as_deref(),
        f.metadata.as_deref(),
    )?;
    match request.format {
        ExportFormat::Csv => Ok(render_csv(&matched, request.include_metadata).into_bytes()),
        ExportFormat::Json => {
            let rows: Vec<Event> = matched
                .into_iter()
                .map(|e| {
                    let mut e = e.clone();
                    if !request.include_metadata {
                        e.metadata = None;
                    }
                    e
                })
                .collect();
            serde_json::to_vec_pretty(&rows)
                .map_err(|err| FetchError::schema("events/export", err.to_string()))
        }
        ExportFormat::Xlsx => Err(FetchError::Unsupported {
            reason: "xlsx export is not available from sample data".to_string(),
        }),
    }
}

fn render_csv(events: &[&Event], include_metadata: bool) -> String {
    let mut csv = String::from("ID,User ID,Event Type,Event Timestamp");
    if include_metadata {
        csv.push_str(",Metadata");
    }
    csv.push('\n');
    for event in events {
        csv.push_str(&format!(
            "{},{},{},{}",
            event.id,
            event.user_id,
            event.event_type,
            event
                .event_timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
        ));
        if include_metadata {
            csv.push(',');
            csv.push_str(&event.metadata_text().unwrap_or_default().replace(',', ";"));
        }
        csv.push('\n');
    }
    csv
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| FetchError::Http {
            status: 400,
            body: format!("invalid date {raw:?}: {err}"),
        })
}

fn events_per_user_distribution(events: &[Event]) -> EventsPerUserDistribution {
    let mut per_user: BTreeMap<&str, u64> = BTreeMap::new();
    for event in events {
        *per_user.entry(event.user_id.as_str()).or_default() += 1;
    }
    let mut distribution = EventsPerUserDistribution::new();
    for count in per_user.values() {
        let bucket = match count {
            0..=10 => "0-10",
            11..=50 => "11-50",
            _ => "51+",
        };
        *distribution.entry(bucket.to_string()).or_default() += 1;
    }
    distribution
}

fn daily_events_per_user(events: &[Event]) -> DailyEventsPerUser {
    let mut daily = DailyEventsPerUser::new();
    for event in events {
        *daily
            .entry(event.user_id.clone())
            .or_default()
            .entry(event.event_timestamp.date_naive())
            .or_default() += 1;
    }
    daily
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pulse_core::{FilterState, FilterUpdate};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_sample_events_are_deterministic() {
        assert_eq!(sample_events(), sample_events());
        assert_eq!(sample_events().len(), 48);
    }

    #[test]
    fn test_pagination_slices_and_reports_total() {
        let events = sample_events();
        let query = FilterState::new(20).with(FilterUpdate::Page(3)).to_query();
        let page = page_events(&events, &query).unwrap();
        assert_eq!(page.total, 48);
        assert_eq!(page.events.len(), 8);
        assert_eq!(page.events[0].id, "41");
    }

    #[test]
    fn test_page_past_end_is_empty() {
        let events = sample_events();
        let query = FilterState::new(20).with(FilterUpdate::Page(9)).to_query();
        let page = page_events(&events, &query).unwrap();
        assert!(page.events.is_empty());
        assert_eq!(page.total, 48);
    }

    #[test]
    fn test_end_date_includes_whole_day() {
        let events = sample_events();
        // Events run every three hours from 08:00 on Jan 1; Jan 1 holds 08, 11, 14, 17, 20, 23.
        let query = FilterState::new(50)
            .with(FilterUpdate::StartDate(Some(date(1))))
            .with(FilterUpdate::EndDate(Some(date(1))))
            .to_query();
        let page = page_events(&events, &query).unwrap();
        assert_eq!(page.total, 6);
    }

    #[test]
    fn test_exact_and_substring_filters() {
        let events = sample_events();
        let query = FilterState::new(50)
            .with(FilterUpdate::EventType(Some("page_view".to_string())))
            .with(FilterUpdate::MetadataQuery(Some("/dashboard".to_string())))
            .to_query();
        let page = page_events(&events, &query).unwrap();
        assert!(page.total > 0);
        assert!(page.events.iter().all(|e| e.event_type == "page_view"
            && e.metadata_text().unwrap().contains("/dashboard")));
    }

    #[test]
    fn test_csv_export_replaces_commas_in_metadata() {
        let events = sample_events();
        let state = FilterState::default()
            .with(FilterUpdate::EventType(Some("button_click".to_string())));
        let request = ExportRequest::new(&state, ExportFormat::Csv, true);
        let csv = String::from_utf8(render_export(&events, &request).unwrap()).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("ID,User ID,Event Type,Event Timestamp,Metadata"));
        let first = lines.next().unwrap();
        assert!(first.ends_with("button=export; section=events"));
        assert_eq!(first.split(',').count(), 5);
    }

    #[test]
    fn test_csv_export_without_metadata() {
        let events = sample_events();
        let request = ExportRequest::new(&FilterState::default(), ExportFormat::Csv, false);
        let csv = String::from_utf8(render_export(&events, &request).unwrap()).unwrap();
        assert!(csv.starts_with("ID,User ID,Event Type,Event Timestamp\n"));
        assert_eq!(csv.lines().count(), 49);
    }

    #[test]
    fn test_json_export_round_trips_events() {
        let events = sample_events();
        let request = ExportRequest::new(&FilterState::default(), ExportFormat::Json, true);
        let body = render_export(&events, &request).unwrap();
        let parsed: Vec<Event> = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, events);
    }

    #[test]
    fn test_xlsx_is_unsupported() {
        let request = ExportRequest::new(&FilterState::default(), ExportFormat::Xlsx, true);
        assert!(matches!(
            render_export(&sample_events(), &request),
            Err(FetchError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_distribution_counts_every_user_once() {
        let distribution = events_per_user_distribution(&sample_events());
        assert_eq!(distribution.values().sum::<u64>(), 5);
    }

    #[tokio::test]
    async fn test_gateway_serves_trends() {
        let gateway = FixtureGateway::new();
        let payload = gateway
            .fetch(&ResourceRequest::Statistic(StatisticKind::UserRetentionRate))
            .await
            .unwrap();
        assert_eq!(payload.as_rate().unwrap().trend, Some(-2.1));
    }
}
