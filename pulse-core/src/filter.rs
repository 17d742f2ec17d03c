//! Event log filters and their wire form.
//!
//! [`FilterState`] is what the user edits; [`EventQuery`] is what goes over
//! the wire and into the cache key. The conversion normalizes date-only input
//! to inclusive UTC day boundaries so that boundary-day events are never
//! silently excluded.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Page size used when nothing else has been configured.
pub const DEFAULT_PAGE_LIMIT: u32 = 20;

/// User-entered filter criteria plus pagination position.
///
/// Fields are private so every mutation goes through [`FilterState::apply`],
/// which enforces the page-reset rule and the `page >= 1`, `limit >= 1` bounds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FilterState {
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    event_type: Option<String>,
    user_id: Option<String>,
    metadata_query: Option<String>,
    page: u32,
    limit: u32,
}

/// A single field edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterUpdate {
    StartDate(Option<NaiveDate>),
    EndDate(Option<NaiveDate>),
    EventType(Option<String>),
    UserId(Option<String>),
    MetadataQuery(Option<String>),
    Limit(u32),
    Page(u32),
}

impl FilterUpdate {
    /// Whether this edit moves within the current result set rather than
    /// changing the result set itself.
    pub fn is_pagination(&self) -> bool {
        matches!(self, Self::Page(_))
    }
}

impl FilterState {
    pub fn new(limit: u32) -> Self {
        Self {
            start_date: None,
            end_date: None,
            event_type: None,
            user_id: None,
            metadata_query: None,
            page: 1,
            limit: limit.max(1),
        }
    }

    /// Apply one edit. Any edit other than [`FilterUpdate::Page`] resets the
    /// page to 1. Blank text input clears the field.
    pub fn apply(&mut self, update: FilterUpdate) {
        match update {
            FilterUpdate::Page(page) => {
                self.page = page.max(1);
                return;
            }
            FilterUpdate::StartDate(date) => self.start_date = date,
            FilterUpdate::EndDate(date) => self.end_date = date,
            FilterUpdate::EventType(value) => self.event_type = non_blank(value),
            FilterUpdate::UserId(value) => self.user_id = non_blank(value),
            FilterUpdate::MetadataQuery(value) => self.metadata_query = non_blank(value),
            FilterUpdate::Limit(limit) => self.limit = limit.max(1),
        }
        self.page = 1;
    }

    /// Builder-style [`FilterState::apply`].
    pub fn with(mut self, update: FilterUpdate) -> Self {
        self.apply(update);
        self
    }

    /// Drop every criterion and return to the first page. The page size is kept.
    pub fn clear(&mut self) {
        *self = Self::new(self.limit);
    }

    pub fn start_date(&self) -> Option<NaiveDate> {
        self.start_date
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }

    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn metadata_query(&self) -> Option<&str> {
        self.metadata_query.as_deref()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn has_criteria(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || self.event_type.is_some()
            || self.user_id.is_some()
            || self.metadata_query.is_some()
    }

    /// The exact parameter set sent to `GET /api/events`.
    pub fn to_query(&self) -> EventQuery {
        EventQuery {
            start_date: self.start_date.map(|d| format_instant(start_of_day_utc(d))),
            end_date: self.end_date.map(|d| format_instant(end_of_day_utc(d))),
            event_type: self.event_type.clone(),
            user_id: self.user_id.clone(),
            metadata: self.metadata_query.clone(),
            page: self.page,
            limit: self.limit,
        }
    }
}

impl Default for FilterState {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_LIMIT)
    }
}

/// Wire form of [`FilterState`]. Absent criteria are omitted entirely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl EventQuery {
    /// Query-string pairs in wire order, absent criteria omitted.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = criteria_pairs(
            &self.start_date,
            &self.end_date,
            &self.event_type,
            &self.user_id,
            &self.metadata,
        );
        pairs.push(("page", self.page.to_string()));
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}

pub(crate) fn criteria_pairs(
    start_date: &Option<String>,
    end_date: &Option<String>,
    event_type: &Option<String>,
    user_id: &Option<String>,
    metadata: &Option<String>,
) -> Vec<(&'static str, String)> {
    [
        ("startDate", start_date),
        ("endDate", end_date),
        ("eventType", event_type),
        ("userId", user_id),
        ("metadata", metadata),
    ]
    .into_iter()
    .filter_map(|(name, value)| value.as_ref().map(|v| (name, v.clone())))
    .collect()
}

/// Number of pages for a server-reported total. A zero-result set still has
/// one (empty) page.
pub fn total_pages(server_total: u64, limit: u32) -> u32 {
    let limit = u64::from(limit.max(1));
    let pages = server_total.div_ceil(limit).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// First instant of `date` in UTC.
pub fn start_of_day_utc(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(chrono::NaiveTime::MIN))
}

/// Last millisecond of `date` in UTC. The last representable date saturates
/// to the latest representable instant.
pub fn end_of_day_utc(date: NaiveDate) -> DateTime<Utc> {
    date.succ_opt()
        .map(|next| start_of_day_utc(next) - Duration::milliseconds(1))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub(crate) fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
