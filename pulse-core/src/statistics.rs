//! Statistics response shapes.
//!
//! Scalar statistics carry an optional `trend` (percentage change against the
//! previous period). A missing trend means no comparison is available; it is
//! never read as zero.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `total-events` and `total-users`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountStat {
    pub count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<f64>,
}

/// `average-events-per-user`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AverageStat {
    pub average: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<f64>,
}

/// `user-retention-rate`, as a percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStat {
    pub rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: u64,
}

/// Month is formatted `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthCount {
    pub month: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUser {
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    pub event_count: u64,
}

impl TopUser {
    /// Name to show, falling back to the raw user id.
    pub fn display_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or(&self.user_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPeriod {
    pub period: String,
    pub retention_rate: f64,
}

/// Bucket label (e.g. `"1-5"`) to number of users.
pub type EventsPerUserDistribution = BTreeMap<String, u64>;

/// User id to per-day event counts.
pub type DailyEventsPerUser = BTreeMap<String, BTreeMap<NaiveDate, u64>>;
