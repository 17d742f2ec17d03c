//! Logical resources exposed by the analytics service.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregate statistics served under `/api/statistics/*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatisticKind {
    TotalEvents,
    TotalUsers,
    AverageEventsPerUser,
    UserRetentionRate,
    EventsByType,
    EventsByMonth,
    TopUsers,
    UserRetention,
    EventsPerUserDistribution,
    DailyEventsPerUser,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 10] = [
        Self::TotalEvents,
        Self::TotalUsers,
        Self::AverageEventsPerUser,
        Self::UserRetentionRate,
        Self::EventsByType,
        Self::EventsByMonth,
        Self::TopUsers,
        Self::UserRetention,
        Self::EventsPerUserDistribution,
        Self::DailyEventsPerUser,
    ];

    /// Path segment under `/api/statistics/`.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::TotalEvents => "total-events",
            Self::TotalUsers => "total-users",
            Self::AverageEventsPerUser => "average-events-per-user",
            Self::UserRetentionRate => "user-retention-rate",
            Self::EventsByType => "events-by-type",
            Self::EventsByMonth => "events-by-month",
            Self::TopUsers => "top-users",
            Self::UserRetention => "user-retention",
            Self::EventsPerUserDistribution => "events-per-user-distribution",
            Self::DailyEventsPerUser => "daily-events-per-user",
        }
    }

    pub fn path(&self) -> String {
        format!("/api/statistics/{}", self.slug())
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// A cacheable read resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Events,
    Statistic(StatisticKind),
}

impl Resource {
    /// Logical cache name. Statistics share the `statistics/` prefix so they
    /// can be invalidated as a group.
    pub fn cache_name(&self) -> String {
        match self {
            Self::Events => "events".to_string(),
            Self::Statistic(kind) => format!("statistics/{}", kind.slug()),
        }
    }

    pub fn path(&self) -> String {
        match self {
            Self::Events => "/api/events".to_string(),
            Self::Statistic(kind) => kind.path(),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cache_name())
    }
}
