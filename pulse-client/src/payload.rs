//! Decoded gateway responses.

use pulse_core::{
    AverageStat, CountStat, DailyEventsPerUser, EventTypeCount, EventsPage,
    EventsPerUserDistribution, FetchError, MonthCount, RateStat, Resource, RetentionPeriod,
    StatisticKind, TopUser,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Any value the dashboard caches. One variant per resource shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Events(EventsPage),
    Count(CountStat),
    Average(AverageStat),
    Rate(RateStat),
    EventsByType(Vec<EventTypeCount>),
    EventsByMonth(Vec<MonthCount>),
    TopUsers(Vec<TopUser>),
    UserRetention(Vec<RetentionPeriod>),
    Distribution(EventsPerUserDistribution),
    DailyEventsPerUser(DailyEventsPerUser),
}

impl Payload {
    /// Decode a response body for `resource`. A body that does not match the
    /// expected shape is a schema error.
    pub fn decode(resource: Resource, body: &str) -> Result<Self, FetchError> {
        match resource {
            Resource::Events => parse(resource, body).map(Self::Events),
            Resource::Statistic(kind) => match kind {
                StatisticKind::TotalEvents | StatisticKind::TotalUsers => {
                    parse(resource, body).map(Self::Count)
                }
                StatisticKind::AverageEventsPerUser => parse(resource, body).map(Self::Average),
                StatisticKind::UserRetentionRate => parse(resource, body).map(Self::Rate),
                StatisticKind::EventsByType => parse(resource, body).map(Self::EventsByType),
                StatisticKind::EventsByMonth => parse(resource, body).map(Self::EventsByMonth),
                StatisticKind::TopUsers => parse(resource, body).map(Self::TopUsers),
                StatisticKind::UserRetention => parse(resource, body).map(Self::UserRetention),
                StatisticKind::EventsPerUserDistribution => {
                    parse(resource, body).map(Self::Distribution)
                }
                StatisticKind::DailyEventsPerUser => {
                    parse(resource, body).map(Self::DailyEventsPerUser)
                }
            },
        }
    }

    pub fn as_events(&self) -> Option<&EventsPage> {
        match self {
            Self::Events(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<&CountStat> {
        match self {
            Self::Count(stat) => Some(stat),
            _ => None,
        }
    }

    pub fn as_average(&self) -> Option<&AverageStat> {
        match self {
            Self::Average(stat) => Some(stat),
            _ => None,
        }
    }

    pub fn as_rate(&self) -> Option<&RateStat> {
        match self {
            Self::Rate(stat) => Some(stat),
            _ => None,
        }
    }

    pub fn as_events_by_type(&self) -> Option<&[EventTypeCount]> {
        match self {
            Self::EventsByType(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_events_by_month(&self) -> Option<&[MonthCount]> {
        match self {
            Self::EventsByMonth(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_top_users(&self) -> Option<&[TopUser]> {
        match self {
            Self::TopUsers(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_user_retention(&self) -> Option<&[RetentionPeriod]> {
        match self {
            Self::UserRetention(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_distribution(&self) -> Option<&EventsPerUserDistribution> {
        match self {
            Self::Distribution(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_daily_events_per_user(&self) -> Option<&DailyEventsPerUser> {
        match self {
            Self::DailyEventsPerUser(map) => Some(map),
            _ => None,
        }
    }
}

fn parse<T: DeserializeOwned>(resource: Resource, body: &str) -> Result<T, FetchError> {
    serde_json::from_str(body).map_err(|err| FetchError::schema(resource.cache_name(), err.to_string()))
}
