//! Pulse Core - Dashboard Data Types
//!
//! Pure data structures shared by the cache, the gateway and the controllers.
//! This crate holds wire shapes, filter/settings value types and error
//! taxonomies. It performs no I/O.

pub mod error;
pub mod event;
pub mod export;
pub mod filter;
pub mod resource;
pub mod settings;
pub mod statistics;

pub use error::{FetchError, FetchErrorKind, ValidationError};
pub use event::{Event, EventsPage};
pub use export::{ExportFilters, ExportFormat, ExportRequest};
pub use filter::{
    end_of_day_utc, start_of_day_utc, total_pages, EventQuery, FilterState, FilterUpdate,
    DEFAULT_PAGE_LIMIT,
};
pub use resource::{Resource, StatisticKind};
pub use settings::{is_dirty, SettingUpdate, SettingsSnapshot};
pub use statistics::{
    AverageStat, CountStat, DailyEventsPerUser, EventTypeCount, EventsPerUserDistribution,
    MonthCount, RateStat, RetentionPeriod, TopUser,
};

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;
