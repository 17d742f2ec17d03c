//! Export formats and the request snapshot sent to the export endpoint.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::filter::{criteria_pairs, end_of_day_utc, format_instant, start_of_day_utc, FilterState};

/// File format produced by `GET /api/events/export`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
    Xlsx,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 3] = [Self::Csv, Self::Json, Self::Xlsx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn extension(&self) -> &'static str {
        self.as_str()
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "xlsx" => Ok(Self::Xlsx),
            other => Err(ValidationError::InvalidValue {
                field: "export_format",
                reason: format!("unknown format '{}', expected csv, json or xlsx", other),
            }),
        }
    }
}

/// Filter criteria of an export: the filter state minus pagination, with
/// dates already normalized to UTC instants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportFilters {
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
}

impl From<&FilterState> for ExportFilters {
    fn from(state: &FilterState) -> Self {
        Self {
            start_date: state
                .start_date()
                .map(|d| format_instant(start_of_day_utc(d))),
            end_date: state.end_date().map(|d| format_instant(end_of_day_utc(d))),
            event_type: state.event_type().map(str::to_string),
            user_id: state.user_id().map(str::to_string),
            metadata: state.metadata_query().map(str::to_string),
        }
    }
}

/// Everything needed to run one export, captured by value at invocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRequest {
    #[serde(flatten)]
    pub filters: ExportFilters,
    pub format: ExportFormat,
    pub include_metadata: bool,
}

impl ExportRequest {
    pub fn new(filters: &FilterState, format: ExportFormat, include_metadata: bool) -> Self {
        Self {
            filters: ExportFilters::from(filters),
            format,
            include_metadata,
        }
    }

    /// Query-string pairs for the export endpoint.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let f = &self.filters;
        let mut pairs = criteria_pairs(
            &f.start_date,
            &f.end_date,
            &f.event_type,
            &f.user_id,
            &f.metadata,
        );
        pairs.push(("includeMetadata", self.include_metadata.to_string()));
        pairs.push(("format", self.format.as_str().to_string()));
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterUpdate;

    #[test]
    fn test_format_parse() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!(" xlsx ".parse::<ExportFormat>().unwrap(), ExportFormat::Xlsx);
        assert!("pdf".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_request_drops_pagination() {
        let state = FilterState::new(20)
            .with(FilterUpdate::EventType(Some("download".to_string())))
            .with(FilterUpdate::Page(3));
        let request = ExportRequest::new(&state, ExportFormat::Json, false);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "eventType": "download",
                "format": "json",
                "includeMetadata": false
            })
        );
    }

    #[test]
    fn test_request_is_a_snapshot() {
        let mut state = FilterState::new(20).with(FilterUpdate::UserId(Some("u1".to_string())));
        let request = ExportRequest::new(&state, ExportFormat::Csv, true);
        state.apply(FilterUpdate::UserId(Some("u2".to_string())));
        assert_eq!(request.filters.user_id.as_deref(), Some("u1"));
    }

    #[test]
    fn test_request_pairs_end_with_format() {
        let state = FilterState::new(20).with(FilterUpdate::MetadataQuery(Some("page=".to_string())));
        let pairs = ExportRequest::new(&state, ExportFormat::Xlsx, true).to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("metadata", "page=".to_string()),
                ("includeMetadata", "true".to_string()),
                ("format", "xlsx".to_string()),
            ]
        );
    }

    #[test]
    fn test_request_with_last_end_date_is_built() {
        let state =
            FilterState::new(20).with(FilterUpdate::EndDate(Some(chrono::NaiveDate::MAX)));
        let request = ExportRequest::new(&state, ExportFormat::Csv, false);
        assert!(request.filters.end_date.is_some());
    }
}
