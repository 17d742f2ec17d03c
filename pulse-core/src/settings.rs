//! Display preferences and their string encoding for the durable store.

use serde::{Deserialize, Serialize};

use crate::export::ExportFormat;

/// One complete set of user display preferences.
///
/// The reconciler keeps two of these (draft and committed); dirtiness is
/// always derived by [`is_dirty`], never tracked separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub events_per_page: u32,
    pub chart_animations_enabled: bool,
    pub export_format: ExportFormat,
    pub include_metadata: bool,
}

impl SettingsSnapshot {
    pub const DEFAULT_EVENTS_PER_PAGE: u32 = 10;

    pub const KEY_EVENTS_PER_PAGE: &'static str = "analytics-settings-eventsPerPage";
    pub const KEY_CHART_ANIMATIONS: &'static str = "analytics-settings-chartAnimations";
    pub const KEY_EXPORT_FORMAT: &'static str = "analytics-settings-exportFormat";
    pub const KEY_INCLUDE_METADATA: &'static str = "analytics-settings-includeMetadata";

    /// Every store key, in write order.
    pub const KEYS: [&'static str; 4] = [
        Self::KEY_EVENTS_PER_PAGE,
        Self::KEY_CHART_ANIMATIONS,
        Self::KEY_EXPORT_FORMAT,
        Self::KEY_INCLUDE_METADATA,
    ];

    /// Apply a single field edit.
    pub fn apply(&mut self, update: SettingUpdate) {
        match update {
            SettingUpdate::EventsPerPage(n) => self.events_per_page = n.max(1),
            SettingUpdate::ChartAnimationsEnabled(v) => self.chart_animations_enabled = v,
            SettingUpdate::ExportFormat(f) => self.export_format = f,
            SettingUpdate::IncludeMetadata(v) => self.include_metadata = v,
        }
    }

    /// Encode every field as `(store key, value)` pairs.
    pub fn encode(&self) -> Vec<(&'static str, String)> {
        vec![
            (Self::KEY_EVENTS_PER_PAGE, self.events_per_page.to_string()),
            (
                Self::KEY_CHART_ANIMATIONS,
                self.chart_animations_enabled.to_string(),
            ),
            (
                Self::KEY_EXPORT_FORMAT,
                self.export_format.as_str().to_string(),
            ),
            (Self::KEY_INCLUDE_METADATA, self.include_metadata.to_string()),
        ]
    }

    /// Build a snapshot from raw stored values, each field decoded
    /// independently. Absent or unparsable values fall back to the default for
    /// that field only.
    pub fn decode<F>(mut lookup: F) -> Self
    where
        F: FnMut(&'static str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            events_per_page: lookup(Self::KEY_EVENTS_PER_PAGE)
                .and_then(|raw| raw.trim().parse::<u32>().ok())
                .filter(|n| *n >= 1)
                .unwrap_or(defaults.events_per_page),
            chart_animations_enabled: lookup(Self::KEY_CHART_ANIMATIONS)
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(defaults.chart_animations_enabled),
            export_format: lookup(Self::KEY_EXPORT_FORMAT)
                .and_then(|raw| raw.parse::<ExportFormat>().ok())
                .unwrap_or(defaults.export_format),
            include_metadata: lookup(Self::KEY_INCLUDE_METADATA)
                .and_then(|raw| parse_bool(&raw))
                .unwrap_or(defaults.include_metadata),
        }
    }
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            events_per_page: Self::DEFAULT_EVENTS_PER_PAGE,
            chart_animations_enabled: true,
            export_format: ExportFormat::Csv,
            include_metadata: true,
        }
    }
}

/// A single settings field edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingUpdate {
    EventsPerPage(u32),
    ChartAnimationsEnabled(bool),
    ExportFormat(ExportFormat),
    IncludeMetadata(bool),
}

/// Field-wise divergence between a draft and the committed snapshot.
pub fn is_dirty(draft: &SettingsSnapshot, committed: &SettingsSnapshot) -> bool {
    draft != committed
}

// Older builds wrote booleans through a JSON encoder, so accept quoted forms.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().trim_matches('"') {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let s = SettingsSnapshot::default();
        assert_eq!(s.events_per_page, 10);
        assert!(s.chart_animations_enabled);
        assert_eq!(s.export_format, ExportFormat::Csv);
        assert!(s.include_metadata);
    }

    #[test]
    fn test_decode_falls_back_per_field() {
        let stored: HashMap<&str, &str> = [
            (SettingsSnapshot::KEY_EVENTS_PER_PAGE, "fifty"),
            (SettingsSnapshot::KEY_CHART_ANIMATIONS, "false"),
            (SettingsSnapshot::KEY_EXPORT_FORMAT, "xlsx"),
        ]
        .into_iter()
        .collect();
        let s = SettingsSnapshot::decode(|k| stored.get(k).map(|v| v.to_string()));
        assert_eq!(s.events_per_page, 10);
        assert!(!s.chart_animations_enabled);
        assert_eq!(s.export_format, ExportFormat::Xlsx);
        assert!(s.include_metadata);
    }

    #[test]
    fn test_decode_rejects_zero_page_size() {
        let s = SettingsSnapshot::decode(|k| {
            (k == SettingsSnapshot::KEY_EVENTS_PER_PAGE).then(|| "0".to_string())
        });
        assert_eq!(s.events_per_page, 10);
    }

    #[test]
    fn test_encode_decode_agree() {
        let s = SettingsSnapshot {
            events_per_page: 50,
            chart_animations_enabled: false,
            export_format: ExportFormat::Json,
            include_metadata: false,
        };
        let encoded: HashMap<&str, String> = s.encode().into_iter().collect();
        assert_eq!(encoded[SettingsSnapshot::KEY_EVENTS_PER_PAGE], "50");
        let decoded = SettingsSnapshot::decode(|k| encoded.get(k).cloned());
        assert_eq!(decoded, s);
    }

    #[test]
    fn test_is_dirty_is_field_wise() {
        let committed = SettingsSnapshot::default();
        let mut draft = committed.clone();
        assert!(!is_dirty(&draft, &committed));
        draft.apply(SettingUpdate::EventsPerPage(50));
        assert!(is_dirty(&draft, &committed));
        draft.apply(SettingUpdate::EventsPerPage(10));
        assert!(!is_dirty(&draft, &committed));
    }
}
