//! Decoder settings loaded from TOML.
//!
//! - `parse_settings_toml(toml)` parses and validates a complete settings file
//! - `Settings::default()` parses the embedded `default_settings.toml`
//! - Settings are owned by a `SearchContext`; there is no global instance.

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub search: SearchSettings,
    pub chart: ChartSettings,
    pub unknown: UnknownSettings,
    pub nbest: NbestSettings,
}

impl Default for Settings {
    fn default() -> Self {
        parse_settings_toml(DEFAULT_SETTINGS_TOML).expect("embedded settings TOML must be valid")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub stack_size: usize,
    pub beam_width: f32,
    pub pop_limit: usize,
    pub diversity: usize,
    pub max_distortion: i64,
    pub max_phrase_length: usize,
    pub table_limit: usize,
    pub monotone_at_punctuation: bool,
}

impl SearchSettings {
    /// The distortion limit, or `None` when reordering is unrestricted.
    pub fn distortion_limit(&self) -> Option<usize> {
        usize::try_from(self.max_distortion).ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartSettings {
    pub rule_limit: usize,
    pub default_label: String,
    #[serde(default)]
    pub goal_label: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnknownSettings {
    pub drop: bool,
    pub penalty: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NbestSettings {
    pub size: usize,
    pub distinct: bool,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive_usize {
        ($section:ident . $field:ident) => {
            if s.$section.$field == 0 {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_positive_float {
        ($section:ident . $field:ident) => {
            if !(s.$section.$field > 0.0) {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }

    check_positive_float!(search.beam_width);
    check_positive_usize!(search.max_phrase_length);
    check_positive_usize!(search.table_limit);
    check_positive_usize!(chart.rule_limit);

    if s.search.max_distortion < -1 {
        return Err(SettingsError::InvalidValue {
            field: "search.max_distortion".to_string(),
            reason: "must be -1 (unlimited) or non-negative".to_string(),
        });
    }
    if s.chart.default_label.trim().is_empty() {
        return Err(SettingsError::InvalidValue {
            field: "chart.default_label".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if matches!(&s.chart.goal_label, Some(label) if label.trim().is_empty()) {
        return Err(SettingsError::InvalidValue {
            field: "chart.goal_label".to_string(),
            reason: "must not be empty when set".to_string(),
        });
    }
    if !s.unknown.penalty.is_finite() {
        return Err(SettingsError::InvalidValue {
            field: "unknown.penalty".to_string(),
            reason: "must be finite".to_string(),
        });
    }

    Ok(())
}
