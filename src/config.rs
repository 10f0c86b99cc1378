//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::intake::{CountyEntry, FlowSettings, FlowVariant};

/// Counties offered when county entry is a choice list and no list is given.
const DEFAULT_COUNTY_CHOICES: &[&str] = &["Mombasa", "Kwale", "Kilifi"];

/// Service configuration, built from `INTAKE_*` environment variables.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// County reference data file.
    pub counties_path: PathBuf,
    /// libSQL database file. `None` keeps everything in memory.
    pub db_path: Option<PathBuf>,
    pub flow: FlowVariant,
    pub settings: FlowSettings,
    /// Conversation id used by the CLI host.
    pub conversation_id: Option<String>,
    /// Directory for daily-rotated log files, in addition to stderr.
    pub log_dir: Option<PathBuf>,
}

impl Default for IntakeConfig {
    fn default() -> Self {
        Self {
            counties_path: PathBuf::from("data/countiessubcounties.json"),
            db_path: None,
            flow: FlowVariant::default(),
            settings: FlowSettings::default(),
            conversation_id: None,
            log_dir: None,
        }
    }
}

impl IntakeConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. Unset or blank keys take defaults;
    /// values that are set but do not parse are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let flow = match get("INTAKE_FLOW") {
            Some(v) => v.parse().map_err(|message| ConfigError::InvalidValue {
                key: "INTAKE_FLOW".into(),
                message,
            })?,
            None => defaults.flow,
        };

        let county_entry = match get("INTAKE_COUNTY_ENTRY").as_deref() {
            None | Some("free_text") => CountyEntry::FreeText,
            Some("choices") => CountyEntry::Choices(
                get("INTAKE_COUNTY_CHOICES")
                    .map(|v| split_list(&v))
                    .unwrap_or_else(|| {
                        DEFAULT_COUNTY_CHOICES.iter().map(|s| s.to_string()).collect()
                    }),
            ),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "INTAKE_COUNTY_ENTRY".into(),
                    message: format!("expected free_text or choices, got {other}"),
                });
            }
        };

        let ward_choices = get("INTAKE_WARD_CHOICES")
            .map(|v| split_list(&v))
            .unwrap_or(defaults.settings.ward_choices);
        if ward_choices.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_WARD_CHOICES".into(),
                message: "at least one ward is required".into(),
            });
        }

        let max_retries = match get("INTAKE_MAX_RETRIES") {
            Some(v) => Some(v.parse::<u32>().map_err(|e| ConfigError::InvalidValue {
                key: "INTAKE_MAX_RETRIES".into(),
                message: e.to_string(),
            })?),
            None => None,
        };

        Ok(Self {
            counties_path: get("INTAKE_COUNTIES_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.counties_path),
            db_path: get("INTAKE_DB_PATH").map(PathBuf::from),
            flow,
            settings: FlowSettings {
                county_entry,
                ward_choices,
                news_url: get("INTAKE_NEWS_URL").unwrap_or(defaults.settings.news_url),
                max_retries,
            },
            conversation_id: get("INTAKE_CONVERSATION_ID"),
            log_dir: get("INTAKE_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
