//! User profile and language models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FlowError;

use super::state::StepId;

/// Conversation language, chosen at the first step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    #[default]
    En,
    Sw,
}

impl Language {
    /// Stable code stored as the language answer.
    pub fn code(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Sw => "sw",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "en" => Some(Self::En),
            "sw" => Some(Self::Sw),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The finalized intake answers for one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub language: Language,
    pub name: String,
    pub county: String,
    pub subcounty: String,
    pub ward: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Build a profile from the sequencer's answers. `step` names the step
    /// doing the finalizing and is only used for error reporting.
    pub fn from_answers(
        answers: &BTreeMap<String, String>,
        step: StepId,
    ) -> Result<Self, FlowError> {
        let get = |key: StepId| -> Result<String, FlowError> {
            answers
                .get(key.as_str())
                .cloned()
                .ok_or_else(|| FlowError::MissingAnswer {
                    step: step.to_string(),
                    answer: key.to_string(),
                })
        };

        let language_code = get(StepId::Language)?;
        let language =
            Language::from_code(&language_code).ok_or_else(|| FlowError::MissingAnswer {
                step: step.to_string(),
                answer: StepId::Language.to_string(),
            })?;

        Ok(Self {
            language,
            name: get(StepId::Name)?,
            county: get(StepId::County)?,
            subcounty: get(StepId::SubCounty)?,
            ward: get(StepId::Ward)?,
            completed_at: None,
        })
    }
}
