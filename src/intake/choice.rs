//! Choice sets offered with prompts, and matching of free-form replies
//! against them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Replies such as `2`, `2.`, `2)` or `(2)`.
static ORDINAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\(?\s*(\d{1,2})\s*[.)]?$").expect("valid ordinal regex"));

/// Shortest reply considered for fuzzy matching.
const MIN_FUZZY_LEN: usize = 3;

/// One offered option. `value` is stable across languages; `label` is what
/// the user sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub synonyms: Vec<String>,
}

impl Choice {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            synonyms: Vec::new(),
        }
    }

    /// A choice whose value is its label.
    pub fn plain(label: impl Into<String>) -> Self {
        let label = label.into();
        Self::new(label.clone(), label)
    }

    pub fn with_synonyms<I, S>(mut self, synonyms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.synonyms.extend(synonyms.into_iter().map(Into::into));
        self
    }
}

/// An ordered set of choices. Labels are unique (case-insensitively).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChoiceSet(Vec<Choice>);

impl ChoiceSet {
    /// Build a set, dropping later entries whose label repeats an earlier one.
    pub fn new(choices: impl IntoIterator<Item = Choice>) -> Self {
        let mut out: Vec<Choice> = Vec::new();
        for choice in choices {
            let key = normalize(&choice.label);
            if !out.iter().any(|c| normalize(&c.label) == key) {
                out.push(choice);
            }
        }
        Self(out)
    }

    /// Build a set of plain choices from labels.
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(labels.into_iter().map(Choice::plain))
    }

    pub fn choices(&self) -> &[Choice] {
        &self.0
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Match a reply against the set.
    ///
    /// Tried in order: exact label, exact value or synonym, 1-based position,
    /// then a fuzzy match that must be unique. All comparisons ignore case and
    /// repeated whitespace.
    pub fn recognize(&self, reply: &str) -> Option<&Choice> {
        let needle = normalize(reply);
        if needle.is_empty() {
            return None;
        }

        if let Some(c) = self.0.iter().find(|c| normalize(&c.label) == needle) {
            return Some(c);
        }

        if let Some(c) = self.0.iter().find(|c| {
            normalize(&c.value) == needle || c.synonyms.iter().any(|s| normalize(s) == needle)
        }) {
            return Some(c);
        }

        if let Some(caps) = ORDINAL.captures(&needle) {
            let position: usize = caps[1].parse().ok()?;
            return position.checked_sub(1).and_then(|idx| self.0.get(idx));
        }

        if needle.chars().count() < MIN_FUZZY_LEN {
            return None;
        }
        let mut fuzzy = self.0.iter().filter(|c| fuzzy_matches(c, &needle));
        match (fuzzy.next(), fuzzy.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }
}

/// Lowercase and collapse internal whitespace.
fn normalize(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The reply is a prefix of the label, or a whole-word run inside it.
fn fuzzy_matches(choice: &Choice, needle: &str) -> bool {
    std::iter::once(&choice.label)
        .chain(choice.synonyms.iter())
        .map(|s| normalize(s))
        .any(|candidate| {
            candidate.starts_with(needle)
                || format!(" {candidate} ").contains(&format!(" {needle} "))
        })
}
