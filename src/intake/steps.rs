//! Per-step behaviour. Every function here is pure: it reads the answers
//! captured so far plus the reference data and returns what the sequencer
//! should do next.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FlowError;
use crate::reference::{County, CountyDirectory};

use super::card::RichCard;
use super::choice::{Choice, ChoiceSet};
use super::model::Language;
use super::prompts::{self, Strings, values};
use super::state::StepId;

/// How the county step collects its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountyEntry {
    /// Typed county name, matched case-sensitively against the reference data.
    FreeText,
    /// A fixed list of county names offered as choices.
    Choices(Vec<String>),
}

/// Tunables for a flow, fixed at startup.
#[derive(Debug, Clone)]
pub struct FlowSettings {
    pub county_entry: CountyEntry,
    pub ward_choices: Vec<String>,
    /// Follow-up link carried by the news card.
    pub news_url: String,
    /// Rejected replies tolerated at one step before the conversation starts
    /// over. `None` leaves it to the transport.
    pub max_retries: Option<u32>,
}

impl Default for FlowSettings {
    fn default() -> Self {
        Self {
            county_entry: CountyEntry::FreeText,
            ward_choices: vec!["Sub 1".to_string(), "ub".to_string()],
            news_url: "https://news.microsoft.com/exec/brad-smith/".to_string(),
            max_retries: None,
        }
    }
}

/// A message that expects a reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub text: String,
    pub choices: Option<ChoiceSet>,
    pub card: Option<RichCard>,
}

impl Prompt {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            choices: None,
            card: None,
        }
    }

    fn with_choices(text: impl Into<String>, choices: ChoiceSet) -> Self {
        Self {
            text: text.into(),
            choices: Some(choices),
            card: None,
        }
    }
}

/// What a step does when the cursor reaches it.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Ask and suspend until the next turn.
    Prompt(Prompt),
    /// Send a message and move straight on.
    Say(String),
    /// End the conversation.
    Finish,
}

/// Where the cursor goes after an accepted reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Advance,
    /// Prompt the same step again.
    Stay,
    Goto(StepId),
    /// Clear all answers and go back to the first step.
    Restart,
}

/// A reply after choice-set validation.
#[derive(Debug, Clone, Copy)]
pub enum Answer<'a> {
    Text(&'a str),
    Choice(&'a Choice),
}

/// A step's verdict on a reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Accept {
        /// Stored under the step's name when present.
        value: Option<String>,
        /// Sent before whatever the next step emits.
        notice: Option<String>,
        next: Next,
    },
    Reject,
}

impl Reply {
    fn advance(value: impl Into<String>) -> Self {
        Self::Accept {
            value: Some(value.into()),
            notice: None,
            next: Next::Advance,
        }
    }
}

/// Read-only view a step works from.
pub struct StepContext<'a> {
    pub answers: &'a BTreeMap<String, String>,
    pub directory: &'a CountyDirectory,
    pub settings: &'a FlowSettings,
}

impl<'a> StepContext<'a> {
    pub fn new(
        answers: &'a BTreeMap<String, String>,
        directory: &'a CountyDirectory,
        settings: &'a FlowSettings,
    ) -> Self {
        Self {
            answers,
            directory,
            settings,
        }
    }

    /// Language chosen at the first step; English until then.
    pub fn language(&self) -> Language {
        self.answers
            .get(StepId::Language.as_str())
            .and_then(|code| Language::from_code(code))
            .unwrap_or_default()
    }

    pub fn strings(&self) -> &'static Strings {
        prompts::strings(self.language())
    }

    fn required(&self, step: StepId, answer: StepId) -> Result<&'a str, FlowError> {
        self.answers
            .get(answer.as_str())
            .map(String::as_str)
            .ok_or_else(|| FlowError::MissingAnswer {
                step: step.to_string(),
                answer: answer.to_string(),
            })
    }

    /// The county captured earlier. Its absence from the reference data means
    /// the county step accepted something it should not have.
    fn chosen_county(&self, step: StepId) -> Result<&'a County, FlowError> {
        let name = self.required(step, StepId::County)?;
        self.directory
            .find_by_name(name)
            .ok_or_else(|| FlowError::ReferenceInconsistency {
                county: name.to_string(),
            })
    }
}

/// Steps whose entry writes the finished profile.
pub fn finalizes_profile(step: StepId) -> bool {
    matches!(step, StepId::Summary | StepId::Finish)
}

/// Run a step's entry action.
pub fn enter(step: StepId, ctx: &StepContext<'_>) -> Result<Entry, FlowError> {
    match step {
        StepId::NameConfirm => {
            let name = ctx.required(step, StepId::Name)?;
            Ok(Entry::Say(ctx.strings().thanks(name)))
        }
        StepId::Finish => Ok(Entry::Finish),
        _ => prompt(step, ctx, false).map(Entry::Prompt),
    }
}

/// The prompt for a prompting step; `retry` selects the retry wording.
pub fn prompt(step: StepId, ctx: &StepContext<'_>, retry: bool) -> Result<Prompt, FlowError> {
    let s = ctx.strings();
    let with_retry = |text: String| if retry { s.choice_retry(&text) } else { text };

    let prompt = match step {
        StepId::Language => {
            let text = if retry {
                format!("{} {}", prompts::LANGUAGE_RETRY, prompts::LANGUAGE_PROMPT)
            } else {
                prompts::LANGUAGE_PROMPT.to_string()
            };
            Prompt::with_choices(text, prompts::language_choices())
        }
        StepId::Name => Prompt::text(if retry { s.name_retry } else { s.name_prompt }),
        StepId::County => {
            let text = if retry { s.county_retry } else { s.county_prompt };
            match &ctx.settings.county_entry {
                CountyEntry::FreeText => Prompt::text(text),
                CountyEntry::Choices(names) => {
                    Prompt::with_choices(text, ChoiceSet::from_labels(names.iter().cloned()))
                }
            }
        }
        StepId::SubCounty => {
            let county = ctx.chosen_county(step)?;
            Prompt::with_choices(
                with_retry(s.subcounty_prompt.to_string()),
                ChoiceSet::from_labels(county.sub_counties.iter().cloned()),
            )
        }
        StepId::Ward => Prompt::with_choices(
            with_retry(s.ward_prompt.to_string()),
            ChoiceSet::from_labels(ctx.settings.ward_choices.iter().cloned()),
        ),
        StepId::Summary => {
            let name = ctx.required(step, StepId::Name)?;
            Prompt::with_choices(with_retry(s.summary(name)), s.summary_choices())
        }
        StepId::MainMenu => {
            let name = ctx.required(step, StepId::Name)?;
            Prompt::with_choices(with_retry(s.main_menu(name)), s.main_menu_choices())
        }
        StepId::SubMenu => Prompt::with_choices(
            with_retry(s.sub_menu_prompt.to_string()),
            s.sub_menu_choices(),
        ),
        StepId::ChooseAction => {
            let choices = s.action_choices();
            let card = choices.choices().iter().fold(
                RichCard::new(s.card_title, s.card_body),
                |card, choice| {
                    let data = if choice.value == values::NEWS_LINKS {
                        ctx.settings.news_url.clone()
                    } else {
                        choice.value.clone()
                    };
                    card.with_action(choice.label.clone(), data)
                },
            );
            Prompt {
                text: with_retry(s.action_prompt.to_string()),
                choices: Some(choices),
                card: Some(card),
            }
        }
        StepId::NameConfirm | StepId::Finish => {
            return Err(FlowError::Definition(format!("step {step} does not prompt")));
        }
    };

    Ok(prompt)
}

/// Judge a reply to a step's prompt.
///
/// Choice steps only ever see `Answer::Choice`: the sequencer validates
/// against the offered set before calling this.
pub fn accept(step: StepId, ctx: &StepContext<'_>, answer: Answer<'_>) -> Result<Reply, FlowError> {
    let s = ctx.strings();

    let reply = match (step, answer) {
        (StepId::Language, Answer::Choice(c)) => Reply::advance(c.value.clone()),

        (StepId::Name, Answer::Text(text)) => {
            let name = text.trim();
            if name.is_empty() {
                Reply::Reject
            } else {
                Reply::advance(name)
            }
        }

        (StepId::County, Answer::Text(text)) => match ctx.directory.find_by_name(text.trim()) {
            Some(county) => Reply::advance(county.name.clone()),
            None => Reply::Reject,
        },
        (StepId::County, Answer::Choice(c)) => match ctx.directory.find_by_name(&c.value) {
            Some(county) => Reply::advance(county.name.clone()),
            None => Reply::Reject,
        },

        (StepId::SubCounty, Answer::Choice(c)) => {
            let county = ctx.chosen_county(step)?;
            if county.has_sub_county(&c.value) {
                Reply::advance(c.value.clone())
            } else {
                Reply::Reject
            }
        }

        (StepId::Ward, Answer::Choice(c)) => Reply::advance(c.value.clone()),

        (StepId::Summary, Answer::Choice(c)) if c.value == values::GO_BACK => Reply::Accept {
            value: None,
            notice: Some(s.restart.to_string()),
            next: Next::Restart,
        },
        (StepId::Summary, Answer::Choice(c)) => Reply::advance(c.value.clone()),

        (StepId::MainMenu, Answer::Choice(c)) => match c.value.as_str() {
            values::NEWS => Reply::advance(c.value.clone()),
            values::UPDATE_PROFILE => Reply::Accept {
                value: None,
                notice: Some(s.restart.to_string()),
                next: Next::Restart,
            },
            _ => Reply::Accept {
                value: Some(c.value.clone()),
                notice: Some(s.unavailable(&c.label)),
                next: Next::Stay,
            },
        },

        (StepId::SubMenu, Answer::Choice(c)) if c.value == values::LATEST_LEGAL_NEWS => {
            Reply::advance(c.value.clone())
        }

        (StepId::ChooseAction, Answer::Choice(c)) => match c.value.as_str() {
            values::NEWS_LINKS => Reply::Accept {
                value: Some(c.value.clone()),
                notice: Some(s.news_link(&ctx.settings.news_url)),
                next: Next::Stay,
            },
            _ => Reply::Accept {
                value: Some(c.value.clone()),
                notice: None,
                next: Next::Goto(StepId::MainMenu),
            },
        },

        (StepId::NameConfirm | StepId::Finish, _) => {
            return Err(FlowError::Definition(format!(
                "step {step} does not take replies"
            )));
        }

        _ => Reply::Reject,
    };

    Ok(reply)
}
