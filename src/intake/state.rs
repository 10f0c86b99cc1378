//! Sequencer state: the cursor and accumulated answers persisted between
//! turns.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use super::choice::ChoiceSet;
use super::sequencer::OutboundTurn;

/// How many applied message ids a conversation remembers for redelivery checks.
pub const RECENT_MESSAGE_IDS: usize = 32;

/// Named steps of the intake flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepId {
    Language,
    Name,
    NameConfirm,
    County,
    #[serde(rename = "subcounty")]
    SubCounty,
    Ward,
    Summary,
    MainMenu,
    SubMenu,
    ChooseAction,
    Finish,
}

impl StepId {
    /// Key under which the step's answer is stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Language => "language",
            Self::Name => "name",
            Self::NameConfirm => "name_confirm",
            Self::County => "county",
            Self::SubCounty => "subcounty",
            Self::Ward => "ward",
            Self::Summary => "summary",
            Self::MainMenu => "main_menu",
            Self::SubMenu => "sub_menu",
            Self::ChooseAction => "choose_action",
            Self::Finish => "finish",
        }
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which revision of the flow a conversation runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowVariant {
    /// Intake followed by the main menu, news sub-menu and action card.
    #[default]
    Extended,
    /// Intake, summary, then done.
    Simple,
}

impl FlowVariant {
    /// The ordered step list for this variant.
    pub fn steps(&self) -> &'static [StepId] {
        use StepId::*;
        match self {
            Self::Extended => &[
                Language,
                Name,
                NameConfirm,
                County,
                SubCounty,
                Ward,
                Summary,
                MainMenu,
                SubMenu,
                ChooseAction,
            ],
            Self::Simple => &[Language, Name, County, SubCounty, Ward, Summary, Finish],
        }
    }
}

impl std::fmt::Display for FlowVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extended => write!(f, "extended"),
            Self::Simple => write!(f, "simple"),
        }
    }
}

impl std::str::FromStr for FlowVariant {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extended" => Ok(Self::Extended),
            "simple" => Ok(Self::Simple),
            _ => Err(format!("Unknown flow variant: {s}")),
        }
    }
}

/// Position in the step list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cursor {
    Step(usize),
    Complete,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::Step(0)
    }
}

/// Everything needed to resume a conversation on its next turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencerState {
    pub conversation_id: String,
    pub flow: FlowVariant,
    pub cursor: Cursor,
    /// The step at `cursor` has prompted and the next inbound text is its reply.
    #[serde(default)]
    pub awaiting_reply: bool,
    /// Exactly the choice set offered by the last prompt, if it had one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_choices: Option<ChoiceSet>,
    /// Captured values keyed by step name.
    #[serde(default)]
    pub answers: BTreeMap<String, String>,
    /// Consecutive rejected replies at the current step.
    #[serde(default)]
    pub retries: u32,
    /// Incremented on every committed turn; 0 means never stored.
    #[serde(default)]
    pub revision: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outbound: Option<OutboundTurn>,
    /// Ids of recently applied messages, oldest first.
    #[serde(default, skip_serializing_if = "VecDeque::is_empty")]
    pub recent_message_ids: VecDeque<String>,
}

impl SequencerState {
    /// Fresh state for a conversation that has never been seen.
    pub fn new(conversation_id: impl Into<String>, flow: FlowVariant) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            flow,
            cursor: Cursor::default(),
            awaiting_reply: false,
            pending_choices: None,
            answers: BTreeMap::new(),
            retries: 0,
            revision: 0,
            last_message_id: None,
            last_outbound: None,
            recent_message_ids: VecDeque::new(),
        }
    }

    pub fn answer(&self, step: StepId) -> Option<&str> {
        self.answers.get(step.as_str()).map(String::as_str)
    }

    pub fn is_complete(&self) -> bool {
        self.cursor == Cursor::Complete
    }

    /// The step the cursor points at, if any.
    pub fn current_step(&self) -> Option<StepId> {
        match self.cursor {
            Cursor::Step(idx) => self.flow.steps().get(idx).copied(),
            Cursor::Complete => None,
        }
    }

    /// Whether a message with this id has already been applied.
    pub fn has_seen(&self, message_id: &str) -> bool {
        self.recent_message_ids.iter().any(|id| id == message_id)
    }

    /// Note an applied message id, dropping the oldest past the window.
    pub(crate) fn remember_message(&mut self, message_id: &str) {
        if self.has_seen(message_id) {
            return;
        }
        if self.recent_message_ids.len() == RECENT_MESSAGE_IDS {
            self.recent_message_ids.pop_front();
        }
        self.recent_message_ids.push_back(message_id.to_string());
    }

    /// Store an answer and leave the awaiting state.
    pub(crate) fn record(&mut self, step: StepId, value: String) {
        self.answers.insert(step.as_str().to_string(), value);
        self.clear_pending();
    }

    pub(crate) fn clear_pending(&mut self) {
        self.pending_choices = None;
        self.awaiting_reply = false;
        self.retries = 0;
    }

    /// Back to the first step with no answers. Identity and persistence
    /// bookkeeping survive.
    pub(crate) fn reset(&mut self) {
        self.cursor = Cursor::default();
        self.answers.clear();
        self.clear_pending();
    }
}
