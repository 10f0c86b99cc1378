//! Multi-turn intake flow.
//!
//! A conversation picks a language, gives a name, then narrows down where
//! the user lives (county, sub-county, ward) before a summary. The extended
//! flow continues into a main menu, a news sub-menu and an action card.
//!
//! Each inbound message is one turn. `Flow::run_turn` advances the persisted
//! `SequencerState` as far as it can without user input and stops at the
//! next prompt; `IntakeManager` wraps that with loading and committing.

pub mod card;
pub mod choice;
pub mod manager;
pub mod model;
pub mod prompts;
pub mod sequencer;
pub mod state;
pub mod steps;

pub use card::{CardAction, RichCard};
pub use choice::{Choice, ChoiceSet};
pub use manager::{InboundTurn, IntakeManager, IntakeStatus};
pub use model::{Language, UserProfile};
pub use sequencer::{Flow, OutboundTurn, TurnResult};
pub use state::{Cursor, FlowVariant, SequencerState, StepId};
pub use steps::{CountyEntry, FlowSettings};
