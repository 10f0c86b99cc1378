//! The turn-scoped step sequencer.
//!
//! `Flow::run_turn` takes the persisted `SequencerState` and the user's reply
//! and returns the next state plus what to send back. It performs no I/O, so a
//! conversation can be resumed on any worker from its stored state alone.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FlowError;
use crate::reference::CountyDirectory;

use super::card::RichCard;
use super::choice::ChoiceSet;
use super::model::UserProfile;
use super::state::{Cursor, FlowVariant, SequencerState, StepId};
use super::steps::{self, Answer, CountyEntry, Entry, FlowSettings, Next, Prompt, Reply, StepContext};

/// What a turn sends back to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundTurn {
    /// Messages emitted before the prompt, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notices: Vec<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<ChoiceSet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card: Option<RichCard>,
    /// The conversation reached its end; no reply is expected.
    #[serde(default)]
    pub finished: bool,
}

/// Result of running one turn.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub state: SequencerState,
    pub outbound: OutboundTurn,
    /// Set when a step finalized the profile during this turn.
    pub profile: Option<UserProfile>,
}

/// An ordered step list bound to its reference data and settings.
#[derive(Debug, Clone)]
pub struct Flow {
    variant: FlowVariant,
    directory: Arc<CountyDirectory>,
    settings: FlowSettings,
}

impl Flow {
    /// Build a flow, checking its settings against the reference data.
    pub fn new(
        variant: FlowVariant,
        directory: Arc<CountyDirectory>,
        settings: FlowSettings,
    ) -> Result<Self, FlowError> {
        if let CountyEntry::Choices(names) = &settings.county_entry {
            if names.is_empty() {
                return Err(FlowError::Definition("county choice list is empty".into()));
            }
            if let Some(unknown) = names.iter().find(|n| directory.find_by_name(n).is_none()) {
                return Err(FlowError::Definition(format!(
                    "county choice {unknown} is not in the reference data"
                )));
            }
        }
        if settings.ward_choices.is_empty() {
            return Err(FlowError::Definition("ward choice list is empty".into()));
        }

        Ok(Self {
            variant,
            directory,
            settings,
        })
    }

    pub fn variant(&self) -> FlowVariant {
        self.variant
    }

    pub fn steps(&self) -> &'static [StepId] {
        self.variant.steps()
    }

    pub fn settings(&self) -> &FlowSettings {
        &self.settings
    }

    /// Fresh state for a new conversation on this flow.
    pub fn new_state(&self, conversation_id: impl Into<String>) -> SequencerState {
        SequencerState::new(conversation_id, self.variant)
    }

    fn index_of(&self, step: StepId) -> Result<usize, FlowError> {
        self.steps()
            .iter()
            .position(|s| *s == step)
            .ok_or_else(|| FlowError::UnknownStep {
                step: step.to_string(),
                flow: self.variant.to_string(),
            })
    }

    fn locate(&self, cursor: Cursor) -> Result<(usize, StepId), FlowError> {
        let len = self.steps().len();
        match cursor {
            Cursor::Step(idx) => self
                .steps()
                .get(idx)
                .map(|step| (idx, *step))
                .ok_or(FlowError::InvalidCursor { index: idx, len }),
            Cursor::Complete => Err(FlowError::InvalidCursor { index: len, len }),
        }
    }

    /// Run one turn.
    ///
    /// Non-prompting steps execute back to back until a step prompts or the
    /// flow terminates, so a turn emits at most one prompt. A reply that fails
    /// validation re-issues the pending prompt with retry wording and leaves
    /// the cursor and answers untouched.
    pub fn run_turn(
        &self,
        mut state: SequencerState,
        reply: Option<&str>,
    ) -> Result<TurnResult, FlowError> {
        if state.flow != self.variant {
            warn!(
                conversation_id = %state.conversation_id,
                stored = %state.flow,
                current = %self.variant,
                "Stored flow variant differs, restarting conversation"
            );
            state.flow = self.variant;
            state.reset();
        } else if state.is_complete() {
            debug!(conversation_id = %state.conversation_id, "Completed conversation resumed, restarting");
            state.reset();
        }

        let mut reply = reply;
        let mut notices: Vec<String> = Vec::new();
        let mut profile: Option<UserProfile> = None;
        let budget = self.steps().len() * 2 + 2;

        for _ in 0..budget {
            if state.is_complete() {
                return self.terminate(state, notices);
            }
            let (idx, step) = self.locate(state.cursor)?;

            if !state.awaiting_reply {
                let entry = {
                    let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
                    steps::enter(step, &ctx)?
                };
                match entry {
                    Entry::Prompt(prompt) => {
                        if steps::finalizes_profile(step) {
                            profile = Some(UserProfile::from_answers(&state.answers, step)?);
                        }
                        state.pending_choices = prompt.choices.clone();
                        state.awaiting_reply = true;
                        state.retries = 0;
                        debug!(conversation_id = %state.conversation_id, %step, "Prompting");
                        return Ok(suspend(state, notices, prompt, profile));
                    }
                    Entry::Say(text) => {
                        notices.push(text);
                        self.move_cursor(&mut state, idx, Next::Advance)?;
                    }
                    Entry::Finish => return self.terminate(state, notices),
                }
                continue;
            }

            let Some(text) = reply.take() else {
                // Nothing to consume: repeat the outstanding prompt as-is.
                let mut prompt = {
                    let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
                    steps::prompt(step, &ctx, false)?
                };
                prompt.choices = state.pending_choices.clone();
                return Ok(suspend(state, notices, prompt, profile));
            };

            let verdict = {
                let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
                match &state.pending_choices {
                    Some(offered) => match offered.recognize(text) {
                        Some(choice) => steps::accept(step, &ctx, Answer::Choice(choice))?,
                        None => Reply::Reject,
                    },
                    None => steps::accept(step, &ctx, Answer::Text(text))?,
                }
            };

            match verdict {
                Reply::Accept { value, notice, next } => {
                    match value {
                        Some(value) => state.record(step, value),
                        None => state.clear_pending(),
                    }
                    notices.extend(notice);
                    self.move_cursor(&mut state, idx, next)?;
                }
                Reply::Reject => {
                    state.retries += 1;
                    let strings = {
                        let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
                        ctx.strings()
                    };
                    debug!(
                        conversation_id = %state.conversation_id,
                        %step,
                        retries = state.retries,
                        "Reply rejected"
                    );

                    if self.settings.max_retries.is_some_and(|max| state.retries > max) {
                        warn!(
                            conversation_id = %state.conversation_id,
                            %step,
                            "Retry limit reached, restarting conversation"
                        );
                        notices.push(strings.retry_limit.to_string());
                        state.reset();
                        continue;
                    }

                    let mut prompt = {
                        let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
                        steps::prompt(step, &ctx, true)?
                    };
                    prompt.choices = state.pending_choices.clone();
                    return Ok(suspend(state, notices, prompt, profile));
                }
            }
        }

        Err(FlowError::Stalled { steps: budget })
    }

    fn move_cursor(
        &self,
        state: &mut SequencerState,
        idx: usize,
        next: Next,
    ) -> Result<(), FlowError> {
        match next {
            Next::Advance => {
                state.cursor = if idx + 1 < self.steps().len() {
                    Cursor::Step(idx + 1)
                } else {
                    Cursor::Complete
                };
            }
            Next::Stay => {}
            Next::Goto(step) => state.cursor = Cursor::Step(self.index_of(step)?),
            Next::Restart => state.reset(),
        }
        Ok(())
    }

    /// Finalize the profile, park the cursor and say goodbye.
    fn terminate(
        &self,
        mut state: SequencerState,
        notices: Vec<String>,
    ) -> Result<TurnResult, FlowError> {
        let profile = UserProfile::from_answers(&state.answers, StepId::Finish)?;
        let text = {
            let ctx = StepContext::new(&state.answers, &self.directory, &self.settings);
            ctx.strings().finished(&profile.name)
        };
        state.clear_pending();
        state.cursor = Cursor::Complete;
        debug!(conversation_id = %state.conversation_id, "Flow terminated");

        Ok(TurnResult {
            state,
            outbound: OutboundTurn {
                notices,
                text,
                choices: None,
                card: None,
                finished: true,
            },
            profile: Some(profile),
        })
    }
}

fn suspend(
    state: SequencerState,
    notices: Vec<String>,
    prompt: Prompt,
    profile: Option<UserProfile>,
) -> TurnResult {
    TurnResult {
        state,
        outbound: OutboundTurn {
            notices,
            text: prompt.text,
            choices: prompt.choices,
            card: prompt.card,
            finished: false,
        },
        profile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::model::Language;
    use crate::intake::prompts::{self, strings};

    const COUNTIES: &str = r#"[
        {"name": "Nairobi", "code": "047", "capital": "Nairobi City",
         "sub_counties": ["Westlands", "Kibra", "Langata"]},
        {"name": "Mombasa", "code": "001", "capital": "Mombasa City",
         "sub_counties": ["Changamwe", "Jomvu"]},
        {"name": "Kwale", "code": "002", "capital": "Kwale",
         "sub_counties": ["Matuga", "Kinango"]},
        {"name": "Kilifi", "code": "003", "capital": "Kilifi",
         "sub_counties": ["Malindi", "Rabai"]}
    ]"#;

    fn flow(variant: FlowVariant) -> Flow {
        flow_with(variant, FlowSettings::default())
    }

    fn flow_with(variant: FlowVariant, settings: FlowSettings) -> Flow {
        let dir = Arc::new(CountyDirectory::from_json(COUNTIES).unwrap());
        Flow::new(variant, dir, settings).unwrap()
    }

    /// Feed replies in order, returning every outbound turn.
    fn drive(flow: &Flow, state: &mut SequencerState, replies: &[&str]) -> Vec<TurnResult> {
        let mut out = Vec::new();
        for reply in replies {
            let result = flow.run_turn(state.clone(), Some(reply)).unwrap();
            *state = result.state.clone();
            out.push(result);
        }
        out
    }

    #[test]
    fn first_turn_prompts_for_language() {
        let flow = flow(FlowVariant::Extended);
        let result = flow.run_turn(flow.new_state("c1"), Some("hi")).unwrap();
        assert_eq!(result.outbound.text, prompts::LANGUAGE_PROMPT);
        assert_eq!(
            result.outbound.choices.as_ref().unwrap().labels(),
            vec!["English", "Kiswahili"]
        );
        assert_eq!(result.state.cursor, Cursor::Step(0));
        assert!(result.state.awaiting_reply);
        assert!(result.state.answers.is_empty());
    }

    #[test]
    fn name_confirm_runs_in_same_turn_as_county_prompt() {
        let flow = flow(FlowVariant::Extended);
        let mut state = flow.new_state("c1");
        let turns = drive(&flow, &mut state, &["hi", "English", "Amina"]);
        let last = &turns[2].outbound;
        assert_eq!(last.notices, vec!["Thanks Amina.".to_string()]);
        assert_eq!(last.text, strings(Language::En).county_prompt);
        assert!(last.choices.is_none());
        assert_eq!(state.current_step(), Some(StepId::County));
    }

    #[test]
    fn invalid_choice_retries_without_advancing() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(&flow, &mut state, &["hi", "1", "Amina", "Nairobi"]);
        let before = state.clone();

        let result = flow.run_turn(state.clone(), Some("Mars")).unwrap();
        assert_eq!(result.state.cursor, before.cursor);
        assert_eq!(result.state.answers, before.answers);
        assert!(result.state.answer(StepId::SubCounty).is_none());
        assert_eq!(result.state.pending_choices, before.pending_choices);
        assert_eq!(result.state.retries, 1);
        assert!(result.outbound.text.starts_with(strings(Language::En).choice_retry));
        assert_eq!(result.outbound.choices, before.pending_choices);
    }

    #[test]
    fn unknown_county_gets_distinct_retry_text() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        let turns = drive(&flow, &mut state, &["hi", "English", "Amina", "Gotham"]);
        let prompt = &turns[2].outbound.text;
        let retry = &turns[3].outbound.text;
        assert_ne!(prompt, retry);
        assert_eq!(retry, strings(Language::En).county_retry);
        assert!(state.answer(StepId::County).is_none());
        assert_eq!(state.current_step(), Some(StepId::County));
    }

    #[test]
    fn validation_uses_persisted_choice_set() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(&flow, &mut state, &["hi", "English", "Amina", "Nairobi"]);
        // A reply is checked against what was offered, not recomputed.
        state.pending_choices = Some(ChoiceSet::from_labels(["Kibra"]));
        let result = flow.run_turn(state.clone(), Some("Westlands")).unwrap();
        assert!(result.state.answer(StepId::SubCounty).is_none());
        let result = flow.run_turn(state, Some("Kibra")).unwrap();
        assert_eq!(result.state.answer(StepId::SubCounty), Some("Kibra"));
    }

    #[test]
    fn simple_flow_terminates_after_summary() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        let turns = drive(
            &flow,
            &mut state,
            &["hi", "English", "Amina", "Nairobi", "Westlands", "Sub 1"],
        );
        let summary = &turns[5];
        assert!(summary.outbound.text.contains("Amina"));
        assert_eq!(
            summary.outbound.choices.as_ref().unwrap().labels(),
            vec!["MAIN MENU", "GO BACK"]
        );
        let profile = summary.profile.as_ref().unwrap();
        assert_eq!(profile.ward, "Sub 1");

        let done = flow.run_turn(state.clone(), Some("MAIN MENU")).unwrap();
        assert!(done.outbound.finished);
        assert!(done.outbound.choices.is_none());
        assert_eq!(done.state.cursor, Cursor::Complete);
        assert!(done.state.pending_choices.is_none());
        assert_eq!(done.profile.unwrap().subcounty, "Westlands");
    }

    #[test]
    fn summary_go_back_restarts_intake() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(
            &flow,
            &mut state,
            &["hi", "English", "Amina", "Nairobi", "Westlands", "Sub 1"],
        );
        let result = flow.run_turn(state, Some("2")).unwrap();
        assert_eq!(result.outbound.notices, vec![strings(Language::En).restart.to_string()]);
        assert_eq!(result.outbound.text, prompts::LANGUAGE_PROMPT);
        assert!(result.state.answers.is_empty());
        assert_eq!(result.state.cursor, Cursor::Step(0));
    }

    #[test]
    fn news_sub_menu_yields_card_and_fallback_in_one_turn() {
        let flow = flow(FlowVariant::Extended);
        let mut state = flow.new_state("c1");
        let turns = drive(
            &flow,
            &mut state,
            &[
                "hi", "English", "Amina", "Nairobi", "Kibra", "ub", "MAIN MENU", "NEWS",
                "LATEST LEGAL NEWS",
            ],
        );
        let last = &turns.last().unwrap().outbound;
        let card = last.card.as_ref().expect("card payload");
        assert_eq!(card.actions.len(), 2);
        assert_eq!(
            last.choices.as_ref().unwrap().labels(),
            vec!["Links to legal news", "Go back"]
        );
        assert_eq!(state.current_step(), Some(StepId::ChooseAction));
    }

    #[test]
    fn choose_action_holds_then_returns_to_main_menu() {
        let flow = flow(FlowVariant::Extended);
        let mut state = flow.new_state("c1");
        drive(
            &flow,
            &mut state,
            &[
                "hi", "English", "Amina", "Nairobi", "Kibra", "ub", "MAIN MENU", "NEWS",
                "LATEST LEGAL NEWS",
            ],
        );
        let held = flow.run_turn(state.clone(), Some("Links to legal news")).unwrap();
        assert_eq!(held.state.cursor, state.cursor);
        assert!(held.outbound.card.is_some());
        assert!(held.outbound.notices[0].contains(&flow.settings().news_url));

        let back = flow.run_turn(held.state, Some("Go back")).unwrap();
        assert_eq!(back.state.current_step(), Some(StepId::MainMenu));
        assert!(back.outbound.text.contains("Amina"));
        assert_eq!(back.outbound.choices.unwrap().len(), 6);
    }

    #[test]
    fn unavailable_topic_re_prompts_main_menu() {
        let flow = flow(FlowVariant::Extended);
        let mut state = flow.new_state("c1");
        drive(
            &flow,
            &mut state,
            &["hi", "English", "Amina", "Nairobi", "Kibra", "ub", "MAIN MENU"],
        );
        let result = flow.run_turn(state.clone(), Some("SURVEY")).unwrap();
        assert_eq!(result.state.cursor, state.cursor);
        assert_eq!(result.outbound.notices.len(), 1);
        assert!(result.outbound.notices[0].starts_with("SURVEY"));
        assert_eq!(result.state.answer(StepId::MainMenu), Some("survey"));
    }

    #[test]
    fn kiswahili_turns_use_kiswahili_table() {
        let flow = flow(FlowVariant::Extended);
        let sw = strings(Language::Sw);
        let mut state = flow.new_state("c1");
        let turns = drive(
            &flow,
            &mut state,
            &["hi", "Kiswahili", "Juma", "Mombasa", "Jomvu", "Sub 1"],
        );
        assert_eq!(turns[1].outbound.text, sw.name_prompt);
        assert_eq!(turns[2].outbound.notices, vec![sw.thanks("Juma")]);
        assert_eq!(turns[2].outbound.text, sw.county_prompt);
        assert_eq!(turns[3].outbound.text, sw.subcounty_prompt);
        assert_eq!(turns[4].outbound.text, sw.ward_prompt);
        assert_eq!(turns[5].outbound.text, sw.summary("Juma"));
        assert_eq!(
            turns[5].outbound.choices.as_ref().unwrap().labels(),
            vec!["MAIN MENU", "RUDI NYUMA"]
        );
    }

    #[test]
    fn retry_limit_restarts_when_configured() {
        let flow = flow_with(
            FlowVariant::Simple,
            FlowSettings {
                max_retries: Some(1),
                ..FlowSettings::default()
            },
        );
        let mut state = flow.new_state("c1");
        let turns = drive(&flow, &mut state, &["hi", "English", "Amina", "Gotham", "Gotham"]);
        assert_eq!(turns[3].outbound.text, strings(Language::En).county_retry);
        let last = &turns[4].outbound;
        assert_eq!(last.notices, vec![strings(Language::En).retry_limit.to_string()]);
        assert_eq!(last.text, prompts::LANGUAGE_PROMPT);
        assert!(state.answers.is_empty());
    }

    #[test]
    fn no_reply_repeats_outstanding_prompt() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(&flow, &mut state, &["hi", "English", "Amina", "Nairobi"]);
        let result = flow.run_turn(state.clone(), None).unwrap();
        assert_eq!(result.state, state);
        assert_eq!(result.outbound.text, strings(Language::En).subcounty_prompt);
        assert_eq!(result.outbound.choices, state.pending_choices);
    }

    #[test]
    fn inconsistent_county_fails_the_turn() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(&flow, &mut state, &["hi", "English", "Amina"]);
        // Simulate a county accepted by an older reference data set.
        state.answers.insert("county".into(), "Atlantis".into());
        state.cursor = Cursor::Step(flow.index_of(StepId::SubCounty).unwrap());
        state.awaiting_reply = false;
        let err = flow.run_turn(state, Some("x")).unwrap_err();
        assert!(matches!(err, FlowError::ReferenceInconsistency { .. }));
    }

    #[test]
    fn completed_conversation_restarts_on_next_message() {
        let flow = flow(FlowVariant::Simple);
        let mut state = flow.new_state("c1");
        drive(
            &flow,
            &mut state,
            &["hi", "English", "Amina", "Nairobi", "Westlands", "Sub 1", "MAIN MENU"],
        );
        assert!(state.is_complete());
        let again = flow.run_turn(state, Some("hello")).unwrap();
        assert_eq!(again.outbound.text, prompts::LANGUAGE_PROMPT);
        assert!(again.state.answers.is_empty());
    }

    #[test]
    fn variant_mismatch_restarts() {
        let simple = flow(FlowVariant::Simple);
        let extended = flow(FlowVariant::Extended);
        let mut state = simple.new_state("c1");
        drive(&simple, &mut state, &["hi", "English"]);
        let result = extended.run_turn(state, Some("Amina")).unwrap();
        assert_eq!(result.state.flow, FlowVariant::Extended);
        assert_eq!(result.outbound.text, prompts::LANGUAGE_PROMPT);
    }

    #[test]
    fn county_choice_mode_validates_settings() {
        let dir = Arc::new(CountyDirectory::from_json(COUNTIES).unwrap());
        let bad = FlowSettings {
            county_entry: CountyEntry::Choices(vec!["Nairobi".into(), "Gotham".into()]),
            ..FlowSettings::default()
        };
        assert!(Flow::new(FlowVariant::Simple, Arc::clone(&dir), bad).is_err());

        let good = FlowSettings {
            county_entry: CountyEntry::Choices(vec![
                "Mombasa".into(),
                "Kwale".into(),
                "Kilifi".into(),
            ]),
            ..FlowSettings::default()
        };
        let flow = Flow::new(FlowVariant::Simple, dir, good).unwrap();
        let mut state = flow.new_state("c1");
        let turns = drive(&flow, &mut state, &["hi", "English", "Amina", "3"]);
        assert_eq!(turns[2].outbound.choices.as_ref().unwrap().len(), 3);
        assert_eq!(state.answer(StepId::County), Some("Kilifi"));
        assert_eq!(state.current_step(), Some(StepId::SubCounty));
    }
}
