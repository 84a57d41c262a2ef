//! Helpers shared by the unit tests: a host that records every callback and
//! shortcuts for building runners from inline script text.

use crate::ast::{CharacterLine, DialogueLine, LinkLine, QuoteLine, TagLine};
use crate::command::Command;
use crate::error::DialogueError;
use crate::parser::parse_collection;
use crate::runner::{DialogueHost, Runner, RunnerState, StepResult, Suspension};
use std::collections::HashMap;
use std::sync::Arc;

pub const TEST_PATH: &str = "dummy/test.dlg.md";

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    /// `IDENT: text`
    Line(String),
    Quote(String),
    Choices(Vec<String>),
    Tag(String),
    End,
}

#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Vec<Event>,
    /// Custom tags this host claims.
    pub known_tags: Vec<String>,
    /// Verdicts for custom condition methods, keyed by lowercase name.
    pub conditions: HashMap<String, bool>,
}

impl RecordingHost {
    pub fn spoken(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::Line(l) => Some(l.clone()),
                _ => None,
            })
            .collect()
    }
}

impl DialogueHost for RecordingHost {
    fn on_dialogue_start(&mut self, _state: &RunnerState) {
        self.events.push(Event::Start);
    }

    fn on_dialogue_line(&mut self, character: &CharacterLine, line: &DialogueLine) {
        self.events
            .push(Event::Line(format!("{}: {}", character.identifier, line.text)));
    }

    fn on_quote(&mut self, quote: &QuoteLine) {
        self.events.push(Event::Quote(quote.text.clone()));
    }

    fn on_dialogue_choices(&mut self, choices: &[LinkLine]) {
        self.events.push(Event::Choices(
            choices.iter().map(|c| c.display_name.clone()).collect(),
        ));
    }

    fn on_dialogue_end(&mut self) {
        self.events.push(Event::End);
    }

    fn handle_tag(&mut self, tag: &TagLine, _state: &mut RunnerState) -> Result<bool, DialogueError> {
        if !self.known_tags.iter().any(|t| tag.is(t)) {
            return Ok(false);
        }
        let recorded = if tag.args.is_empty() {
            tag.name.clone()
        } else {
            format!("{} {}", tag.name, tag.args)
        };
        self.events.push(Event::Tag(recorded));
        Ok(true)
    }

    fn evaluate_condition(&mut self, command: &Command, _state: &RunnerState) -> Option<bool> {
        self.conditions
            .get(&command.method_name.to_lowercase())
            .copied()
    }
}

pub fn runner_for(text: &str) -> Runner {
    let collection = parse_collection(text, TEST_PATH).unwrap();
    Runner::new(Arc::new(collection), None).unwrap()
}

/// State positioned at the first script of `text`.
pub fn state_for(text: &str) -> RunnerState {
    let collection = parse_collection(text, TEST_PATH).unwrap();
    RunnerState::new(Arc::new(collection), 0)
}

/// Plays to completion, acknowledging every line and answering choice
/// prompts with `picks` (matched against display names) in order.
pub fn play_through(
    runner: &mut Runner,
    host: &mut RecordingHost,
    picks: &[&str],
) -> Result<(), DialogueError> {
    let mut picks = picks.iter();
    loop {
        match runner.advance(host)? {
            StepResult::Complete => return Ok(()),
            StepResult::Suspended(Suspension::Dialogue { .. }) => runner.resume(),
            StepResult::Suspended(Suspension::Choices(choices)) => {
                let pick = picks.next().expect("ran out of picks");
                let choice = choices
                    .iter()
                    .find(|c| c.display_name.eq_ignore_ascii_case(pick))
                    .expect("no choice with that name");
                runner.select_choice(choice)?;
            }
            StepResult::Continue => unreachable!(),
        }
    }
}
