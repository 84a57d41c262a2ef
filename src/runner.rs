use crate::ast::{CharacterLine, DialogueLine, Line, LinkLine, QuoteLine, TagLine};
use crate::command::{self, Command};
use crate::conditions;
use crate::error::{DialogueError, Location};
use crate::library::ScriptLibrary;
use crate::store::SharedVariableStore;
use crate::tags;
use crate::types::{split_script_path, Script, ScriptCollection};
use log::{debug, warn};
use std::sync::Arc;

/// Callbacks a presentation layer implements to play dialogue.
///
/// Suspension is not signalled through these callbacks: after
/// `on_dialogue_line` the runner waits for [`Runner::resume`], after
/// `on_dialogue_choices` it waits for [`Runner::select_choice`].
pub trait DialogueHost {
    fn on_dialogue_start(&mut self, _state: &RunnerState) {}

    fn on_dialogue_line(&mut self, character: &CharacterLine, line: &DialogueLine);

    fn on_quote(&mut self, _quote: &QuoteLine) {}

    fn on_dialogue_choices(&mut self, choices: &[LinkLine]);

    fn on_dialogue_end(&mut self) {}

    /// Handles a tag the built-in library does not know. Return `false` to
    /// leave it unhandled.
    fn handle_tag(&mut self, _tag: &TagLine, _state: &mut RunnerState) -> Result<bool, DialogueError> {
        Ok(false)
    }

    /// Evaluates a condition method the built-in library does not know.
    /// `None` means the method is unknown here too.
    fn evaluate_condition(&mut self, _command: &Command, _state: &RunnerState) -> Option<bool> {
        None
    }
}

#[derive(Clone, Debug)]
pub struct RunnerOptions {
    /// Jump straight to the only pending choice when a script ends.
    pub auto_follow_single_choice: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            auto_follow_single_choice: true,
        }
    }
}

/// What a playback is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Suspension {
    Dialogue {
        character: CharacterLine,
        line: DialogueLine,
    },
    Choices(Vec<LinkLine>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// A line ran without needing the host.
    Continue,
    Suspended(Suspension),
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
enum Status {
    NotStarted,
    Running,
    Suspended(Suspension),
    Complete,
}

/// Mutable state of one playback. Only the runner and the built-in libraries
/// move the cursor; hosts get it through [`DialogueHost`] callbacks.
pub struct RunnerState {
    collection: Arc<ScriptCollection>,
    script_idx: usize,
    /// Index of the line being run. May sit one or two past the end while a
    /// script is exhausted.
    pub(crate) cursor: usize,
    pub(crate) current_character: Option<CharacterLine>,
    pub(crate) choices: Vec<LinkLine>,
    pub(crate) complete: bool,
    pub(crate) variable_store: Option<SharedVariableStore>,
    /// The next line is an `#elseif` landed on by a failed condition.
    pub(crate) elseif_pending: bool,
}

impl RunnerState {
    pub(crate) fn new(collection: Arc<ScriptCollection>, script_idx: usize) -> Self {
        Self {
            collection,
            script_idx,
            cursor: 0,
            current_character: None,
            choices: Vec::new(),
            complete: false,
            variable_store: None,
            elseif_pending: false,
        }
    }

    pub fn collection(&self) -> &ScriptCollection {
        &self.collection
    }

    pub fn script(&self) -> &Script {
        &self.collection.scripts[self.script_idx]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current_character(&self) -> Option<&CharacterLine> {
        self.current_character.as_ref()
    }

    pub fn choices(&self) -> &[LinkLine] {
        &self.choices
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Ends the playback once the current step finishes.
    pub fn finish(&mut self) {
        self.complete = true;
    }

    pub fn variable_store(&self) -> Option<&SharedVariableStore> {
        self.variable_store.as_ref()
    }

    pub fn set_variable_store(&mut self, store: SharedVariableStore) {
        self.variable_store = Some(store);
    }

    pub(crate) fn store(&self) -> Result<SharedVariableStore, DialogueError> {
        self.variable_store
            .clone()
            .ok_or_else(|| DialogueError::MissingVariableStore {
                location: self.location(),
            })
    }

    pub fn location(&self) -> Location {
        let lines = &self.script().lines;
        let line_no = lines
            .get(self.cursor)
            .or_else(|| lines.last())
            .map(Line::line_no)
            .unwrap_or(0);
        Location {
            collection: self.collection.name.clone(),
            script: self.script().name.clone(),
            line_no,
        }
    }

    /// Prefixes `message` with the current location.
    pub fn logging_string(&self, message: &str) -> String {
        format!("{} {}", self.location(), message)
    }

    /// `this` names the running script; anything else resolves like a link.
    pub fn resolve_script_path(&self, relative: &str) -> String {
        let relative = relative.trim();
        if relative.eq_ignore_ascii_case("this") {
            return self.script().path.clone();
        }
        self.collection.resolve_relative_path(relative)
    }

    pub fn evaluate_condition(
        &self,
        expression: &str,
        host: &mut dyn DialogueHost,
    ) -> Result<bool, DialogueError> {
        let expr = command::parse_expression(expression).map_err(|source| DialogueError::Command {
            location: self.location(),
            source,
        })?;
        expr.evaluate(&mut |cmd: &Command| conditions::evaluate_command(self, cmd, host))
    }

    /// Moves the cursor forward to the next tag named in `targets` at the
    /// current nesting depth. Tags in `scope_start` / `scope_end` open and
    /// close nested scopes. Returns the tag name found, or `None` with the
    /// cursor at the end of the script.
    pub(crate) fn skip_to_tag(
        &mut self,
        targets: &[&str],
        scope_start: &[&str],
        scope_end: &[&str],
    ) -> Option<String> {
        let collection = self.collection.clone();
        let lines = &collection.scripts[self.script_idx].lines;
        let mut depth: i32 = 0;

        loop {
            self.cursor += 1;
            if self.cursor >= lines.len() {
                self.cursor = lines.len();
                return None;
            }

            let Some(tag) = lines[self.cursor].as_tag() else {
                continue;
            };
            let named = |names: &[&str]| names.iter().any(|n| tag.is(n));

            if depth == 0 && named(targets) {
                return Some(tag.name.clone());
            }
            if named(scope_start) {
                depth += 1;
            }
            if named(scope_end) {
                depth -= 1;
            }
        }
    }

    /// Switches to another script, recording the one being left as visited.
    pub(crate) fn start_script(&mut self, collection: Option<Arc<ScriptCollection>>, script_idx: usize) {
        self.mark_visited();
        if let Some(collection) = collection {
            self.collection = collection;
        }
        self.script_idx = script_idx;
        self.cursor = 0;
        self.current_character = None;
        self.choices.clear();
        self.elseif_pending = false;
    }

    fn mark_visited(&self) {
        if let Some(store) = &self.variable_store {
            let path = self.script().path.clone();
            store.borrow_mut().mark_script_visited(&path);
        }
    }
}

/// Steps a playback one line at a time, pausing on dialogue and choices.
pub struct Runner {
    state: RunnerState,
    status: Status,
    options: RunnerOptions,
    library: Option<Arc<dyn ScriptLibrary>>,
}

impl Runner {
    /// Prepares playback of `script_name`.
    pub fn new(collection: Arc<ScriptCollection>, script_name: Option<&str>) -> Result<Self, DialogueError> {
        if collection.scripts.is_empty() {
            return Err(DialogueError::EmptyCollection {
                collection: collection.name.clone(),
            });
        }
        // Without a name, start on the default script or else the first one.
        let script_idx = match script_name {
            None => collection.script_index(None).unwrap_or(0),
            Some(name) => collection.script_index(Some(name)).ok_or_else(|| {
                DialogueError::MissingScript {
                    path: format!("{}#{}", collection.path, name),
                    location: None,
                }
            })?,
        };

        Ok(Self {
            state: RunnerState::new(collection, script_idx),
            status: Status::NotStarted,
            options: RunnerOptions::default(),
            library: None,
        })
    }

    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_variable_store(mut self, store: SharedVariableStore) -> Self {
        self.state.set_variable_store(store);
        self
    }

    pub fn with_library(mut self, library: Arc<dyn ScriptLibrary>) -> Self {
        self.library = Some(library);
        self
    }

    pub fn state(&self) -> &RunnerState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut RunnerState {
        &mut self.state
    }

    pub fn is_complete(&self) -> bool {
        self.status == Status::Complete
    }

    pub fn pending(&self) -> Option<&Suspension> {
        match &self.status {
            Status::Suspended(s) => Some(s),
            _ => None,
        }
    }

    /// Steps until the playback suspends or completes.
    pub fn advance(&mut self, host: &mut dyn DialogueHost) -> Result<StepResult, DialogueError> {
        loop {
            match self.step(host)? {
                StepResult::Continue => continue,
                other => return Ok(other),
            }
        }
    }

    /// Runs at most one line. While suspended this returns the same
    /// suspension without doing anything. Any error ends the playback.
    pub fn step(&mut self, host: &mut dyn DialogueHost) -> Result<StepResult, DialogueError> {
        match self.step_inner(host) {
            Ok(res) => Ok(res),
            Err(err) => {
                if let Some(location) = err.location() {
                    debug!("Playback halted at {}", location);
                }
                self.halt();
                Err(err)
            }
        }
    }

    fn step_inner(&mut self, host: &mut dyn DialogueHost) -> Result<StepResult, DialogueError> {
        match &self.status {
            Status::Complete => return Ok(StepResult::Complete),
            Status::Suspended(s) => return Ok(StepResult::Suspended(s.clone())),
            Status::NotStarted => {
                host.on_dialogue_start(&self.state);
                self.status = Status::Running;
            }
            Status::Running => {}
        }

        if self.state.complete {
            return Ok(self.finish(host));
        }

        let Some(line) = self.state.script().lines.get(self.state.cursor).cloned() else {
            return self.script_exhausted(host);
        };

        let res = self.dispatch(line, host)?;
        self.state.cursor += 1;

        if self.state.complete && res == StepResult::Continue {
            return Ok(self.finish(host));
        }
        Ok(res)
    }

    fn dispatch(&mut self, line: Line, host: &mut dyn DialogueHost) -> Result<StepResult, DialogueError> {
        match line {
            Line::Character(character) => {
                self.state.current_character = Some(character);
                Ok(StepResult::Continue)
            }
            Line::Dialogue(line) => {
                let Some(character) = self.state.current_character.clone() else {
                    return Err(DialogueError::MissingCharacter {
                        location: self.state.location(),
                    });
                };
                host.on_dialogue_line(&character, &line);
                Ok(self.suspend(Suspension::Dialogue { character, line }))
            }
            Line::Link(link) => {
                self.state.choices.push(link);
                Ok(StepResult::Continue)
            }
            Line::Quote(quote) => {
                host.on_quote(&quote);
                Ok(StepResult::Continue)
            }
            Line::Tag(tag) => {
                tags::evaluate_tag(&tag, &mut self.state, host)?;
                Ok(StepResult::Continue)
            }
        }
    }

    fn script_exhausted(&mut self, host: &mut dyn DialogueHost) -> Result<StepResult, DialogueError> {
        match self.state.choices.len() {
            0 => Ok(self.finish(host)),
            1 if self.options.auto_follow_single_choice => {
                let link = self.state.choices[0].clone();
                self.follow_link(&link)?;
                Ok(StepResult::Continue)
            }
            _ => {
                let choices = self.state.choices.clone();
                host.on_dialogue_choices(&choices);
                Ok(self.suspend(Suspension::Choices(choices)))
            }
        }
    }

    fn suspend(&mut self, suspension: Suspension) -> StepResult {
        self.status = Status::Suspended(suspension.clone());
        StepResult::Suspended(suspension)
    }

    /// Acknowledges the pending dialogue line.
    pub fn resume(&mut self) {
        match &self.status {
            Status::Suspended(Suspension::Dialogue { .. }) => self.status = Status::Running,
            _ => warn!(
                "{}",
                self.state
                    .logging_string("resume() called without a pending dialogue line")
            ),
        }
    }

    /// Picks one of the offered choices and jumps to its script. Choosing a
    /// link that was not offered is allowed but logged.
    pub fn select_choice(&mut self, choice: &LinkLine) -> Result<(), DialogueError> {
        match &self.status {
            Status::Suspended(Suspension::Choices(offered)) => {
                if !offered.contains(choice) {
                    warn!(
                        "{}",
                        self.state.logging_string(&format!(
                            "Selected choice '{}' was not among the offered choices",
                            choice.target
                        ))
                    );
                }
            }
            _ => {
                warn!(
                    "{}",
                    self.state
                        .logging_string("select_choice() called without pending choices")
                );
                return Ok(());
            }
        }

        if let Err(err) = self.follow_link(choice) {
            self.halt();
            return Err(err);
        }
        self.status = Status::Running;
        Ok(())
    }

    pub fn select_choice_index(&mut self, idx: usize) -> Result<(), DialogueError> {
        let choice = match &self.status {
            Status::Suspended(Suspension::Choices(offered)) => offered.get(idx).cloned(),
            _ => None,
        };
        match choice {
            Some(choice) => self.select_choice(&choice),
            None => Err(DialogueError::Arguments {
                location: self.state.location(),
                message: format!("No pending choice at index {}", idx),
            }),
        }
    }

    fn follow_link(&mut self, link: &LinkLine) -> Result<(), DialogueError> {
        let path = self.state.resolve_script_path(&link.target);
        let (file, name) = split_script_path(&path);
        let name = (!name.is_empty()).then_some(name);
        let location = Location {
            line_no: link.line_no,
            ..self.state.location()
        };
        let missing = || DialogueError::MissingScript {
            path: path.clone(),
            location: Some(location.clone()),
        };

        if !self.state.script().links_to(&path) {
            warn!(
                "{} Link to {} is not in the link table of script '{}'",
                location,
                path,
                self.state.script().name
            );
        }

        if self.state.collection.is_path(file) {
            let idx = self.state.collection.script_index(name).ok_or_else(missing)?;
            debug!("{}", self.state.logging_string(&format!("Jumping to {}", path)));
            self.state.start_script(None, idx);
            return Ok(());
        }

        let library = self.library.as_ref().ok_or_else(missing)?;
        let collection = library.collection(file).map_err(|err| match err {
            DialogueError::MissingScript { .. } => missing(),
            other => other,
        })?;
        let idx = collection.script_index(name).ok_or_else(missing)?;
        debug!("{}", self.state.logging_string(&format!("Jumping to {}", path)));
        self.state.start_script(Some(collection), idx);
        Ok(())
    }

    fn finish(&mut self, host: &mut dyn DialogueHost) -> StepResult {
        self.state.mark_visited();
        self.state.complete = true;
        self.status = Status::Complete;
        host.on_dialogue_end();
        StepResult::Complete
    }

    fn halt(&mut self) {
        self.state.complete = true;
        self.status = Status::Complete;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryVariableStore, VariableStore};
    use crate::test_support::{play_through, runner_for, Event, RecordingHost};
    use crate::library::MemoryLibrary;
    use crate::parser::parse_collection;

    #[test]
    fn suspends_on_each_dialogue_line() {
        let mut runner = runner_for("JOHN\nHello\n> aside\nJOHN - happy\nBye\n");
        let mut host = RecordingHost::default();

        match runner.advance(&mut host).unwrap() {
            StepResult::Suspended(Suspension::Dialogue { character, line }) => {
                assert_eq!(character.identifier, "JOHN");
                assert_eq!(line.text, "Hello");
            }
            other => panic!("unexpected {:?}", other),
        }
        // Stepping again without resuming changes nothing.
        assert!(matches!(runner.step(&mut host).unwrap(), StepResult::Suspended(_)));
        assert_eq!(host.spoken(), vec!["JOHN: Hello"]);

        runner.resume();
        assert!(matches!(runner.advance(&mut host).unwrap(), StepResult::Suspended(_)));
        runner.resume();
        assert_eq!(runner.advance(&mut host).unwrap(), StepResult::Complete);
        assert!(runner.is_complete());

        assert_eq!(
            host.events,
            vec![
                Event::Start,
                Event::Line("JOHN: Hello".into()),
                Event::Quote("aside".into()),
                Event::Line("JOHN: Bye".into()),
                Event::End,
            ]
        );
    }

    #[test]
    fn dialogue_without_character_fails() {
        let mut runner = runner_for("\n\nHello there\n");
        let mut host = RecordingHost::default();
        let err = runner.advance(&mut host).unwrap_err();
        match err {
            DialogueError::MissingCharacter { location } => {
                assert_eq!(location.line_no, 3);
                assert_eq!(location.collection, "test.dlg");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(runner.is_complete());
        assert!(!host.events.contains(&Event::End));
    }

    #[test]
    fn multiple_links_offer_choices() {
        let text = "# A\nJOHN\nPick one\n[[#A]]\n[[#B|Go to B]]\n# B\nJOHN\nWelcome to B\n";
        let store = MemoryVariableStore::new().shared();
        let mut runner = runner_for(text).with_variable_store(store.clone());
        let mut host = RecordingHost::default();

        assert!(matches!(runner.advance(&mut host).unwrap(), StepResult::Suspended(_)));
        runner.resume();

        let offered = match runner.advance(&mut host).unwrap() {
            StepResult::Suspended(Suspension::Choices(choices)) => choices,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(offered.len(), 2);
        assert_eq!(offered[1].display_name, "Go to B");
        assert_eq!(runner.state().choices().len(), 2);

        runner.select_choice(&offered[1]).unwrap();
        assert_eq!(runner.state().script().name, "B");
        assert_eq!(runner.state().cursor(), 0);
        assert!(runner.state().choices().is_empty());
        assert!(runner.state().current_character().is_none());
        assert_eq!(store.borrow().visit_count("dummy/test.dlg.md#A"), 1);

        assert!(matches!(runner.advance(&mut host).unwrap(), StepResult::Suspended(_)));
        assert_eq!(host.spoken(), vec!["JOHN: Pick one", "JOHN: Welcome to B"]);
        runner.resume();
        assert_eq!(runner.advance(&mut host).unwrap(), StepResult::Complete);
        assert_eq!(store.borrow().visit_count("dummy/test.dlg.md#B"), 1);
    }

    #[test]
    fn single_link_is_followed_automatically() {
        let text = "# A\n[[#B]]\n# B\nJOHN\nArrived\n";
        let mut runner = runner_for(text);
        let mut host = RecordingHost::default();
        assert!(matches!(runner.advance(&mut host).unwrap(), StepResult::Suspended(_)));
        assert_eq!(runner.state().script().name, "B");
        assert!(!host.events.iter().any(|e| matches!(e, Event::Choices(_))));
    }

    #[test]
    fn single_link_can_be_offered_instead() {
        let text = "# A\n[[#B]]\n# B\nJOHN\nArrived\n";
        let mut runner = runner_for(text).with_options(RunnerOptions {
            auto_follow_single_choice: false,
        });
        let mut host = RecordingHost::default();
        match runner.advance(&mut host).unwrap() {
            StepResult::Suspended(Suspension::Choices(choices)) => assert_eq!(choices.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
        runner.select_choice_index(0).unwrap();
        assert_eq!(runner.state().script().name, "B");
        assert!(runner.select_choice_index(3).is_err());
    }

    #[test]
    fn unknown_link_target_is_fatal() {
        let text = "# A\n[[#Nowhere]]\n[[#B]]\n# B\n";
        let mut runner = runner_for(text);
        let mut host = RecordingHost::default();
        let choices = match runner.advance(&mut host).unwrap() {
            StepResult::Suspended(Suspension::Choices(choices)) => choices,
            other => panic!("unexpected {:?}", other),
        };
        let err = runner.select_choice(&choices[0]).unwrap_err();
        assert!(err
            .to_string()
            .starts_with("[test.dlg/A @ 2] Could not find script"));
        assert_eq!(err.location().map(|l| l.line_no), Some(2));
        match err {
            DialogueError::MissingScript { path, location } => {
                assert_eq!(path, "dummy/test.dlg.md#Nowhere");
                let location = location.unwrap();
                assert_eq!(location.script, "A");
                assert_eq!(location.line_no, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(runner.is_complete());
    }

    #[test]
    fn choices_outside_the_offered_list_are_still_followed() {
        let text = "# A\n[[#B]]\n[[#C]]\n# B\nJOHN\nIn B\n# C\nJOHN\nIn C\n# Hidden\nJOHN\nFound me\n";
        let mut runner = runner_for(text);
        let mut host = RecordingHost::default();
        assert!(matches!(
            runner.advance(&mut host).unwrap(),
            StepResult::Suspended(Suspension::Choices(_))
        ));

        let elsewhere = LinkLine {
            raw: "[[#Hidden]]".into(),
            line_no: 99,
            target: "#Hidden".into(),
            display_name: "Hidden".into(),
        };
        runner.select_choice(&elsewhere).unwrap();
        assert_eq!(runner.state().script().name, "Hidden");

        runner.advance(&mut host).unwrap();
        assert_eq!(host.spoken(), vec!["JOHN: Found me"]);
    }

    #[test]
    fn links_into_other_collections_use_the_library() {
        let mut library = MemoryLibrary::new();
        library
            .parse("# Stall\nMERCHANT\nWares for sale!\n", "dummy/market.md")
            .unwrap();

        let text = "JOHN\nLet's shop\n[[market#Stall]]\n";
        let mut runner = runner_for(text).with_library(Arc::new(library));
        let mut host = RecordingHost::default();
        play_through(&mut runner, &mut host, &[]).unwrap();

        assert_eq!(host.spoken(), vec!["JOHN: Let's shop", "MERCHANT: Wares for sale!"]);
        assert_eq!(runner.state().collection().name, "market");
    }

    #[test]
    fn links_into_other_collections_need_a_library() {
        let mut runner = runner_for("[[market#Stall]]\n");
        let mut host = RecordingHost::default();
        let err = runner.advance(&mut host).unwrap_err();
        assert!(matches!(err, DialogueError::MissingScript { ref path, location: Some(_) } if path == "dummy/market.md#Stall"));
    }

    #[test]
    fn visited_this_tracks_completed_passes() {
        let text = "\
# Loop
#if visited(this)
    JOHN
    Second time
#else
    JOHN
    First time
#endif
[[#Loop]]
[[#Exit]]
# Exit
JOHN
Bye
";
        let store = MemoryVariableStore::new().shared();
        let mut runner = runner_for(text).with_variable_store(store.clone());
        let mut host = RecordingHost::default();
        play_through(&mut runner, &mut host, &["Loop", "Exit"]).unwrap();

        assert_eq!(
            host.spoken(),
            vec!["JOHN: First time", "JOHN: Second time", "JOHN: Bye"]
        );
        assert_eq!(store.borrow().visit_count("dummy/test.dlg.md#Loop"), 2);
        assert_eq!(store.borrow().visit_count("dummy/test.dlg.md#Exit"), 1);
    }

    #[test]
    fn runner_starts_requested_script() {
        let collection = Arc::new(parse_collection("# A\nJOHN\nA\n# B\nJOHN\nB\n", "x.md").unwrap());
        let runner = Runner::new(collection.clone(), Some("b")).unwrap();
        assert_eq!(runner.state().script().name, "B");

        let runner = Runner::new(collection.clone(), None).unwrap();
        assert_eq!(runner.state().script().name, "A");

        let err = Runner::new(collection, Some("C")).err().unwrap();
        assert!(matches!(err, DialogueError::MissingScript { ref path, location: None } if path == "x.md#C"));
    }

    #[test]
    fn store_is_shared_with_the_host() {
        let store = MemoryVariableStore::new().shared();
        let mut runner = runner_for("#set mood happy\n").with_variable_store(store.clone());
        let mut host = RecordingHost::default();
        assert_eq!(runner.advance(&mut host).unwrap(), StepResult::Complete);
        assert_eq!(store.borrow().get_variable("MOOD").as_deref(), Some("happy"));
    }
}
