use std::fmt;
use std::path::PathBuf;

/// Where in a playback something happened. Displays as the standard
/// `[collection/script @ line]` diagnostic prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub collection: String,
    pub script: String,
    pub line_no: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{} @ {}]", self.collection, self.script, self.line_no)
    }
}

/// Syntax errors raised while lexing or parsing a command expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to parse command string '{command}' - No method name could be determined before opening bracket.")]
    MissingMethodName { command: String },

    #[error("Failed to parse command string '{command}' - Method name contains whitespace.")]
    WhitespaceInMethodName { command: String },

    #[error("Failed to parse command string '{command}' - Encountered a character after parsing quoted argument '{argument}'.")]
    TextAfterQuotedArgument { command: String, argument: String },

    #[error("Failed to parse command string '{command}' - Either the string is lacking a closing bracket, or the command string is malformed in an unparsable fashion.")]
    Unclosed { command: String },

    #[error("Failed to parse command expression '{command}' - A parenthesised group is never closed.")]
    UnclosedGroup { command: String },

    #[error("Failed to parse command expression '{command}' - Expected a command but found nothing.")]
    EmptyExpression { command: String },

    #[error("Failed to parse command expression '{command}' - Unexpected text '{rest}'.")]
    TrailingText { command: String, rest: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DialogueError {
    #[error("A duplicate script with name '{script}' was encountered while parsing collection '{collection}'. Please change the name of one of the scripts.")]
    DuplicateScript { collection: String, script: String },

    #[error("Link target '{raw}' on line {line_no} contained no text!")]
    EmptyLinkTarget { raw: String, line_no: usize },

    #[error("Invalid condition on line {line_no} of collection '{collection}': {source}")]
    InvalidCondition {
        collection: String,
        line_no: usize,
        #[source]
        source: CommandError,
    },

    #[error("{location} {source}")]
    Command {
        location: Location,
        #[source]
        source: CommandError,
    },

    #[error("{location} Tried to output a dialogue line but no character was set.")]
    MissingCharacter { location: Location },

    #[error("{}Could not find script at path '{path}'.", location_prefix(.location))]
    MissingScript {
        path: String,
        /// Set when the path came from a link followed during playback.
        location: Option<Location>,
    },

    #[error("Script collection '{collection}' contains no scripts.")]
    EmptyCollection { collection: String },

    #[error("{location} No variable store has been attached! Attach one to the runner before playing scripts that read or write variables.")]
    MissingVariableStore { location: Location },

    #[error("{location} {message}")]
    Arguments { location: Location, message: String },

    #[error("{location} {message}")]
    InlineScript { location: Location, message: String },

    #[error("Failed to read script file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DialogueError {
    /// The playback location attached to runtime errors.
    pub fn location(&self) -> Option<&Location> {
        match self {
            DialogueError::Command { location, .. }
            | DialogueError::MissingCharacter { location }
            | DialogueError::MissingVariableStore { location }
            | DialogueError::Arguments { location, .. }
            | DialogueError::InlineScript { location, .. } => Some(location),
            DialogueError::MissingScript { location, .. } => location.as_ref(),
            _ => None,
        }
    }
}

fn location_prefix(location: &Option<Location>) -> String {
    location
        .as_ref()
        .map(|l| format!("{} ", l))
        .unwrap_or_default()
}
