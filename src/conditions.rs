//! Built-in condition methods for `#if` / `#elseif` expressions.
//!
//! A method either returns a verdict, returns no verdict (logged and read as
//! `false`) or fails the playback with a [`DialogueError`].

use crate::command::{Argument, Command};
use crate::error::DialogueError;
use crate::runner::{DialogueHost, RunnerState};
use crate::store::VariableStore;
use log::warn;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Visited,
    NotVisited,
    Equal,
    NotEqual,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl Builtin {
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name.trim().to_lowercase().as_str() {
            "visited" => Builtin::Visited,
            "notvisited" => Builtin::NotVisited,
            "eq" | "equal" | "equals" => Builtin::Equal,
            "neq" | "notequal" | "notequals" => Builtin::NotEqual,
            "gt" | "greaterthan" => Builtin::GreaterThan,
            "gte" => Builtin::GreaterOrEqual,
            "lt" | "lessthan" => Builtin::LessThan,
            "lte" => Builtin::LessOrEqual,
            _ => return None,
        };
        Some(builtin)
    }

    pub fn evaluate(self, state: &RunnerState, cmd: &Command) -> Result<Option<bool>, DialogueError> {
        match self {
            Builtin::Visited => visited(state, cmd),
            Builtin::NotVisited => not_visited(state, cmd),
            Builtin::Equal => equal(state, cmd),
            Builtin::NotEqual => Ok(equal(state, cmd)?.map(|v| !v)),
            Builtin::GreaterThan => Ok(ordering(state, cmd)?.map(|o| o == Ordering::Greater)),
            Builtin::GreaterOrEqual => Ok(ordering(state, cmd)?.map(|o| o != Ordering::Less)),
            Builtin::LessThan => Ok(ordering(state, cmd)?.map(|o| o == Ordering::Less)),
            Builtin::LessOrEqual => Ok(ordering(state, cmd)?.map(|o| o != Ordering::Greater)),
        }
    }
}

/// Evaluates one command of a condition: built-ins first, then the host.
pub(crate) fn evaluate_command(
    state: &RunnerState,
    cmd: &Command,
    host: &mut dyn DialogueHost,
) -> Result<bool, DialogueError> {
    let verdict = match Builtin::from_name(&cmd.method_name) {
        Some(builtin) => builtin.evaluate(state, cmd)?,
        None => match host.evaluate_condition(cmd, state) {
            Some(v) => Some(v),
            None => {
                warn!(
                    "{}",
                    state.logging_string(&format!(
                        "Unknown condition '{}', treating it as false",
                        cmd.method_name
                    ))
                );
                return Ok(false);
            }
        },
    };

    Ok(verdict.unwrap_or_else(|| {
        warn!(
            "{}",
            state.logging_string(&format!("'{}' could not be decided, treating it as false", cmd))
        );
        false
    }))
}

/// Orders two values: as integers when both parse, then as decimals, and
/// otherwise only case-insensitive equality is known.
pub fn compare(left: &str, right: &str) -> Option<Ordering> {
    let (left, right) = (left.trim(), right.trim());
    if let (Ok(l), Ok(r)) = (left.parse::<i64>(), right.parse::<i64>()) {
        return Some(l.cmp(&r));
    }
    if let (Some(l), Some(r)) = (parse_decimal(left), parse_decimal(right)) {
        return l.partial_cmp(&r);
    }
    (left.to_lowercase() == right.to_lowercase()).then_some(Ordering::Equal)
}

fn parse_decimal(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn arguments_error(state: &RunnerState, message: String) -> DialogueError {
    DialogueError::Arguments {
        location: state.location(),
        message,
    }
}

fn visit_count(state: &RunnerState, cmd: &Command) -> Result<u32, DialogueError> {
    let Some(path) = cmd.argument(0) else {
        return Err(arguments_error(
            state,
            format!("{}() needs a script path", cmd.method_name),
        ));
    };
    let store = state.store()?;
    let count = store.borrow().visit_count(&state.resolve_script_path(path));
    Ok(count)
}

fn visited(state: &RunnerState, cmd: &Command) -> Result<Option<bool>, DialogueError> {
    let min = match cmd.argument(1) {
        None => 1,
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            arguments_error(
                state,
                format!("Expected the second argument of visited() to be an integer, got '{}'", raw),
            )
        })?,
    };
    if min < 1 {
        return Err(arguments_error(
            state,
            format!(
                "visited() needs a visit count of at least 1, got {}. Use notvisited() instead",
                min
            ),
        ));
    }
    let count = visit_count(state, cmd)?;
    Ok(Some(i64::from(count) >= min))
}

fn not_visited(state: &RunnerState, cmd: &Command) -> Result<Option<bool>, DialogueError> {
    Ok(Some(visit_count(state, cmd)? == 0))
}

fn expect_pair(state: &RunnerState, cmd: &Command) -> Result<(), DialogueError> {
    if cmd.arguments.len() != 2 {
        return Err(arguments_error(
            state,
            format!(
                "{}() takes exactly 2 arguments, got {}",
                cmd.method_name,
                cmd.arguments.len()
            ),
        ));
    }
    Ok(())
}

/// The first argument names a variable. The second is a quoted literal, a
/// number, or another variable name.
fn equal(state: &RunnerState, cmd: &Command) -> Result<Option<bool>, DialogueError> {
    expect_pair(state, cmd)?;
    let store = state.store()?;
    let store = store.borrow();

    let Some(left) = store.get_variable(&cmd.arguments[0].text) else {
        return Ok(Some(false));
    };
    let right = &cmd.arguments[1];
    if right.quoted {
        return Ok(Some(left == right.text));
    }
    if parse_decimal(right.text.trim()).is_some() {
        return Ok(Some(compare(&left, &right.text) == Some(Ordering::Equal)));
    }
    match store.get_variable(&right.text) {
        Some(other) => Ok(Some(compare(&left, &other) == Some(Ordering::Equal))),
        None => Ok(Some(false)),
    }
}

fn ordering(state: &RunnerState, cmd: &Command) -> Result<Option<Ordering>, DialogueError> {
    expect_pair(state, cmd)?;
    let store = state.store()?;
    let store = store.borrow();
    let left = operand(&*store, &cmd.arguments[0]);
    let right = operand(&*store, &cmd.arguments[1]);
    Ok(compare(&left, &right))
}

/// Unquoted operands naming a variable use its value.
fn operand(store: &dyn VariableStore, arg: &Argument) -> String {
    if arg.quoted {
        return arg.text.clone();
    }
    store
        .get_variable(&arg.text)
        .unwrap_or_else(|| arg.text.clone())
}
