use crate::ast::TagLine;
use crate::error::DialogueError;
use crate::runner::{DialogueHost, RunnerState};
use log::{debug, error, warn};

const IF: &str = "if";
const ELSEIF: &str = "elseif";
const ELSE: &str = "else";
const ENDIF: &str = "endif";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTag {
    If,
    ElseIf,
    Else,
    EndIf,
    End,
    Set,
    Debug,
    Warn,
    Error,
    Throw,
    Todo,
}

impl BuiltinTag {
    pub fn from_name(name: &str) -> Option<Self> {
        let tag = match name.to_lowercase().as_str() {
            IF => BuiltinTag::If,
            ELSEIF => BuiltinTag::ElseIf,
            ELSE => BuiltinTag::Else,
            ENDIF => BuiltinTag::EndIf,
            "end" => BuiltinTag::End,
            "set" => BuiltinTag::Set,
            "debug" => BuiltinTag::Debug,
            "warn" => BuiltinTag::Warn,
            "error" => BuiltinTag::Error,
            "throw" => BuiltinTag::Throw,
            "todo" => BuiltinTag::Todo,
            _ => return None,
        };
        Some(tag)
    }
}

/// Runs a tag line. The cursor is left on the last line consumed; the runner
/// moves past it afterwards.
pub(crate) fn evaluate_tag(
    tag: &TagLine,
    state: &mut RunnerState,
    host: &mut dyn DialogueHost,
) -> Result<(), DialogueError> {
    let Some(builtin) = BuiltinTag::from_name(&tag.name) else {
        if !host.handle_tag(tag, state)? {
            warn!(
                "{}",
                state.logging_string(&format!("Unhandled tag #{}, skipping", tag.name))
            );
        }
        return Ok(());
    };

    match builtin {
        BuiltinTag::If => conditional(tag, state, host),
        BuiltinTag::ElseIf => {
            if std::mem::take(&mut state.elseif_pending) {
                conditional(tag, state, host)
            } else {
                // Fell out of a taken branch.
                skip_to_endif(state);
                Ok(())
            }
        }
        BuiltinTag::Else => {
            skip_to_endif(state);
            Ok(())
        }
        BuiltinTag::EndIf => Ok(()),
        BuiltinTag::End => {
            state.finish();
            Ok(())
        }
        BuiltinTag::Set => set(tag, state),
        BuiltinTag::Debug => {
            debug!("{}", state.logging_string(&tag.args));
            Ok(())
        }
        BuiltinTag::Warn => {
            warn!("{}", state.logging_string(&tag.args));
            Ok(())
        }
        BuiltinTag::Error => {
            error!("{}", state.logging_string(&tag.args));
            Ok(())
        }
        BuiltinTag::Throw => Err(DialogueError::InlineScript {
            location: state.location(),
            message: tag.args.clone(),
        }),
        BuiltinTag::Todo => {
            let msg = if tag.args.is_empty() {
                "TODO".to_string()
            } else {
                format!("TODO: {}", tag.args)
            };
            warn!("{}", state.logging_string(&msg));
            Ok(())
        }
    }
}

fn conditional(
    tag: &TagLine,
    state: &mut RunnerState,
    host: &mut dyn DialogueHost,
) -> Result<(), DialogueError> {
    state.elseif_pending = false;
    if state.evaluate_condition(&tag.args, host)? {
        return Ok(());
    }

    match state.skip_to_tag(&[ELSE, ELSEIF, ENDIF], &[IF], &[ENDIF]) {
        Some(found) if found.eq_ignore_ascii_case(ELSEIF) => {
            // Step back so the runner lands on the #elseif and evaluates it.
            state.cursor -= 1;
            state.elseif_pending = true;
        }
        Some(_) => {}
        None => warn!(
            "{}",
            state.logging_string(&format!(
                "Unterminated #{} block. Did you forget an #endif?",
                tag.name
            ))
        ),
    }
    Ok(())
}

fn skip_to_endif(state: &mut RunnerState) {
    if state.skip_to_tag(&[ENDIF], &[IF], &[ENDIF]).is_none() {
        warn!(
            "{}",
            state.logging_string("Unterminated block. Did you forget an #endif?")
        );
    }
}

fn set(tag: &TagLine, state: &mut RunnerState) -> Result<(), DialogueError> {
    let store = state.store()?;
    let args = tag.args.trim();
    let Some((name, value)) = args.split_once(char::is_whitespace) else {
        return Err(DialogueError::Arguments {
            location: state.location(),
            message: format!("#set expects a name and a value, got '{}'", tag.args),
        });
    };
    let value = strip_quotes(value.trim());
    store.borrow_mut().set_variable(name, Some(value.to_string()));
    debug!("{}", state.logging_string(&format!("Set {} = {}", name, value)));
    Ok(())
}

fn strip_quotes(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
