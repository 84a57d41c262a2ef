//! Command expressions as used by `#if` and `#elseif`.
//!
//! A command is a call such as `eq(name, "John")`. Commands combine with the
//! case-insensitive joiners `and` / `or` and with parentheses:
//!
//! ```text
//! visited(#Intro) and (eq(mood, happy) or gt(gold, 10))
//! ```
//!
//! Joiners bind to everything on their right, so `a() and b() or c()` reads
//! as `a() and (b() or c())`. Every group holds exactly two operands.

use crate::error::CommandError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Argument {
    pub text: String,
    /// Written as `"..."` in the source. Quoted text is never trimmed.
    pub quoted: bool,
}

impl Argument {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: false,
        }
    }

    pub fn quoted(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quoted: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub method_name: String,
    pub arguments: Vec<Argument>,
}

impl Command {
    pub fn argument(&self, idx: usize) -> Option<&str> {
        self.arguments.get(idx).map(|a| a.text.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandExpr {
    Command(Command),
    Group {
        left: Box<CommandExpr>,
        right: Box<CommandExpr>,
        join: Join,
    },
}

impl CommandExpr {
    /// Evaluates the tree left to right. The right operand of a group is only
    /// evaluated when the left one does not already decide the result.
    pub fn evaluate<E, F>(&self, eval: &mut F) -> Result<bool, E>
    where
        F: FnMut(&Command) -> Result<bool, E>,
    {
        match self {
            CommandExpr::Command(cmd) => eval(cmd),
            CommandExpr::Group { left, right, join } => {
                let res = left.evaluate(eval)?;
                match (join, res) {
                    (Join::And, false) => Ok(false),
                    (Join::Or, true) => Ok(true),
                    _ => right.evaluate(eval),
                }
            }
        }
    }
}

impl fmt::Display for Argument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quoted {
            write!(f, "\"{}\"", self.text.replace('"', "\\\""))
        } else {
            f.write_str(&self.text)
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.method_name)?;
        for (idx, arg) in self.arguments.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", arg)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Join::And => f.write_str("and"),
            Join::Or => f.write_str("or"),
        }
    }
}

impl fmt::Display for CommandExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandExpr::Command(cmd) => write!(f, "{}", cmd),
            CommandExpr::Group { left, right, join } => {
                write!(f, "({} {} {})", left, join, right)
            }
        }
    }
}

/// Parses a single command call. Anything after the closing bracket is ignored.
pub fn parse_command(input: &str) -> Result<Command, CommandError> {
    let chars: Vec<char> = input.chars().collect();
    lex_command(&chars, 0, input).map(|(cmd, _)| cmd)
}

/// Parses a full `and` / `or` expression.
pub fn parse_expression(input: &str) -> Result<CommandExpr, CommandError> {
    let mut parser = ExprParser {
        source: input,
        chars: input.chars().collect(),
        pos: 0,
    };
    let expr = parser.expression()?;
    parser.skip_whitespace();
    if parser.pos < parser.chars.len() {
        return Err(CommandError::TrailingText {
            command: input.to_string(),
            rest: parser.chars[parser.pos..].iter().collect(),
        });
    }
    Ok(expr)
}

struct ExprParser<'a> {
    source: &'a str,
    chars: Vec<char>,
    pos: usize,
}

impl ExprParser<'_> {
    fn expression(&mut self) -> Result<CommandExpr, CommandError> {
        self.skip_whitespace();
        let left = self.operand()?;
        self.skip_whitespace();
        match self.joiner() {
            Some(join) => {
                let right = self.expression()?;
                Ok(CommandExpr::Group {
                    left: Box::new(left),
                    right: Box::new(right),
                    join,
                })
            }
            None => Ok(left),
        }
    }

    fn operand(&mut self) -> Result<CommandExpr, CommandError> {
        match self.chars.get(self.pos) {
            None | Some(')') => Err(CommandError::EmptyExpression {
                command: self.source.to_string(),
            }),
            Some('(') => {
                self.pos += 1;
                let inner = self.expression()?;
                self.skip_whitespace();
                if self.chars.get(self.pos) != Some(&')') {
                    return Err(CommandError::UnclosedGroup {
                        command: self.source.to_string(),
                    });
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(_) => {
                let (cmd, next) = lex_command(&self.chars, self.pos, self.source)?;
                self.pos = next;
                Ok(CommandExpr::Command(cmd))
            }
        }
    }

    /// Consumes `and ` / `or ` (any case, followed by whitespace).
    fn joiner(&mut self) -> Option<Join> {
        for (word, join) in [("and", Join::And), ("or", Join::Or)] {
            let end = self.pos + word.len();
            let Some(next) = self.chars.get(end) else {
                continue;
            };
            let candidate: String = self.chars[self.pos..end].iter().collect();
            if candidate.eq_ignore_ascii_case(word) && next.is_whitespace() {
                self.pos = end + 1;
                return Some(join);
            }
        }
        None
    }

    fn skip_whitespace(&mut self) {
        while self
            .chars
            .get(self.pos)
            .map(|c| c.is_whitespace())
            .unwrap_or(false)
        {
            self.pos += 1;
        }
    }
}

/// Lexes `name(arg, "quoted arg", ...)` starting at `start`. Returns the
/// command and the index just past its closing bracket.
fn lex_command(
    chars: &[char],
    start: usize,
    source: &str,
) -> Result<(Command, usize), CommandError> {
    let mut idx = start;
    let mut method_name = String::new();
    let mut name_complete = false;

    loop {
        let Some(&ch) = chars.get(idx) else {
            return Err(CommandError::Unclosed {
                command: source.to_string(),
            });
        };
        idx += 1;

        if ch.is_whitespace() {
            if !method_name.is_empty() {
                name_complete = true;
            }
            continue;
        }
        if ch == '(' {
            if method_name.is_empty() {
                return Err(CommandError::MissingMethodName {
                    command: source.to_string(),
                });
            }
            break;
        }
        if name_complete {
            return Err(CommandError::WhitespaceInMethodName {
                command: source.to_string(),
            });
        }
        method_name.push(ch);
    }

    let mut arguments = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    while let Some(&ch) = chars.get(idx) {
        idx += 1;

        if in_quotes {
            if ch == '\\' && chars.get(idx) == Some(&'"') {
                current.push('"');
                idx += 1;
            } else if ch == '"' {
                in_quotes = false;
                quoted = true;
            } else {
                current.push(ch);
            }
            continue;
        }

        match ch {
            '"' if current.is_empty() && !quoted => in_quotes = true,
            ')' => {
                if !current.is_empty() || quoted {
                    arguments.push(finish_argument(&mut current, &mut quoted));
                }
                return Ok((
                    Command {
                        method_name,
                        arguments,
                    },
                    idx,
                ));
            }
            ',' => arguments.push(finish_argument(&mut current, &mut quoted)),
            c if c.is_whitespace() => {
                if !current.is_empty() && !quoted {
                    current.push(c);
                }
            }
            c => {
                if quoted {
                    return Err(CommandError::TextAfterQuotedArgument {
                        command: source.to_string(),
                        argument: current,
                    });
                }
                current.push(c);
            }
        }
    }

    Err(CommandError::Unclosed {
        command: source.to_string(),
    })
}

fn finish_argument(current: &mut String, quoted: &mut bool) -> Argument {
    let text = std::mem::take(current);
    let arg = if *quoted {
        Argument::quoted(text)
    } else {
        Argument::plain(text.trim())
    };
    *quoted = false;
    arg
}
