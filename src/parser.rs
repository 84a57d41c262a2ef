use crate::ast::*;
use crate::command;
use crate::error::DialogueError;
use crate::types::{collection_name, names_match, resolve_relative_path, Script, ScriptCollection, DEFAULT_SCRIPT_NAME};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

/// `%% ... %%`, non-greedy and allowed to span lines.
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)%%.*?%%").unwrap());

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s+(?P<name>.*?)\s*(?:%%.*)?$").unwrap());

static LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\[\[(?P<target>[^\]|]*)(?:\|(?P<display>[^\]]*))?\]\]\s*(?:%%.*)?$").unwrap()
});

/// The name must be followed by whitespace or end of line, so `#play-sound`
/// is not a tag.
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#(?P<name>\w+)(?:\s+(?P<args>.*))?$").unwrap());

static CHARACTER_START_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{Lu}\-_]+(?:\s|$)").unwrap());

static CHARACTER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<ident>[\p{Lu}\-_]+)(?:\s+as\s+(?P<alias>\w+))?(?:\s*-\s*(?P<attribs>.*))?")
        .unwrap()
});

#[derive(Clone, Debug)]
pub struct ParseOptions {
    /// Parse every `#if`/`#elseif` condition up front so a malformed command
    /// fails the whole collection instead of the playback that reaches it.
    pub validate_conditions: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            validate_conditions: true,
        }
    }
}

/// Output of the line classifier. Headings only delimit scripts and never
/// become script lines.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Heading { name: String, line_no: usize },
    Line(Line),
}

pub fn parse_collection(text: &str, path: &str) -> Result<ScriptCollection, DialogueError> {
    parse_collection_with_options(text, path, &ParseOptions::default())
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<ScriptCollection, DialogueError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| DialogueError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let path_str = path.to_string_lossy().replace('\\', "/");
    parse_collection(&text, &path_str)
}

pub fn parse_collection_with_options(
    text: &str,
    path: &str,
    options: &ParseOptions,
) -> Result<ScriptCollection, DialogueError> {
    let name = collection_name(path);
    let items = classify_lines(text)?;

    let mut scripts: Vec<Script> = Vec::new();
    let mut idx = 0;
    while idx < items.len() {
        let (script, next) = split_script(path, &items, idx);
        idx = next;

        if scripts
            .iter()
            .any(|s| names_match(&s.name, &script.name))
        {
            return Err(DialogueError::DuplicateScript {
                collection: name,
                script: script.name,
            });
        }

        if options.validate_conditions {
            validate_conditions(&name, &script)?;
        }
        scripts.push(script);
    }

    if scripts.is_empty() {
        scripts.push(Script {
            name: DEFAULT_SCRIPT_NAME.to_string(),
            path: path.to_string(),
            lines: vec![],
            links: BTreeSet::new(),
        });
    }

    Ok(ScriptCollection {
        name,
        path: path.to_string(),
        raw: text.to_string(),
        scripts,
    })
}

/// Removes comments, keeping the newlines they spanned so line numbers still
/// match the source. An unterminated `%%` is left in place.
pub fn strip_comments(text: &str) -> String {
    COMMENT_RE
        .replace_all(text, |caps: &Captures| "\n".repeat(caps[0].matches('\n').count()))
        .into_owned()
}

pub fn classify_lines(text: &str) -> Result<Vec<Classified>, DialogueError> {
    let cleaned = strip_comments(text);
    let mut out = Vec::new();

    for (idx, line) in cleaned.split('\n').enumerate() {
        let line_no = idx + 1;
        let mut raw = line;
        if idx == 0 {
            raw = raw.trim_start_matches('\u{feff}');
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(trimmed) {
            out.push(Classified::Heading {
                name: caps["name"].trim().to_string(),
                line_no,
            });
            continue;
        }

        out.push(Classified::Line(classify_line(trimmed, line_no)?));
    }

    Ok(out)
}

/// Classifies one trimmed, non-blank, non-heading line.
pub fn classify_line(line: &str, line_no: usize) -> Result<Line, DialogueError> {
    if let Some(caps) = LINK_RE.captures(line) {
        return parse_link(line, line_no, &caps).map(Line::Link);
    }

    if let Some(caps) = TAG_RE.captures(line) {
        return Ok(Line::Tag(TagLine {
            raw: line.to_string(),
            line_no,
            name: caps["name"].to_string(),
            args: caps
                .name("args")
                .map(|m| m.as_str().trim())
                .unwrap_or("")
                .to_string(),
        }));
    }

    if let Some(rest) = line.strip_prefix('>') {
        return Ok(Line::Quote(QuoteLine {
            raw: line.to_string(),
            line_no,
            text: rest.trim().to_string(),
        }));
    }

    if CHARACTER_START_RE.is_match(line) {
        if let Some(caps) = CHARACTER_RE.captures(line) {
            return Ok(Line::Character(parse_character(line, line_no, &caps)));
        }
    }

    Ok(Line::Dialogue(DialogueLine {
        raw: line.to_string(),
        line_no,
        text: line.to_string(),
    }))
}

fn parse_link(line: &str, line_no: usize, caps: &Captures) -> Result<LinkLine, DialogueError> {
    let target = caps["target"].trim().to_string();
    if target.is_empty() {
        return Err(DialogueError::EmptyLinkTarget {
            raw: line.to_string(),
            line_no,
        });
    }

    let display = caps
        .name("display")
        .map(|m| m.as_str().trim())
        .unwrap_or("");
    let display_name = if display.is_empty() {
        target.trim_start_matches('#').trim().to_string()
    } else {
        display.to_string()
    };

    Ok(LinkLine {
        raw: line.to_string(),
        line_no,
        target,
        display_name,
    })
}

fn parse_character(line: &str, line_no: usize, caps: &Captures) -> CharacterLine {
    let alias = caps
        .name("alias")
        .map(|m| m.as_str().to_string())
        .filter(|a| !a.is_empty());
    let attributes = caps
        .name("attribs")
        .map(|m| {
            m.as_str()
                .split(',')
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    CharacterLine {
        raw: line.to_string(),
        line_no,
        identifier: caps["ident"].to_string(),
        alias,
        attributes,
    }
}

/// Builds the script starting at `start`. A leading heading names it; it then
/// takes every line up to the next heading. Returns the script and the index
/// the next script starts at.
pub fn split_script(collection_path: &str, items: &[Classified], start: usize) -> (Script, usize) {
    let mut idx = start;
    let (name, path) = match items.get(idx) {
        Some(Classified::Heading { name, .. }) => {
            idx += 1;
            (name.clone(), format!("{}#{}", collection_path, name))
        }
        _ => (DEFAULT_SCRIPT_NAME.to_string(), collection_path.to_string()),
    };

    let mut lines = Vec::new();
    let mut links = BTreeSet::new();
    while let Some(Classified::Line(line)) = items.get(idx) {
        if let Line::Link(link) = line {
            links.insert(resolve_relative_path(collection_path, &link.target));
        }
        lines.push(line.clone());
        idx += 1;
    }

    (
        Script {
            name,
            path,
            lines,
            links,
        },
        idx,
    )
}

fn validate_conditions(collection: &str, script: &Script) -> Result<(), DialogueError> {
    for tag in script.lines.iter().filter_map(Line::as_tag) {
        if tag.is("if") || tag.is("elseif") {
            command::parse_expression(&tag.args).map_err(|source| {
                DialogueError::InvalidCondition {
                    collection: collection.to_string(),
                    line_no: tag.line_no,
                    source,
                }
            })?;
        }
    }
    Ok(())
}
