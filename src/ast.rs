use serde::{Deserialize, Serialize};

/// One classified, non-blank source line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Line {
    Character(CharacterLine),
    Dialogue(DialogueLine),
    Link(LinkLine),
    Quote(QuoteLine),
    Tag(TagLine),
}

impl Line {
    pub fn raw(&self) -> &str {
        match self {
            Line::Character(l) => &l.raw,
            Line::Dialogue(l) => &l.raw,
            Line::Link(l) => &l.raw,
            Line::Quote(l) => &l.raw,
            Line::Tag(l) => &l.raw,
        }
    }

    /// 1-based line number in the original source text.
    pub fn line_no(&self) -> usize {
        match self {
            Line::Character(l) => l.line_no,
            Line::Dialogue(l) => l.line_no,
            Line::Link(l) => l.line_no,
            Line::Quote(l) => l.line_no,
            Line::Tag(l) => l.line_no,
        }
    }

    pub fn as_tag(&self) -> Option<&TagLine> {
        match self {
            Line::Tag(t) => Some(t),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterLine {
    pub raw: String,
    pub line_no: usize,
    pub identifier: String, // "JOHN" in "JOHN as Johnny - happy"
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub attributes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub raw: String,
    pub line_no: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkLine {
    pub raw: String,
    pub line_no: usize,
    pub target: String, // "#Name", "other/file" or "other/file#Name"
    pub display_name: String,
}

impl LinkLine {
    pub fn is_local(&self) -> bool {
        self.target.starts_with('#')
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub raw: String,
    pub line_no: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLine {
    pub raw: String,
    pub line_no: usize,
    pub name: String,
    pub args: String,
}

impl TagLine {
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}
