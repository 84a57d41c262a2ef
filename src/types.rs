use crate::ast::Line;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Name given to a script that is not introduced by a heading.
pub const DEFAULT_SCRIPT_NAME: &str = "Default Script";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Script {
    pub name: String,
    /// Collection path, suffixed with `#name` when the script has a heading.
    pub path: String,
    pub lines: Vec<Line>,
    /// Resolved paths of every link this script offers. The runner logs a
    /// warning when it follows a link missing from this set.
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub links: BTreeSet<String>,
}

impl Script {
    pub fn links_to(&self, path: &str) -> bool {
        self.links.iter().any(|l| names_match(l, path))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptCollection {
    pub name: String,
    pub path: String,
    pub raw: String,
    pub scripts: Vec<Script>,
}

impl ScriptCollection {
    /// Looks up a script by name. A collection holding a single script always
    /// returns it; a blank name means the default script.
    pub fn script(&self, name: Option<&str>) -> Option<&Script> {
        self.script_index(name).map(|idx| &self.scripts[idx])
    }

    pub fn script_index(&self, name: Option<&str>) -> Option<usize> {
        if self.scripts.len() == 1 {
            return Some(0);
        }
        let name = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => DEFAULT_SCRIPT_NAME,
        };
        self.scripts
            .iter()
            .position(|s| names_match(&s.name, name))
    }

    pub fn resolve_relative_path(&self, target: &str) -> String {
        resolve_relative_path(&self.path, target)
    }

    /// True when `path` (without any `#name` suffix) names this collection.
    pub fn is_path(&self, path: &str) -> bool {
        names_match(&normalize_path(path), &normalize_path(&self.path))
    }
}

/// Case-insensitive comparison used for script names and paths.
pub fn names_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

pub fn collection_name(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Splits `file#name` into its file and script-name halves.
pub fn split_script_path(path: &str) -> (&str, &str) {
    match path.split_once('#') {
        Some((file, name)) => (file, name),
        None => (path, ""),
    }
}

/// Resolves a link target relative to the collection at `collection_path`.
///
/// `#name` stays inside the collection. Anything else is a file path relative
/// to the collection's directory, gets a `.md` extension when it has none, and
/// keeps its `#name` suffix.
pub fn resolve_relative_path(collection_path: &str, target: &str) -> String {
    let target = target.trim();
    if target.starts_with('#') {
        return format!("{}{}", collection_path, target);
    }

    let (file, name) = split_script_path(target);
    let base = collection_path.replace('\\', "/");
    let dir = match base.rfind('/') {
        Some(idx) => &base[..idx],
        None => "",
    };
    let joined = if dir.is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir, file)
    };

    let mut out = normalize_path(&joined);
    if !out.to_lowercase().ends_with(".md") {
        out.push_str(".md");
    }
    if !name.is_empty() {
        out.push('#');
        out.push_str(name);
    }
    out
}

pub(crate) fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if matches!(parts.last(), Some(p) if *p != "..") {
                    parts.pop();
                } else if !absolute {
                    parts.push("..");
                }
            }
            p => parts.push(p),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{}", joined)
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_targets_stay_in_collection() {
        assert_eq!(
            resolve_relative_path("dummy/test.dlg.md", "#B"),
            "dummy/test.dlg.md#B"
        );
    }

    #[test]
    fn relative_targets_join_collection_directory() {
        assert_eq!(
            resolve_relative_path("dummy/test.dlg.md", "other"),
            "dummy/other.md"
        );
        assert_eq!(
            resolve_relative_path("dummy/test.dlg.md", "../shared/intro#Start"),
            "shared/intro.md#Start"
        );
        assert_eq!(
            resolve_relative_path("dummy\\test.md", "./Side.MD"),
            "dummy/Side.MD"
        );
        assert_eq!(resolve_relative_path("root.md", "next"), "next.md");
    }

    #[test]
    fn collection_name_is_file_stem() {
        assert_eq!(collection_name("dummy/test.dlg.md"), "test.dlg");
        assert_eq!(collection_name("intro.md"), "intro");
    }

    #[test]
    fn scripts_record_resolved_links() {
        let collection =
            crate::parser::parse_collection("Intro\n[[#Next]]\n[[../other#Start]]\n# Next\n", "a/b.md")
                .unwrap();
        let intro = collection.script(Some("")).unwrap();
        assert_eq!(intro.name, DEFAULT_SCRIPT_NAME);
        assert!(intro.links_to("a/b.md#next"));
        assert!(intro.links_to("other.md#Start"));
        assert_eq!(collection.script(Some("NEXT")).unwrap().name, "Next");
    }

    #[test]
    fn split_script_path_handles_missing_name() {
        assert_eq!(split_script_path("a/b.md#Intro"), ("a/b.md", "Intro"));
        assert_eq!(split_script_path("a/b.md"), ("a/b.md", ""));
    }
}
