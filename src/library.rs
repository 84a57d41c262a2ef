use crate::error::DialogueError;
use crate::parser::{parse_collection_with_options, ParseOptions};
use crate::types::{normalize_path, ScriptCollection};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolves collection paths for links that leave the current collection.
pub trait ScriptLibrary {
    /// `path` is a resolved collection path without any `#name` suffix.
    fn collection(&self, path: &str) -> Result<Arc<ScriptCollection>, DialogueError>;
}

/// Collections registered up front, keyed by case-insensitive path.
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    collections: HashMap<String, Arc<ScriptCollection>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, collection: ScriptCollection) -> Arc<ScriptCollection> {
        let collection = Arc::new(collection);
        self.collections
            .insert(library_key(&collection.path), collection.clone());
        collection
    }

    pub fn parse(&mut self, text: &str, path: &str) -> Result<Arc<ScriptCollection>, DialogueError> {
        let collection = parse_collection_with_options(text, path, &ParseOptions::default())?;
        Ok(self.insert(collection))
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

impl ScriptLibrary for MemoryLibrary {
    fn collection(&self, path: &str) -> Result<Arc<ScriptCollection>, DialogueError> {
        self.collections
            .get(&library_key(path))
            .cloned()
            .ok_or_else(|| DialogueError::MissingScript {
                path: path.to_string(),
                location: None,
            })
    }
}

/// Reads and parses collections from files below `root` on every lookup.
/// Collection paths stay relative to `root`, so links resolve the same way
/// as they do for in-memory collections.
#[derive(Debug, Clone)]
pub struct FsLibrary {
    root: PathBuf,
    options: ParseOptions,
}

impl FsLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            options: ParseOptions::default(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }
}

impl ScriptLibrary for FsLibrary {
    fn collection(&self, path: &str) -> Result<Arc<ScriptCollection>, DialogueError> {
        let path = normalize_path(path);
        let file = self.root.join(&path);
        if !file.is_file() {
            return Err(DialogueError::MissingScript {
                path,
                location: None,
            });
        }
        let text = fs::read_to_string(&file).map_err(|source| DialogueError::Io {
            path: file.clone(),
            source,
        })?;
        let collection = parse_collection_with_options(&text, &path, &self.options)?;
        Ok(Arc::new(collection))
    }
}

fn library_key(path: &str) -> String {
    normalize_path(path).to_lowercase()
}
