use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Variables and visit counters a playback reads and writes.
///
/// Variable names and script paths are case-insensitive. The store is shared
/// by reference between playbacks; callers running several playbacks against
/// one store are responsible for serializing writes.
pub trait VariableStore {
    fn get_variable(&self, name: &str) -> Option<String>;

    /// `None` deletes the variable.
    fn set_variable(&mut self, name: &str, value: Option<String>);

    fn mark_script_visited(&mut self, script_path: &str);

    /// 0 when the script was never visited.
    fn visit_count(&self, script_path: &str) -> u32;
}

pub type SharedVariableStore = Rc<RefCell<dyn VariableStore>>;

/// In-memory store. Lives as long as the host keeps it; nothing is persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryVariableStore {
    variables: HashMap<String, String>,
    visits: HashMap<String, u32>,
}

impl MemoryVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(self))
    }

    pub fn with_variable(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_variable(name, Some(value.into()));
        self
    }
}

impl VariableStore for MemoryVariableStore {
    fn get_variable(&self, name: &str) -> Option<String> {
        self.variables.get(&name.to_lowercase()).cloned()
    }

    fn set_variable(&mut self, name: &str, value: Option<String>) {
        let key = name.to_lowercase();
        match value {
            Some(v) => {
                self.variables.insert(key, v);
            }
            None => {
                self.variables.remove(&key);
            }
        }
    }

    fn mark_script_visited(&mut self, script_path: &str) {
        *self.visits.entry(script_path.to_lowercase()).or_insert(0) += 1;
    }

    fn visit_count(&self, script_path: &str) -> u32 {
        self.visits
            .get(&script_path.to_lowercase())
            .copied()
            .unwrap_or(0)
    }
}
