#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
use pyo3::prelude::*;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

pub mod ast;
pub mod command;
pub mod conditions;
pub mod error;
pub mod library;
pub mod parser;
pub mod runner;
pub mod store;
pub mod tags;
pub mod types;

#[cfg(test)]
mod test_support;

pub use ast::{CharacterLine, DialogueLine, Line, LinkLine, QuoteLine, TagLine};
pub use command::{parse_command, parse_expression, Argument, Command, CommandExpr, Join};
pub use error::{CommandError, DialogueError, Location};
pub use library::{FsLibrary, MemoryLibrary, ScriptLibrary};
pub use parser::{parse_collection, parse_collection_with_options, parse_file, ParseOptions};
pub use runner::{DialogueHost, Runner, RunnerOptions, RunnerState, StepResult, Suspension};
pub use store::{MemoryVariableStore, SharedVariableStore, VariableStore};
pub use types::{Script, ScriptCollection, DEFAULT_SCRIPT_NAME};

/// Path used for collections parsed from bare text.
pub const INLINE_PATH: &str = "inline.md";

/// Parses `text` and renders the collection as pretty JSON.
pub fn collection_json(text: &str, path: &str) -> Result<String, String> {
    let collection = parse_collection(text, path).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&collection).map_err(|e| e.to_string())
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pyfunction]
#[pyo3(signature = (text, path = None))]
fn parse_text(text: String, path: Option<String>) -> PyResult<String> {
    let path = path.as_deref().unwrap_or(INLINE_PATH);
    collection_json(&text, path)
        .map_err(|e| PyErr::new::<pyo3::exceptions::PyValueError, _>(e))
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen]
pub fn parse_text_wasm(text: &str, path: Option<String>) -> Result<String, JsValue> {
    let path = path.as_deref().unwrap_or(INLINE_PATH);
    collection_json(text, path).map_err(|e| JsValue::from_str(&e))
}

#[cfg(all(feature = "python", not(target_arch = "wasm32")))]
#[pymodule]
fn mdlg_rs(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(parse_text, m)?)?;
    Ok(())
}
