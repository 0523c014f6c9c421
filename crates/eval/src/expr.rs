//! The engine-tagged script type.

use serde::{Deserialize, Serialize};

/// Engine names with a wire meaning today. The set is open: the registry
/// accepts any name, so new engines do not require touching this list.
pub const ENGINE_PYTHON: &str = "python";
pub const ENGINE_JS: &str = "js";
pub const ENGINE_CEL: &str = "cel";

/// An engine-tagged boolean script attached to a node as a filter or
/// validator.
///
/// Opaque to everything except the evaluator: the engine crate stores and
/// forwards `Expr` values without inspecting `script`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expr {
    /// Registry key selecting the engine implementation ("python", "js", …).
    pub engine: String,
    /// Source text evaluated against `data` and `ctx`.
    pub script: String,
}

impl Expr {
    pub fn new(engine: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            script: script.into(),
        }
    }

    /// Shorthand for a Python expression.
    pub fn python(script: impl Into<String>) -> Self {
        Self::new(ENGINE_PYTHON, script)
    }
}
