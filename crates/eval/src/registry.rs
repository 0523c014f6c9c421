//! The evaluator registry — dispatches an [`Expr`] to the engine registered
//! under its `engine` tag.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::{Expr, ExprEngine, ExprError};

/// Maps engine names to implementations and routes evaluation calls.
///
/// The registry is immutable after construction, so it can be shared freely
/// (`Arc<Evaluator>`) across concurrent node evaluations.
pub struct Evaluator {
    engines: HashMap<String, Arc<dyn ExprEngine>>,
}

impl Evaluator {
    /// An empty registry. Every evaluation fails with `UnsupportedEngine`
    /// until engines are registered.
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// A registry with the bundled engines: Python when the `python` feature
    /// is enabled. `js` and `cel` are recognised wire names with no bundled
    /// implementation — callers embedding their own interpreter register it
    /// here.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut ev = Self::new();
        #[cfg(feature = "python")]
        {
            ev = ev.register(crate::expr::ENGINE_PYTHON, crate::python::PythonEngine::new());
        }
        ev
    }

    /// Register an engine under `name`, replacing any previous registration.
    pub fn register(mut self, name: impl Into<String>, engine: impl ExprEngine + 'static) -> Self {
        self.engines.insert(name.into(), Arc::new(engine));
        self
    }

    /// Names of all registered engines.
    pub fn engine_names(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }

    /// Evaluate `expr` against `data` and `ctx` via the engine it names.
    pub async fn evaluate(&self, expr: &Expr, data: &Value, ctx: &Value) -> Result<bool, ExprError> {
        let engine = self
            .engines
            .get(&expr.engine)
            .ok_or_else(|| ExprError::UnsupportedEngine(expr.engine.clone()))?;

        tracing::trace!(engine = %expr.engine, "evaluating expression");
        engine.evaluate(expr, data, ctx).await
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::with_defaults()
    }
}
