//! `MockEngine` — a test double for `ExprEngine`.
//!
//! Useful in unit and integration tests where a real scripting engine is
//! either unavailable or irrelevant. The script text itself selects the
//! verdict, so a test graph can mix passing, failing, and erroring
//! expressions without any interpreter.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::{Expr, ExprEngine, ExprError};

/// Shared call log handed out by [`MockEngine::calls`] so tests can assert
/// how often (and with what) the engine was invoked after the engine itself
/// has been moved into a registry.
#[derive(Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<(String, Value, Value)>>>,
}

impl CallLog {
    /// Number of evaluations seen so far.
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Scripts evaluated, in call order.
    pub fn scripts(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(s, _, _)| s.clone()).collect()
    }

    /// The `(script, data, ctx)` triple of call `idx`.
    pub fn call(&self, idx: usize) -> Option<(String, Value, Value)> {
        self.calls.lock().unwrap().get(idx).cloned()
    }
}

/// A mock engine that records every call and derives its verdict from the
/// script text:
///
/// - `"true"`  → `Ok(true)`
/// - `"false"` → `Ok(false)`
/// - `"error"` → `Err(ExprError::Script)`
/// - anything else → `Err(ExprError::Script)` naming the script
pub struct MockEngine {
    calls: CallLog,
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            calls: CallLog::default(),
        }
    }

    /// Handle to the call log; clone-cheap and usable after the engine has
    /// been registered.
    pub fn calls(&self) -> CallLog {
        self.calls.clone()
    }
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExprEngine for MockEngine {
    async fn evaluate(&self, expr: &Expr, data: &Value, ctx: &Value) -> Result<bool, ExprError> {
        self.calls
            .calls
            .lock()
            .unwrap()
            .push((expr.script.clone(), data.clone(), ctx.clone()));

        match expr.script.as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            "error" => Err(ExprError::Script("scripted failure".into())),
            other => Err(ExprError::Script(format!(
                "mock engine has no verdict for script '{other}'"
            ))),
        }
    }
}
