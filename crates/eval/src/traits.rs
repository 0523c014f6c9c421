//! The `ExprEngine` trait — the contract every scripting engine must fulfil.

use async_trait::async_trait;
use serde_json::Value;

use crate::{Expr, ExprError};

/// A single scripting engine (Python, JS, CEL, a test double, …).
///
/// Implementations must be pure with respect to their inputs: a script sees
/// only `data` (the occurrence's own payload) and `ctx` (the dependency
/// context) — no ambient access to storage, network, or engine internals.
/// The same `(expr, data, ctx)` triple must always produce the same result.
#[async_trait]
pub trait ExprEngine: Send + Sync {
    /// Evaluate `expr.script` to a boolean.
    ///
    /// `ctx` carries `deps`: an ordered list of `{flow, id, data}` objects,
    /// one per matched dependency event, plus the convenience field `data`
    /// (the single dependency's payload) when exactly one dependency matched.
    async fn evaluate(&self, expr: &Expr, data: &Value, ctx: &Value) -> Result<bool, ExprError>;
}
