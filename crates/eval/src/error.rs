//! Expression-evaluation error type.

use thiserror::Error;

/// Errors returned by an engine's `evaluate` method.
///
/// The engine crate maps the variant onto a node status:
/// - `UnsupportedEngine` / `Script` — node status `error`.
/// - A clean `Ok(false)` is *not* an error; it is a genuine validation
///   failure (or a filter exclusion) and never reaches this type.
#[derive(Debug, Error, Clone)]
pub enum ExprError {
    /// No implementation is registered for the expression's engine tag.
    #[error("unsupported expression engine: '{0}'")]
    UnsupportedEngine(String),

    /// The script failed to parse, raised, or returned a non-boolean.
    #[error("script error: {0}")]
    Script(String),
}
