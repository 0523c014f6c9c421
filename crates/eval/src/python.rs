//! Embedded-Python engine — the reference `ExprEngine` implementation.
//!
//! Scripts are single Python expressions evaluated against `data` and `ctx`
//! plus a small builtin surface (len/min/max/sum, conversions, random).
//! JSON values cross the boundary through the interpreter's own `json`
//! module, so payloads round-trip without bespoke conversion code.

use std::ffi::CString;

use async_trait::async_trait;
use pyo3::prelude::*;
use pyo3::types::PyDict;
use serde_json::Value;

use crate::{Expr, ExprEngine, ExprError};

/// Builtins exposed to scripts. Everything else is withheld: no imports, no
/// file or attribute tricks through `__builtins__`.
const ALLOWED_BUILTINS: &[&str] = &[
    "len", "min", "max", "sum", "abs", "round", "sorted", "any", "all", "str", "int", "float",
    "bool",
];

pub struct PythonEngine;

impl PythonEngine {
    pub fn new() -> Self {
        Self
    }

    fn eval_script(&self, expr: &Expr, data: &Value, ctx: &Value) -> Result<bool, ExprError> {
        Python::attach(|py| {
            let globals = self.build_globals(py, data, ctx).map_err(to_script_err)?;

            let code = CString::new(expr.script.as_str())
                .map_err(|_| ExprError::Script("script contains a NUL byte".into()))?;

            let result = py
                .eval(code.as_c_str(), Some(&globals), None)
                .map_err(to_script_err)?;

            result
                .extract::<bool>()
                .map_err(|_| ExprError::Script(format!("expression returned non-boolean: {result}")))
        })
    }

    fn build_globals<'py>(
        &self,
        py: Python<'py>,
        data: &Value,
        ctx: &Value,
    ) -> PyResult<Bound<'py, PyDict>> {
        let json = py.import("json")?;

        let data_py = json.call_method1("loads", (serde_json::to_string(data).unwrap_or_default(),))?;
        let ctx_py = json.call_method1("loads", (serde_json::to_string(ctx).unwrap_or_default(),))?;

        let builtins = py.import("builtins")?;
        let exposed = PyDict::new(py);
        for name in ALLOWED_BUILTINS {
            exposed.set_item(name, builtins.getattr(name)?)?;
        }

        let random = py.import("random")?;

        let globals = PyDict::new(py);
        globals.set_item("__builtins__", exposed)?;
        globals.set_item("data", data_py)?;
        globals.set_item("ctx", ctx_py)?;
        globals.set_item("random", random.getattr("random")?)?;
        globals.set_item("randint", random.getattr("randint")?)?;

        Ok(globals)
    }
}

impl Default for PythonEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn to_script_err(err: PyErr) -> ExprError {
    ExprError::Script(err.to_string())
}

#[async_trait]
impl ExprEngine for PythonEngine {
    async fn evaluate(&self, expr: &Expr, data: &Value, ctx: &Value) -> Result<bool, ExprError> {
        self.eval_script(expr, data, ctx)
    }
}
