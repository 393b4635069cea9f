//! Embedded JavaScript engine for transpiled component code.
//!
//! Generated components are never handed to a host `eval`. Each render gets a
//! fresh Boa [`Context`] with loop and recursion limits set, and the host UI
//! runtime (`react`) installed into it.

pub mod react;

use boa_engine::error::JsNativeErrorKind;
use boa_engine::{Context, JsError, JsObject, JsString, JsValue, Source};
use thiserror::Error;

/// Default iterations per loop, and units of native work per render.
pub const DEFAULT_STEP_LIMIT: u64 = 250_000;

const RECURSION_LIMIT: usize = 512;

/// An error that escaped script code, in the shape a browser console shows.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{name}: {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    pub stack: String,
}

impl ScriptError {
    pub fn new(name: &str, message: impl Into<String>) -> Self {
        ScriptError {
            name: name.to_string(),
            message: message.into(),
            stack: String::new(),
        }
    }
}

/// A fresh engine context with runaway loops and recursion bounded.
pub fn context(step_limit: u64) -> Context {
    let mut context = Context::default();
    let limits = context.runtime_limits_mut();
    limits.set_loop_iteration_limit(step_limit);
    limits.set_recursion_limit(RECURSION_LIMIT);
    context
}

pub fn eval(context: &mut Context, source: &str) -> Result<JsValue, ScriptError> {
    context
        .eval(Source::from_bytes(source))
        .map_err(|err| script_error(&err, context))
}

/// Calls `func` with an undefined receiver.
pub fn call(context: &mut Context, func: &JsValue, args: &[JsValue]) -> Result<JsValue, ScriptError> {
    let callable = func
        .as_callable()
        .ok_or_else(|| ScriptError::new("TypeError", format!("{} is not a function", type_name(func))))?;
    callable
        .call(&JsValue::undefined(), args, context)
        .map_err(|err| script_error(&err, context))
}

pub fn property(context: &mut Context, value: &JsValue, key: &str) -> Result<JsValue, ScriptError> {
    let object = value
        .as_object()
        .ok_or_else(|| ScriptError::new("TypeError", format!("Cannot read properties of {} (reading '{key}')", type_name(value))))?;
    object
        .get(JsString::from(key), context)
        .map_err(|err| script_error(&err, context))
}

/// The `typeof` of a value.
pub fn type_name(value: &JsValue) -> &'static str {
    if value.is_undefined() {
        "undefined"
    } else if value.is_callable() {
        "function"
    } else if value.is_null() || value.is_object() {
        "object"
    } else if value.is_boolean() {
        "boolean"
    } else if value.is_number() {
        "number"
    } else if value.is_string() {
        "string"
    } else if value.is_bigint() {
        "bigint"
    } else {
        "symbol"
    }
}

/// Engine errors are read without materializing them, since limit errors
/// have no script-visible object.
pub fn script_error(err: &JsError, context: &mut Context) -> ScriptError {
    if let Some(native) = err.as_native() {
        return ScriptError::new(native_name(&native.kind), native.message());
    }
    let Some(value) = err.as_opaque() else {
        return ScriptError::new("Error", err.to_string());
    };
    let Some(object) = value.as_object() else {
        return ScriptError::new("Error", value.display().to_string());
    };

    let name = string_property(&object, "name", context).unwrap_or_else(|| "Error".to_string());
    let message = string_property(&object, "message", context).unwrap_or_default();
    let stack = string_property(&object, "componentStack", context)
        .map(|trace| format!("{name}: {message}{trace}"))
        .unwrap_or_default();
    ScriptError { name, message, stack }
}

fn string_property(object: &JsObject, key: &str, context: &mut Context) -> Option<String> {
    let value = object.get(JsString::from(key), context).ok()?;
    value.as_string().map(|s| s.to_std_string_escaped())
}

fn native_name(kind: &JsNativeErrorKind) -> &'static str {
    match kind {
        JsNativeErrorKind::Aggregate(_) => "AggregateError",
        JsNativeErrorKind::Eval => "EvalError",
        JsNativeErrorKind::Range | JsNativeErrorKind::RuntimeLimit => "RangeError",
        JsNativeErrorKind::Reference => "ReferenceError",
        JsNativeErrorKind::Syntax => "SyntaxError",
        JsNativeErrorKind::Type => "TypeError",
        JsNativeErrorKind::Uri => "URIError",
        _ => "Error",
    }
}
