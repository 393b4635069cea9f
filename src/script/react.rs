//! Host UI runtime exposed to components as `React`.
//!
//! The runtime itself is script (`assets/react-host.js`); installing it also
//! hardens the collection builtins so that native loops charge the render's
//! step budget.

use boa_engine::{Context, JsValue};

use super::ScriptError;

const HOST_RUNTIME: &str = include_str!("../../assets/react-host.js");

pub struct HostRuntime {
    react: JsValue,
    render: JsValue,
}

impl HostRuntime {
    pub fn install(context: &mut Context, budget: u64) -> Result<Self, ScriptError> {
        let installer = super::eval(context, HOST_RUNTIME)?;
        let global = JsValue::from(context.global_object());
        let host = super::call(context, &installer, &[global, JsValue::from(budget as f64)])?;
        Ok(Self {
            react: super::property(context, &host, "React")?,
            render: super::property(context, &host, "render")?,
        })
    }

    /// The `React` namespace handed to compiled components.
    pub fn react(&self) -> &JsValue {
        &self.react
    }

    /// Renders `component` with no props, running component functions as it goes.
    pub fn render(&self, context: &mut Context, component: &JsValue) -> Result<String, ScriptError> {
        let html = super::call(context, &self.render, &[component.clone()])?;
        html.as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| ScriptError::new("TypeError", "render did not produce markup"))
    }
}
