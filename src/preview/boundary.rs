//! Catches errors thrown while a mounted component renders.

use crate::script::ScriptError;

use super::html;

/// Once tripped, a boundary keeps showing its error panel until it is
/// replaced by a fresh one for new input.
#[derive(Debug, Default)]
pub struct ErrorBoundary {
    has_error: bool,
    error: Option<ScriptError>,
}

impl ErrorBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_error(&self) -> bool {
        self.has_error
    }

    pub fn error(&self) -> Option<&ScriptError> {
        self.error.as_ref()
    }

    /// Renders the guarded subtree. A failure trips the boundary and the
    /// panel is returned in place of the subtree.
    pub fn render<F>(&mut self, subtree: F) -> String
    where
        F: FnOnce() -> Result<String, ScriptError>,
    {
        if self.has_error {
            return self.panel();
        }
        match subtree() {
            Ok(html) => html,
            Err(err) => {
                tracing::warn!(name = %err.name, "🧯 Render error caught by boundary: {}", err.message);
                self.has_error = true;
                self.error = Some(err);
                self.panel()
            }
        }
    }

    pub fn panel(&self) -> String {
        match &self.error {
            Some(err) => html::runtime_error_panel(&err.message, &err.stack),
            None => html::runtime_error_panel("", ""),
        }
    }
}
