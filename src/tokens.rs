//! Design tokens shared by prompts, stylesheets and previews.

use std::path::Path;

use include_dir::{include_dir, Dir};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static ASSETS: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Colors listed in the system prompt, in prompt order.
pub const CORE_COLORS: [&str; 8] = ["bg", "fg", "primary", "secondary", "muted", "accent", "destructive", "border"];

#[derive(Debug, Error)]
pub enum TokensError {
    #[error("embedded tokens.json is missing")]
    Missing,
    #[error("failed to read tokens file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid tokens JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignTokens {
    pub version: String,
    pub theme: String,
    pub colors: IndexMap<String, String>,
    pub radius: IndexMap<String, String>,
    pub spacing: IndexMap<String, String>,
    #[serde(default)]
    pub shadow: IndexMap<String, String>,
    #[serde(default)]
    pub font: IndexMap<String, String>,
}

impl DesignTokens {
    /// The tokens compiled into the binary.
    pub fn embedded() -> Result<Self, TokensError> {
        let text = ASSETS
            .get_file("tokens.json")
            .and_then(|file| file.contents_utf8())
            .ok_or(TokensError::Missing)?;
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TokensError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TokensError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// The eight prompt colors. A color missing from the token set is skipped.
    pub fn core_colors(&self) -> Vec<(&'static str, &str)> {
        CORE_COLORS
            .iter()
            .filter_map(|key| self.colors.get(*key).map(|value| (*key, value.as_str())))
            .collect()
    }

    /// The object generated components see as `tokens`.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Custom properties for every token under `selector`.
    pub fn css_variables(&self, selector: &str) -> String {
        let mut out = format!("{selector} {{\n");
        let groups = [
            ("color", &self.colors),
            ("radius", &self.radius),
            ("spacing", &self.spacing),
            ("shadow", &self.shadow),
            ("font", &self.font),
        ];
        for (prefix, values) in groups {
            for (key, value) in values {
                out.push_str(&format!("  --{prefix}-{key}: {value};\n"));
            }
        }
        out.push('}');
        out
    }
}
