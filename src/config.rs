use std::path::PathBuf;

use thiserror::Error;

use crate::preview::IsolationLevel;

pub const DEFAULT_API_BASE: &str = "https://api.v0.dev/v1";
pub const DEFAULT_PORT: u16 = 8080;

/// Placeholder shipped in `.env.example`; treated as no key at all.
const PLACEHOLDER_KEY: &str = "your_v0_api_key_here";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid PORT '{0}'")]
    Port(String),
    #[error("invalid PREVIEW_ISOLATION: {0}")]
    Isolation(#[from] crate::preview::UnknownIsolationLevel),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub api_base: String,
    pub port: u16,
    pub screenshot_dir: PathBuf,
    pub vendor_dir: PathBuf,
    pub tokens_path: Option<PathBuf>,
    pub isolation: IsolationLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            port: DEFAULT_PORT,
            screenshot_dir: PathBuf::from("public/screenshots"),
            vendor_dir: PathBuf::from("public/vendor"),
            tokens_path: None,
            isolation: IsolationLevel::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::Port(raw))?,
            None => defaults.port,
        };
        let isolation = match var("PREVIEW_ISOLATION") {
            Some(raw) => raw.parse()?,
            None => defaults.isolation,
        };

        Ok(Self {
            api_key: var("V0_API_KEY").filter(|key| key != PLACEHOLDER_KEY),
            api_base: var("V0_API_BASE")
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or(defaults.api_base),
            port,
            screenshot_dir: var("SCREENSHOT_DIR").map(PathBuf::from).unwrap_or(defaults.screenshot_dir),
            vendor_dir: var("VENDOR_DIR").map(PathBuf::from).unwrap_or(defaults.vendor_dir),
            tokens_path: var("TOKENS_PATH").map(PathBuf::from),
            isolation,
        })
    }

    /// The API key with everything past the first few characters hidden.
    pub fn masked_api_key(&self) -> String {
        match &self.api_key {
            Some(key) => format!("{}...", &key[..key.char_indices().nth(6).map_or(key.len(), |(i, _)| i)]),
            None => "<unset>".to_string(),
        }
    }
}
