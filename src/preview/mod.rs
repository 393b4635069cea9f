//! Turns stored component source into a live preview.
//!
//! Two renderers share one contract: [`InlineRenderer`] runs the component in
//! this process on the embedded script engine and returns its markup inside a
//! CSS-contained box (trusted input only), while [`IsolatedRenderer`] builds a
//! standalone document for a script-only sandboxed frame. Which one is used is
//! an [`IsolationLevel`] decision, per request or from configuration.

pub mod boundary;
pub mod extract;
pub mod html;
pub mod inline;
pub mod isolated;
pub mod lexical;
pub mod normalize;
pub mod session;
pub mod transpile;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::ScriptError;
use crate::telemetry::{self, MetricKind};
use crate::tokens::DesignTokens;

pub use extract::extract_component_name;
pub use inline::InlineRenderer;
pub use isolated::IsolatedRenderer;
pub use normalize::normalize;
pub use session::{SessionRegistry, SessionSnapshot};
pub use transpile::{JsxTranspiler, Transpiler, TranspilerHandle};

/// File name reported in transpiler messages.
pub const SOURCE_FILENAME: &str = "dynamic-component.tsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// In-process rendering; only for code the operator trusts.
    #[serde(rename = "inline", alias = "trusted")]
    Trusted,
    /// Sandboxed standalone document.
    #[default]
    #[serde(rename = "isolated", alias = "untrusted")]
    Untrusted,
}

impl IsolationLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            IsolationLevel::Trusted => "inline",
            IsolationLevel::Untrusted => "isolated",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown isolation level '{0}' (expected 'inline' or 'isolated')")]
pub struct UnknownIsolationLevel(pub String);

impl FromStr for IsolationLevel {
    type Err = UnknownIsolationLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inline" | "trusted" => Ok(IsolationLevel::Trusted),
            "isolated" | "untrusted" => Ok(IsolationLevel::Untrusted),
            other => Err(UnknownIsolationLevel(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub code: String,
    #[serde(default)]
    pub css: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewOutcome {
    /// The component rendered without throwing.
    Mounted { component: String },
    /// A sandboxed document was produced; it mounts on the client.
    Isolated {
        #[serde(skip_serializing_if = "Option::is_none")]
        component: Option<String>,
    },
    /// The component mounted but threw while rendering.
    RuntimeError { component: String, message: String },
    /// Nothing could be mounted.
    Failed { kind: String, message: String },
}

impl PreviewOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, PreviewOutcome::RuntimeError { .. } | PreviewOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RenderedPreview {
    pub strategy: IsolationLevel,
    pub html: String,
    pub outcome: PreviewOutcome,
}

impl RenderedPreview {
    pub(crate) fn failed(strategy: IsolationLevel, html: String, err: &PreviewError) -> Self {
        RenderedPreview {
            strategy,
            html,
            outcome: PreviewOutcome::Failed {
                kind: err.kind().to_string(),
                message: err.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PreviewError {
    #[error("No component code to render")]
    EmptySource,
    #[error("Could not find a component to render. Declare it as `export default function ComponentName() {{ ... }}`.")]
    ComponentNotFound,
    #[error("Transpiler failed to load: {0}")]
    TranspilerUnavailable(String),
    #[error("{}\n\n{}", .0, html::REGENERATE_HINT)]
    Transpile(#[from] transpile::TranspileError),
    #[error("Failed to compile component: {0}")]
    Compile(ScriptError),
    #[error("{0}")]
    Evaluation(ScriptError),
    #[error("The generated artifact is not a component (evaluated to {0})")]
    NotAComponent(String),
    #[error("Failed to build preview document: {0}")]
    Document(String),
}

impl PreviewError {
    pub fn kind(&self) -> &'static str {
        match self {
            PreviewError::EmptySource => "empty_source",
            PreviewError::ComponentNotFound => "component_not_found",
            PreviewError::TranspilerUnavailable(_) => "transpiler_unavailable",
            PreviewError::Transpile(_) => "transpile",
            PreviewError::Compile(_) => "compile",
            PreviewError::Evaluation(_) => "evaluation",
            PreviewError::NotAComponent(_) => "not_a_component",
            PreviewError::Document(_) => "document",
        }
    }
}

/// Turns component source into preview markup. Failures come back as a
/// rendered error panel, never as an `Err`.
#[async_trait]
pub trait Renderer: Send + Sync {
    fn level(&self) -> IsolationLevel;

    async fn render(&self, request: &PreviewRequest) -> RenderedPreview;
}

pub struct PreviewService {
    inline: Arc<dyn Renderer>,
    isolated: Arc<dyn Renderer>,
    default_level: IsolationLevel,
    sessions: SessionRegistry,
}

impl PreviewService {
    pub fn new(tokens: Arc<DesignTokens>, default_level: IsolationLevel) -> Self {
        let transpiler = Arc::new(TranspilerHandle::builtin());
        Self::with_renderers(
            Arc::new(InlineRenderer::new(tokens.clone(), transpiler)),
            Arc::new(IsolatedRenderer::new(tokens)),
            default_level,
        )
    }

    pub fn with_renderers(inline: Arc<dyn Renderer>, isolated: Arc<dyn Renderer>, default_level: IsolationLevel) -> Self {
        Self {
            inline,
            isolated,
            default_level,
            sessions: SessionRegistry::new(),
        }
    }

    pub fn default_level(&self) -> IsolationLevel {
        self.default_level
    }

    pub fn renderer(&self, level: Option<IsolationLevel>) -> &Arc<dyn Renderer> {
        match level.unwrap_or(self.default_level) {
            IsolationLevel::Trusted => &self.inline,
            IsolationLevel::Untrusted => &self.isolated,
        }
    }

    pub async fn render(&self, request: &PreviewRequest, level: Option<IsolationLevel>) -> RenderedPreview {
        let renderer = self.renderer(level);
        let label = format!("{} preview", renderer.level());
        let preview = telemetry::measure(MetricKind::Render, &label, renderer.render(request)).await;
        if let PreviewOutcome::Failed { kind, message } = &preview.outcome {
            tracing::warn!(strategy = %preview.strategy, kind = %kind, "⚠️ Preview failed: {}", message);
        }
        preview
    }

    /// Renders for an editor session. A render that was overtaken by a newer
    /// one for the same session is not recorded.
    pub async fn render_session(
        &self,
        session_id: &str,
        request: &PreviewRequest,
        level: Option<IsolationLevel>,
    ) -> (RenderedPreview, bool) {
        let ticket = self.sessions.begin(session_id);
        let preview = self.render(request, level).await;
        let applied = self.sessions.complete(session_id, ticket, preview.clone());
        (preview, applied)
    }

    pub fn session(&self, session_id: &str) -> Option<SessionSnapshot> {
        self.sessions.snapshot(session_id)
    }
}
