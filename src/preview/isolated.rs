//! Sandboxed standalone documents.
//!
//! The component is not run here. The renderer builds a complete HTML
//! document with its own content-security policy, token variables and a
//! bootstrap script, and hands it to the browser as the `srcdoc` of a frame
//! that may only run scripts.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::{Captures, Regex};

use super::{
    extract_component_name, html, normalize, IsolationLevel, PreviewError, PreviewOutcome, PreviewRequest,
    RenderedPreview, Renderer,
};
use crate::tokens::DesignTokens;

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; script-src 'self' 'unsafe-inline' 'unsafe-eval'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https: http:; connect-src 'self'";

/// Scripts the document loads; served from the vendor directory.
pub const VENDOR_SCRIPTS: &[&str] = &[
    "/vendor/react.production.min.js",
    "/vendor/react-dom.production.min.js",
    "/vendor/babel-standalone.min.js",
];

const FRAME_SANDBOX: &str = "allow-scripts";

static SLOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__UI_FORGE_([A-Z_]+)__").expect("slot pattern"));

const DOCUMENT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <meta http-equiv="Content-Security-Policy" content="__UI_FORGE_CSP__">
  <title>Component preview</title>
__UI_FORGE_SCRIPTS__
  <style>
__UI_FORGE_VARIABLES__
    * { box-sizing: border-box; }
    body {
      margin: 0;
      min-height: 100vh;
      background: var(--color-bg);
      color: var(--color-fg);
      font-family: var(--font-sans);
      -webkit-font-smoothing: antialiased;
    }
    ::-webkit-scrollbar { width: 8px; height: 8px; }
    ::-webkit-scrollbar-track { background: var(--color-muted); }
    ::-webkit-scrollbar-thumb { background: var(--color-border); border-radius: var(--radius-sm); }
    .error-panel {
      margin: 24px;
      padding: 24px;
      border: 2px solid var(--color-destructive);
      border-radius: var(--radius-lg);
      background: rgba(239, 68, 68, 0.1);
    }
    .error-panel h3 { margin: 0 0 8px; color: var(--color-destructive); }
    .error-panel pre { margin: 0; white-space: pre-wrap; word-break: break-word; font-family: var(--font-mono); font-size: 13px; }
  </style>
  <style>
__UI_FORGE_COMPONENT_CSS__
  </style>
</head>
<body>
  <div id="root"></div>
  <script>
    (function () {
      var root = document.getElementById('root');

      function showPanel(title, message) {
        root.innerHTML = '';
        var panel = document.createElement('div');
        panel.className = 'error-panel';
        panel.setAttribute('role', 'alert');
        var heading = document.createElement('h3');
        heading.textContent = title;
        var detail = document.createElement('pre');
        detail.textContent = message;
        panel.appendChild(heading);
        panel.appendChild(detail);
        root.appendChild(panel);
      }

      window.addEventListener('error', function (event) {
        event.preventDefault();
        var message = (event.error && event.error.message) || event.message || 'An unknown error occurred.';
        showPanel('🔴 Runtime error', message);
      });

      try {
        window.tokens = __UI_FORGE_TOKENS__;
        ['useState', 'useEffect', 'useLayoutEffect', 'useRef', 'useCallback', 'useMemo', 'useReducer', 'useId', 'Fragment']
          .forEach(function (name) { window[name] = React[name]; });

        var source = __UI_FORGE_SOURCE__;
        var name = null;
        var declared = source.match(/export\s+default\s+function\s+([A-Za-z_$][\w$]*)/) ||
          source.match(/^[ \t]*default\s+function\s+([A-Za-z_$][\w$]*)/m);
        if (declared) {
          name = declared[1];
          source = source
            .replace(/export\s+default\s+function\s+([A-Za-z_$][\w$]*)/, 'window.$1 = function $1')
            .replace(/^([ \t]*)default\s+function\s+([A-Za-z_$][\w$]*)/m, '$1window.$2 = function $2');
        } else {
          var named = source.match(/export\s+default\s+([A-Za-z_$][\w$]*)\s*;?/);
          if (named) {
            name = named[1];
            source = source.replace(named[0], 'window.' + name + ' = ' + name + ';');
          }
        }
        source = source.replace(/^([ \t]*)export\s+/gm, '$1');
        if (!name) {
          throw new Error('Could not find a component to render. Declare it as export default function ComponentName().');
        }

        var compiled = Babel.transform(source, {
          presets: ['typescript', 'react'],
          filename: 'dynamic-component.tsx'
        }).code;
        (0, eval)(compiled);

        var Component = window[name];
        if (typeof Component !== 'function') {
          throw new Error('The generated artifact is not a component');
        }
        ReactDOM.createRoot(root).render(React.createElement(Component));
      } catch (error) {
        showPanel('⚠️ Component initialization failed', (error && error.message) || String(error));
      }
    })();
  </script>
</body>
</html>"#;

pub struct IsolatedRenderer {
    tokens: Arc<DesignTokens>,
}

impl IsolatedRenderer {
    pub fn new(tokens: Arc<DesignTokens>) -> Self {
        Self { tokens }
    }

    /// Builds the standalone document, returning it with the component name
    /// found on this side, if any.
    pub fn document(&self, request: &PreviewRequest) -> Result<(String, Option<String>), PreviewError> {
        if request.code.trim().is_empty() {
            return Err(PreviewError::EmptySource);
        }
        let normalized = normalize(&request.code);
        let component = extract_component_name(&normalized);

        let source = serde_json::to_string(&normalized).map_err(|err| PreviewError::Document(err.to_string()))?;
        let tokens =
            serde_json::to_string(&self.tokens.to_json()).map_err(|err| PreviewError::Document(err.to_string()))?;
        let scripts = VENDOR_SCRIPTS
            .iter()
            .map(|src| format!("  <script src=\"{src}\"></script>"))
            .collect::<Vec<_>>()
            .join("\n");
        let variables = self.tokens.css_variables(":root");
        let component_css = request.css.as_deref().map(html::escape_style).unwrap_or_default();

        // One pass, so substituted text is never scanned for further slots.
        let document = SLOT.replace_all(DOCUMENT_TEMPLATE, |caps: &Captures| match &caps[1] {
            "CSP" => CONTENT_SECURITY_POLICY.to_string(),
            "SCRIPTS" => scripts.clone(),
            "VARIABLES" => variables.clone(),
            "COMPONENT_CSS" => component_css.clone(),
            "TOKENS" => html::escape_script(&tokens),
            "SOURCE" => html::escape_script(&source),
            _ => caps[0].to_string(),
        });
        Ok((document.into_owned(), component))
    }
}

/// A frame that may run scripts but gets no same-origin access, top
/// navigation, forms or popups.
pub fn sandboxed_frame(document: &str) -> String {
    format!(
        "<iframe title=\"Component preview\" class=\"w-full h-full border-0\" sandbox=\"{FRAME_SANDBOX}\" srcdoc=\"{}\"></iframe>",
        html::escape_attribute(document)
    )
}

#[async_trait]
impl Renderer for IsolatedRenderer {
    fn level(&self) -> IsolationLevel {
        IsolationLevel::Untrusted
    }

    async fn render(&self, request: &PreviewRequest) -> RenderedPreview {
        match self.document(request) {
            Ok((document, component)) => RenderedPreview {
                strategy: IsolationLevel::Untrusted,
                html: sandboxed_frame(&document),
                outcome: PreviewOutcome::Isolated { component },
            },
            Err(err) => RenderedPreview::failed(
                IsolationLevel::Untrusted,
                sandboxed_frame(&html::error_document(&err.to_string())),
                &err,
            ),
        }
    }
}
