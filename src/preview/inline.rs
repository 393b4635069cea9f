//! In-process rendering on the embedded script engine.
//!
//! There is no script sandboxing here beyond the engine's limits: the
//! component runs with the host `React` runtime and its markup is only
//! visually contained by the wrapper's CSS. Use it for code the operator
//! trusts.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use boa_engine::JsValue;
use regex::Regex;
use tokio::sync::OnceCell;

use super::boundary::ErrorBoundary;
use super::transpile::{Transpiler, TranspilerHandle};
use super::{
    extract_component_name, html, lexical, normalize, IsolationLevel, PreviewError, PreviewOutcome, PreviewRequest,
    RenderedPreview, Renderer, SOURCE_FILENAME,
};
use crate::script::react::HostRuntime;
use crate::script::{self, ScriptError, DEFAULT_STEP_LIMIT};
use crate::tokens::DesignTokens;

static EXPORT_DEFAULT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bexport\s+default\s+").expect("export default pattern"));

static LEADING_EXPORT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)export\s+").expect("export pattern"));

static LEADING_DEFAULT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)default\s+(function\b)").expect("default pattern"));

/// Hooks the wrapper binds as locals for the component body.
const RUNTIME_BINDINGS: &str =
    "useState, useEffect, useLayoutEffect, useRef, useCallback, useMemo, useReducer, useId, Fragment, createElement";

/// Selector the design-token variables are scoped to.
const CONTAINER_SELECTOR: &str = "[data-testid=\"dynamic-preview-loaded\"]";

pub struct InlineRenderer {
    tokens: Arc<DesignTokens>,
    transpiler: Arc<TranspilerHandle>,
    base_styles: OnceCell<String>,
    step_limit: u64,
}

impl InlineRenderer {
    pub fn new(tokens: Arc<DesignTokens>, transpiler: Arc<TranspilerHandle>) -> Self {
        Self {
            tokens,
            transpiler,
            base_styles: OnceCell::new(),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }

    pub fn with_step_limit(mut self, step_limit: u64) -> Self {
        self.step_limit = step_limit;
        self
    }

    /// Token variables for the container, built on first use.
    async fn base_styles(&self) -> &str {
        self.base_styles
            .get_or_init(|| async { self.tokens.css_variables(CONTAINER_SELECTOR) })
            .await
    }

    async fn mount(&self, request: &PreviewRequest) -> Result<RenderedPreview, PreviewError> {
        if request.code.trim().is_empty() {
            return Err(PreviewError::EmptySource);
        }

        // Both must be ready before anything is compiled; either may finish first.
        let (base_styles, transpiler) = tokio::join!(self.base_styles(), self.transpiler.ready());
        let transpiler = transpiler?;

        let code = request.code.clone();
        let tokens = self.tokens.to_json();
        let step_limit = self.step_limit;
        let mounted = tokio::task::spawn_blocking(move || mount_component(&code, transpiler.as_ref(), &tokens, step_limit))
            .await
            .map_err(|err| PreviewError::Evaluation(ScriptError::new("Error", format!("render task failed: {err}"))))??;

        let css = match request.css.as_deref() {
            Some(css) if !css.trim().is_empty() => format!("{base_styles}\n{css}"),
            _ => base_styles.to_string(),
        };
        let outcome = match mounted.runtime_error {
            Some(err) => PreviewOutcome::RuntimeError {
                component: mounted.component,
                message: err.to_string(),
            },
            None => PreviewOutcome::Mounted {
                component: mounted.component,
            },
        };
        Ok(RenderedPreview {
            strategy: IsolationLevel::Trusted,
            html: html::inline_container(&mounted.html, Some(&css)),
            outcome,
        })
    }
}

#[async_trait]
impl Renderer for InlineRenderer {
    fn level(&self) -> IsolationLevel {
        IsolationLevel::Trusted
    }

    async fn render(&self, request: &PreviewRequest) -> RenderedPreview {
        match self.mount(request).await {
            Ok(preview) => preview,
            Err(err) => RenderedPreview::failed(IsolationLevel::Trusted, html::render_error_panel(&err.to_string()), &err),
        }
    }
}

struct Mounted {
    component: String,
    html: String,
    runtime_error: Option<ScriptError>,
}

fn mount_component(
    source: &str,
    transpiler: &dyn Transpiler,
    tokens: &serde_json::Value,
    step_limit: u64,
) -> Result<Mounted, PreviewError> {
    let normalized = normalize(source);
    let component = extract_component_name(&normalized).ok_or(PreviewError::ComponentNotFound)?;
    let body = strip_exports(&normalized);
    let transpiled = transpiler.transpile(&body, SOURCE_FILENAME)?;

    let mut context = script::context(step_limit);
    let runtime = HostRuntime::install(&mut context, step_limit).map_err(PreviewError::Evaluation)?;
    let tokens = JsValue::from_json(tokens, &mut context)
        .map_err(|err| PreviewError::Evaluation(script::script_error(&err, &mut context)))?;

    let factory = script::eval(&mut context, &wrap_component(&transpiled, &component)).map_err(PreviewError::Compile)?;
    let value = script::call(&mut context, &factory, &[runtime.react().clone(), tokens])
        .map_err(PreviewError::Evaluation)?;
    if !value.is_callable() {
        return Err(PreviewError::NotAComponent(script::type_name(&value).to_string()));
    }

    let mut boundary = ErrorBoundary::new();
    let html = boundary.render(|| runtime.render(&mut context, &value));
    tracing::debug!(component = %component, failed = boundary.has_error(), "🧱 Component rendered");

    Ok(Mounted {
        component,
        html,
        runtime_error: boundary.error().cloned(),
    })
}

/// Removes module syntax a classic script cannot contain. String and comment
/// contents are left alone.
fn strip_exports(source: &str) -> String {
    let masked = lexical::mask(source);
    let text = EXPORT_DEFAULT.replace_all(masked.text(), "");
    let text = LEADING_EXPORT.replace_all(&text, "$1");
    let text = LEADING_DEFAULT.replace_all(&text, "$1$2");
    masked.restore(&text)
}

/// The body as a factory expression, `(function DynamicComponent(React, tokens) { ... })`.
/// The body gets its own block so it may re-declare the hook bindings, and the
/// header stays on one line so engine positions are off by one at most.
fn wrap_component(transpiled: &str, component: &str) -> String {
    format!(
        "(function DynamicComponent(React, tokens) {{ \"use strict\"; const {{ {RUNTIME_BINDINGS} }} = React; {{\n{transpiled}\nreturn {component};\n}} }})"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::transpile::{LoadError, TranspilerLoader};

    fn renderer() -> InlineRenderer {
        let tokens = Arc::new(DesignTokens::embedded().unwrap());
        InlineRenderer::new(tokens, Arc::new(TranspilerHandle::builtin()))
    }

    async fn render(code: &str) -> RenderedPreview {
        renderer()
            .render(&PreviewRequest {
                code: code.to_string(),
                css: None,
            })
            .await
    }

    #[tokio::test]
    async fn mounts_a_typescript_component() {
        let code = r#"import React, { useState } from 'react';

interface ButtonProps {
  label: string
}

export default function PrimaryButton({ label = "Save" }: ButtonProps) {
  const [count, setCount] = useState<number>(0);
  return (
    <button className="bg-primary rounded-md" onClick={() => setCount(count + 1)}>
      {label} ({count})
    </button>
  );
}
"#;
        let preview = render(code).await;
        assert_eq!(
            preview.outcome,
            PreviewOutcome::Mounted {
                component: "PrimaryButton".into()
            }
        );
        assert!(preview.html.contains("<button class=\"bg-primary rounded-md\">Save (0)</button>"), "{}", preview.html);
        assert!(preview.html.contains("data-component-loaded=\"true\""));
    }

    #[tokio::test]
    async fn tokens_are_available_to_the_component() {
        let code = "export default function Swatch() {\n  return <div style={{ background: tokens.colors.primary }}>x</div>;\n}";
        let preview = render(code).await;
        let primary = DesignTokens::embedded().unwrap().colors["primary"].clone();
        assert!(preview.html.contains(&primary), "{}", preview.html);
    }

    #[tokio::test]
    async fn empty_source_is_reported() {
        let preview = render("   ").await;
        assert!(matches!(&preview.outcome, PreviewOutcome::Failed { kind, .. } if kind == "empty_source"));
        assert!(preview.html.contains("Render error"));
    }

    #[tokio::test]
    async fn missing_component_is_actionable() {
        let preview = render("<div>orphan markup</div>").await;
        match &preview.outcome {
            PreviewOutcome::Failed { kind, message } => {
                assert_eq!(kind, "component_not_found");
                assert!(message.contains("export default function ComponentName()"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn transpile_failures_suggest_regenerating() {
        let preview = render("export default function Broken() {\n  return <div><span></div>;\n}").await;
        match &preview.outcome {
            PreviewOutcome::Failed { kind, message } => {
                assert_eq!(kind, "transpile");
                assert!(message.contains("regenerate"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_function_exports_are_rejected() {
        let preview = render("const Config = { title: 'x' };\nexport default Config;").await;
        assert!(matches!(&preview.outcome, PreviewOutcome::Failed { kind, .. } if kind == "not_a_component"));
    }

    #[tokio::test]
    async fn render_errors_are_contained_by_the_boundary() {
        let code = "export default function Exploding() {\n  const data = null;\n  return <p>{data.title}</p>;\n}";
        let preview = render(code).await;
        match &preview.outcome {
            PreviewOutcome::RuntimeError { component, message } => {
                assert_eq!(component, "Exploding");
                assert!(message.contains("TypeError"), "{message}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(preview.html.contains("Runtime error"));
        assert!(preview.html.contains("dynamic-preview-loaded"));
    }

    #[tokio::test]
    async fn forms_with_regex_validation_mount() {
        let code = r#"import { useState } from "react";

export default function SignupForm() {
  const [email, setEmail] = useState<string>("ada@example.com");
  const valid = /^[^\s@]+@[^\s@]+\.[^\s@]+$/.test(email);
  return (
    <form className="space-y-2">
      <input type="email" value={email} onChange={(e) => setEmail(e.target.value)} />
      {valid ? <p>Looks good</p> : <p>Enter a valid email</p>}
    </form>
  );
}
"#;
        let preview = render(code).await;
        assert_eq!(
            preview.outcome,
            PreviewOutcome::Mounted {
                component: "SignupForm".into()
            }
        );
        assert!(preview.html.contains("<p>Looks good</p>"), "{}", preview.html);
    }

    #[tokio::test]
    async fn huge_allocations_fail_the_render_not_the_process() {
        let code = "export default function Grid() {\n  const cells = Array.from({ length: 1e12 }, (_, i) => i);\n  return <div>{cells.length}</div>;\n}";
        let preview = render(code).await;
        match &preview.outcome {
            PreviewOutcome::RuntimeError { component, message } => {
                assert_eq!(component, "Grid");
                assert!(message.starts_with("RangeError"), "{message}");
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn syntax_errors_outside_jsx_are_compile_failures() {
        let preview = render("export default function Broken() {\n  const = 1;\n  return null;\n}").await;
        assert!(matches!(&preview.outcome, PreviewOutcome::Failed { kind, .. } if kind == "compile"), "{:?}", preview.outcome);
    }

    #[tokio::test]
    async fn runaway_loops_hit_the_step_budget() {
        let preview = renderer()
            .with_step_limit(5_000)
            .render(&PreviewRequest {
                code: "export default function Spin() {\n  while (true) {}\n  return null;\n}".into(),
                css: None,
            })
            .await;
        assert!(matches!(preview.outcome, PreviewOutcome::RuntimeError { .. }), "{:?}", preview.outcome);
    }

    struct BrokenLoader;

    #[async_trait]
    impl TranspilerLoader for BrokenLoader {
        async fn load(&self) -> Result<Arc<dyn Transpiler>, LoadError> {
            Err(LoadError("script blocked".into()))
        }
    }

    #[tokio::test]
    async fn transpiler_load_failure_is_its_own_category() {
        let tokens = Arc::new(DesignTokens::embedded().unwrap());
        let renderer = InlineRenderer::new(tokens, Arc::new(TranspilerHandle::new(Arc::new(BrokenLoader))));
        let preview = renderer
            .render(&PreviewRequest {
                code: "export default function A() { return null; }".into(),
                css: None,
            })
            .await;
        assert!(matches!(&preview.outcome, PreviewOutcome::Failed { kind, .. } if kind == "transpiler_unavailable"));
    }

    #[tokio::test]
    async fn components_may_bind_hooks_themselves() {
        let code = "const { useState } = React;\nexport default function Toggle() {\n  const [on] = useState(true);\n  return <span>{on ? 'on' : 'off'}</span>;\n}";
        let preview = render(code).await;
        assert!(preview.html.contains("<span>on</span>"), "{:?}", preview.outcome);
    }

    #[test]
    fn exports_are_stripped_outside_strings() {
        let source = "export default function A() {\n  return \"export default \";\n}\nexport const x = 1;";
        assert_eq!(
            strip_exports(source),
            "function A() {\n  return \"export default \";\n}\nconst x = 1;"
        );
    }
}
