//! HTML fragments shared by both renderers.

pub const REGENERATE_HINT: &str =
    "Hint: the generated code may have a syntax error. Delete this component and regenerate it.";

/// Containment styles for inline previews: own stacking context, layout,
/// style and paint containment, scrolling kept inside the box.
pub const CONTAINER_STYLE: &str = "position:relative;isolation:isolate;contain:layout style paint;overflow:auto";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

/// Escapes text for use inside a double-quoted attribute value.
pub fn escape_attribute(text: &str) -> String {
    escape_html(text)
}

/// Keeps stylesheet text from closing its `<style>` element early.
pub fn escape_style(css: &str) -> String {
    css.replace("</", "<\\/")
}

/// Keeps script text from closing its `<script>` element or opening an HTML
/// comment.
pub fn escape_script(code: &str) -> String {
    code.replace("</", "<\\/").replace("<!--", "<\\!--")
}

/// Wraps a mounted component in the containment box.
pub fn inline_container(body: &str, css: Option<&str>) -> String {
    let style = css
        .filter(|css| !css.trim().is_empty())
        .map(|css| format!("<style>{}</style>", escape_style(css)))
        .unwrap_or_default();
    format!(
        "<div class=\"w-full h-full relative\" data-component-loaded=\"true\" data-testid=\"dynamic-preview-loaded\" style=\"{CONTAINER_STYLE}\">{style}{body}</div>"
    )
}

/// Panel for failures before anything was mounted.
pub fn render_error_panel(message: &str) -> String {
    format!(
        concat!(
            "<div class=\"min-h-[500px] flex items-center justify-center p-8\" data-testid=\"dynamic-preview-error\">",
            "<div class=\"bg-destructive/10 border-2 border-destructive rounded-lg p-6 max-w-2xl w-full\">",
            "<h3 class=\"text-lg font-semibold text-destructive mb-2\">⚠️ Render error</h3>",
            "<pre class=\"text-sm text-fg whitespace-pre-wrap break-words font-mono\">{}</pre>",
            "<p class=\"text-xs text-muted-foreground mt-4\">Generated code must declare <code>export default function ComponentName()</code>.</p>",
            "</div></div>"
        ),
        escape_html(message)
    )
}

/// Panel shown by the error boundary when a mounted component throws.
pub fn runtime_error_panel(message: &str, stack: &str) -> String {
    let message = if message.trim().is_empty() {
        "An unknown error occurred."
    } else {
        message
    };
    let stack = if stack.trim().is_empty() {
        String::new()
    } else {
        format!(
            "<details class=\"mt-4\"><summary class=\"cursor-pointer text-sm text-muted-foreground\">Show stack trace</summary><pre class=\"mt-2 text-xs overflow-auto\">{}</pre></details>",
            escape_html(stack)
        )
    };
    format!(
        concat!(
            "<div class=\"p-6 bg-destructive/10 border-2 border-destructive rounded-lg\" role=\"alert\" data-testid=\"preview-runtime-error\">",
            "<h3 class=\"text-lg font-semibold text-destructive mb-2\">🔴 Runtime error</h3>",
            "<p class=\"text-sm text-fg\">{}</p>{}</div>"
        ),
        escape_html(message),
        stack
    )
}

/// Standalone document shown in place of a preview that could not be built.
pub fn error_document(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta http-equiv="Content-Security-Policy" content="default-src 'none'; style-src 'unsafe-inline'; connect-src 'self'">
  <style>
    body {{ margin: 0; padding: 20px; font-family: system-ui, sans-serif; background: #0a0a0a; color: #fafafa; }}
    .error-container {{ padding: 20px; background: rgba(239, 68, 68, 0.1); border: 2px solid #ef4444; border-radius: 8px; }}
    h2 {{ margin: 0 0 12px; color: #ef4444; }}
    pre {{ white-space: pre-wrap; word-break: break-word; font-size: 13px; }}
  </style>
</head>
<body>
  <div class="error-container">
    <h2>⚠️ Preview error</h2>
    <pre>{}</pre>
  </div>
</body>
</html>"#,
        escape_html(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_is_escaped() {
        assert_eq!(escape_html("<script>\"x\"</script>"), "&lt;script&gt;&quot;x&quot;&lt;/script&gt;");
        assert_eq!(escape_html("Tom & Jerry's"), "Tom &amp; Jerry&#x27;s");
    }

    #[test]
    fn panels_escape_their_text() {
        let panel = render_error_panel("<b>oops</b>");
        assert!(panel.contains("&lt;b&gt;oops&lt;/b&gt;"));
        assert!(!panel.contains("<b>oops"));

        let doc = error_document("</pre><script>alert(1)</script>");
        assert!(!doc.contains("<script>alert"));
    }

    #[test]
    fn runtime_panel_falls_back_to_generic_message() {
        let panel = runtime_error_panel("", "");
        assert!(panel.contains("An unknown error occurred."));
        assert!(!panel.contains("<details"));

        let panel = runtime_error_panel("boom", "at Card");
        assert!(panel.contains("Show stack trace"));
        assert!(panel.contains("at Card"));
    }

    #[test]
    fn container_holds_scoped_styles() {
        let html = inline_container("<p>x</p>", Some(".a{color:red}</style>"));
        assert!(html.contains("contain:layout style paint"));
        assert!(html.contains("<style>.a{color:red}<\\/style></style>"));
        assert!(inline_container("<p>x</p>", Some("  ")).find("<style>").is_none());
    }
}
