//! Finds the identifier of the component a source file defines.

use std::sync::LazyLock;

use regex::Regex;

use super::lexical;

static EXPORT_DEFAULT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bexport\s+default\s+(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)").expect("export pattern")
});

/// Generators sometimes drop the `export`; tolerated when it starts a line.
static BARE_DEFAULT_FUNCTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*default\s+function\s+([A-Za-z_$][\w$]*)").expect("default pattern")
});

static EXPORT_DEFAULT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)\bexport\s+default\s+([A-Za-z_$][\w$]*)[ \t]*;?[ \t]*$").expect("export name pattern")
});

static FUNCTION_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfunction\s+([A-Za-z_$][\w$]*)\s*\(").expect("function pattern"));

static VARIABLE_DECLARATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=").expect("variable pattern"));

const RESERVED: &[&str] = &["function", "class", "async", "new", "await"];

/// Returns the component identifier, or `None` when nothing mountable is
/// declared. Comments and string contents are ignored.
pub fn extract_component_name(source: &str) -> Option<String> {
    let masked = lexical::mask(source);
    let text = masked.text();

    if let Some(caps) = EXPORT_DEFAULT_FUNCTION.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = BARE_DEFAULT_FUNCTION.captures(text) {
        return Some(caps[1].to_string());
    }
    if let Some(caps) = EXPORT_DEFAULT_NAME
        .captures_iter(text)
        .find(|caps| !RESERVED.contains(&&caps[1]))
    {
        return Some(caps[1].to_string());
    }

    let depths = brace_depths(text);
    let top_level = |start: usize| depths.get(start).copied() == Some(0);
    FUNCTION_DECLARATION
        .captures_iter(text)
        .find(|caps| caps.get(0).is_some_and(|m| top_level(m.start())))
        .or_else(|| {
            VARIABLE_DECLARATION
                .captures_iter(text)
                .find(|caps| caps.get(0).is_some_and(|m| top_level(m.start())))
        })
        .map(|caps| caps[1].to_string())
}

/// Brace nesting depth at every byte offset.
fn brace_depths(text: &str) -> Vec<usize> {
    let mut depth = 0usize;
    text.bytes()
        .map(|b| {
            let current = depth;
            match b {
                b'{' => depth += 1,
                b'}' => depth = depth.saturating_sub(1),
                _ => {}
            }
            current
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_the_default_export() {
        let source = "function helper() {}\nexport default function PricingTable() {\n  return null;\n}";
        assert_eq!(extract_component_name(source).as_deref(), Some("PricingTable"));
    }

    #[test]
    fn tolerates_missing_export_keyword() {
        let source = "const x = 1;\ndefault function Broken() { return null; }";
        assert_eq!(extract_component_name(source).as_deref(), Some("Broken"));
    }

    #[test]
    fn follows_default_export_of_an_identifier() {
        let source = "const Badge = () => <span />;\nconst other = 2;\nexport default Badge;\n";
        assert_eq!(extract_component_name(source).as_deref(), Some("Badge"));
    }

    #[test]
    fn falls_back_to_top_level_declarations() {
        let source = "function App() {\n  function inner() {}\n  return null;\n}";
        assert_eq!(extract_component_name(source).as_deref(), Some("App"));

        let source = "const Hero = () => {\n  const title = 'x';\n  return <h1>{title}</h1>;\n};";
        assert_eq!(extract_component_name(source).as_deref(), Some("Hero"));
    }

    #[test]
    fn ignores_names_in_comments_and_strings() {
        let source = "// export default function Fake() {}\nconst note = \"function Nope(\";";
        assert_eq!(extract_component_name(source).as_deref(), Some("note"));
        assert_eq!(extract_component_name("<div>hello</div>"), None);
        assert_eq!(extract_component_name(""), None);
    }
}
