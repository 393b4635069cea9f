//! Structural and security checks on generated code.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

pub const MISSING_COMPONENT: &str = "Code must include a React component function";
pub const SCRIPT_TAG: &str = "Script tags are not allowed";
pub const RAW_HTML: &str = "dangerouslySetInnerHTML is not allowed";

static COMPONENT_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"export\s+default\s+function\s+\w+",
        // Generators sometimes emit a bare `default function`.
        r"(?m)^\s*default\s+function\s+\w+",
        r"function\s+\w+\s*\(",
        r"\b(?:const|let|var)\s+[A-Z]\w*\s*=\s*(?:async\s*)?\([^)]*\)\s*=>",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("component pattern"))
    .collect()
});

static SCRIPT_OPEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<script").expect("script pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self { valid: true, reason: None }
    }

    fn fail(reason: &str) -> Self {
        Self {
            valid: false,
            reason: Some(reason.to_string()),
        }
    }
}

pub fn validate_generated_code(code: &str) -> ValidationResult {
    if !COMPONENT_PATTERNS.iter().any(|pattern| pattern.is_match(code)) {
        return ValidationResult::fail(MISSING_COMPONENT);
    }
    if SCRIPT_OPEN.is_match(code) {
        return ValidationResult::fail(SCRIPT_TAG);
    }
    if code.contains("dangerouslySetInnerHTML") {
        return ValidationResult::fail(RAW_HTML);
    }
    ValidationResult::pass()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_component_shapes() {
        for code in [
            "export default function Button() { return <button />; }",
            "default function Button() { return null; }",
            "function Card(props) { return null; }",
            "const Hero = ({ title }) => <h1>{title}</h1>;",
        ] {
            assert!(validate_generated_code(code).valid, "{code}");
        }
    }

    #[test]
    fn rejects_code_without_a_component() {
        let result = validate_generated_code("<div>Just markup</div>");
        assert_eq!(result.reason.as_deref(), Some(MISSING_COMPONENT));
        assert!(!validate_generated_code("const helper = (x) => x * 2;").valid);
    }

    #[test]
    fn security_rules_apply_regardless_of_structure() {
        let code = "export default function A() { return <div><SCRIPT src=x></SCRIPT></div>; }";
        assert_eq!(validate_generated_code(code).reason.as_deref(), Some(SCRIPT_TAG));

        let code = "function A() { return <div dangerouslySetInnerHTML={{ __html: x }} />; }";
        assert_eq!(validate_generated_code(code).reason.as_deref(), Some(RAW_HTML));
    }

    #[test]
    fn structural_reason_comes_first() {
        let result = validate_generated_code("<script>alert(1)</script>");
        assert_eq!(result.reason.as_deref(), Some(MISSING_COMPONENT));
    }
}
