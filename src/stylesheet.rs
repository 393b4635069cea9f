//! CSS for the token-backed utility classes a generated component uses.

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

use crate::tokens::DesignTokens;

/// Stylesheets above this size are refused.
pub const MAX_CSS_KB: f64 = 256.0;

const BREAKPOINTS: [(&str, &str); 4] = [("sm", "640px"), ("md", "768px"), ("lg", "1024px"), ("xl", "1280px")];

#[derive(Debug, Error, PartialEq)]
pub enum StylesheetError {
    #[error("generated stylesheet is too large ({kb:.1}KB)")]
    TooLarge { kb: f64 },
}

pub trait StylesheetGenerator: Send + Sync {
    fn generate(&self, code: &str) -> Result<String, StylesheetError>;
}

pub struct TokenStylesheet {
    tokens: Arc<DesignTokens>,
}

impl TokenStylesheet {
    pub fn new(tokens: Arc<DesignTokens>) -> Self {
        Self { tokens }
    }

    /// Declarations for a single utility without variants, if it is one we back.
    fn declarations(&self, utility: &str) -> Option<String> {
        match utility {
            "border" => return Some("border-width:1px;border-style:solid".into()),
            "rounded" => return self.tokens.radius.get("md").map(|r| format!("border-radius:{r}")),
            "rounded-full" => return Some("border-radius:9999px".into()),
            "rounded-none" => return Some("border-radius:0".into()),
            "shadow" => return self.tokens.shadow.get("md").map(|s| format!("box-shadow:{s}")),
            _ => {}
        }

        let (prefix, value) = utility.split_once('-')?;
        match prefix {
            "bg" => self.color(value).map(|c| format!("background-color:{c}")),
            "text" => self.color(value).map(|c| format!("color:{c}")),
            "border" => self.color(value).map(|c| format!("border-color:{c}")),
            "rounded" => self.tokens.radius.get(value).map(|r| format!("border-radius:{r}")),
            "shadow" => self.tokens.shadow.get(value).map(|s| format!("box-shadow:{s}")),
            _ => {
                let properties = spacing_properties(prefix)?;
                let length = self.spacing(value)?;
                Some(properties.iter().map(|p| format!("{p}:{length}")).collect::<Vec<_>>().join(";"))
            }
        }
    }

    /// `primary` or `primary/50`.
    fn color(&self, value: &str) -> Option<String> {
        let (name, alpha) = match value.split_once('/') {
            Some((name, alpha)) => (name, Some(alpha.parse::<u8>().ok().filter(|a| *a <= 100)?)),
            None => (value, None),
        };
        let color = self.tokens.colors.get(name)?;
        Some(match alpha {
            Some(alpha) => format!("color-mix(in srgb,{color} {alpha}%,transparent)"),
            None => color.clone(),
        })
    }

    /// Token names first, then the numeric quarter-rem scale.
    fn spacing(&self, value: &str) -> Option<String> {
        if let Some(length) = self.tokens.spacing.get(value) {
            return Some(length.clone());
        }
        match value {
            "0" => Some("0".into()),
            "px" => Some("1px".into()),
            "auto" => Some("auto".into()),
            _ => {
                let steps: f64 = value.parse().ok().filter(|s: &f64| s.is_finite() && *s > 0.0)?;
                Some(format!("{}rem", steps * 0.25))
            }
        }
    }
}

impl StylesheetGenerator for TokenStylesheet {
    fn generate(&self, code: &str) -> Result<String, StylesheetError> {
        let mut base = Vec::new();
        let mut media: IndexMap<&str, Vec<String>> = IndexMap::new();

        for class in class_names(code) {
            let mut parts: Vec<&str> = class.split(':').collect();
            let Some(utility) = parts.pop() else { continue };
            let Some(declarations) = self.declarations(utility) else { continue };

            let mut breakpoint = None;
            let mut pseudo = String::new();
            let mut supported = true;
            for variant in parts {
                match variant {
                    "hover" | "focus" | "active" => {
                        pseudo.push(':');
                        pseudo.push_str(variant);
                    }
                    _ => match BREAKPOINTS.iter().find(|(name, _)| *name == variant) {
                        Some((_, width)) if breakpoint.is_none() => breakpoint = Some(*width),
                        _ => supported = false,
                    },
                }
            }
            if !supported {
                continue;
            }

            let rule = format!(".{}{pseudo}{{{declarations}}}", escape_selector(&class));
            match breakpoint {
                Some(width) => media.entry(width).or_default().push(rule),
                None => base.push(rule),
            }
        }

        let mut css = base.join("\n");
        for (width, rules) in media {
            css.push_str(&format!("\n@media (min-width: {width}) {{\n{}\n}}", rules.join("\n")));
        }

        let css = optimize_css(&css);
        let kb = css_size_kb(&css);
        if kb > MAX_CSS_KB {
            return Err(StylesheetError::TooLarge { kb });
        }
        Ok(css)
    }
}

fn spacing_properties(prefix: &str) -> Option<&'static [&'static str]> {
    Some(match prefix {
        "p" => &["padding"],
        "px" => &["padding-left", "padding-right"],
        "py" => &["padding-top", "padding-bottom"],
        "pt" => &["padding-top"],
        "pb" => &["padding-bottom"],
        "pl" => &["padding-left"],
        "pr" => &["padding-right"],
        "m" => &["margin"],
        "mx" => &["margin-left", "margin-right"],
        "my" => &["margin-top", "margin-bottom"],
        "mt" => &["margin-top"],
        "mb" => &["margin-bottom"],
        "ml" => &["margin-left"],
        "mr" => &["margin-right"],
        "gap" => &["gap"],
        _ => return None,
    })
}

/// Every distinct class named by a `className` attribute, in first-seen order.
///
/// Quoted values are taken whole. For `className={...}` every string literal
/// inside the braces counts, and template literals contribute their static
/// parts.
pub fn class_names(code: &str) -> IndexSet<String> {
    let mut classes = IndexSet::new();
    let bytes = code.as_bytes();
    let mut rest = 0;

    while let Some(found) = code[rest..].find("className") {
        let mut i = rest + found + "className".len();
        rest = i;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut chunks = Vec::new();
        match bytes.get(i) {
            Some(b'"') | Some(b'\'') => {
                if let Some((text, end)) = quoted(code, i) {
                    chunks.push(text);
                    rest = end;
                }
            }
            Some(b'{') => {
                let mut depth = 0usize;
                while i < bytes.len() {
                    match bytes[i] {
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        b'"' | b'\'' | b'`' => {
                            if let Some((text, end)) = quoted(code, i) {
                                chunks.push(text);
                                i = end;
                                continue;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                rest = i.min(bytes.len());
            }
            _ => {}
        }

        for chunk in chunks {
            classes.extend(chunk.split_whitespace().map(str::to_string));
        }
    }
    classes
}

/// The literal starting at `start` and the index just past it. Template
/// literals yield their text with `${...}` holes blanked out.
fn quoted(code: &str, start: usize) -> Option<(String, usize)> {
    let bytes = code.as_bytes();
    let quote = bytes[start];
    let mut text = String::new();
    let mut i = start + 1;
    let mut segment = i;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => {
                text.push_str(&code[segment..i]);
                return Some((text, i + 1));
            }
            b'$' if quote == b'`' && bytes.get(i + 1) == Some(&b'{') => {
                text.push_str(&code[segment..i]);
                text.push(' ');
                let mut depth = 0usize;
                while i < bytes.len() {
                    match bytes[i] {
                        b'{' => depth += 1,
                        b'}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
                i += 1;
                segment = i;
            }
            _ => i += 1,
        }
    }
    None
}

fn escape_selector(class: &str) -> String {
    let mut out = String::with_capacity(class.len());
    for c in class.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            out.push(c);
        } else {
            out.push('\\');
            out.push(c);
        }
    }
    out
}

/// Drops comments and collapses whitespace around punctuation.
pub fn optimize_css(css: &str) -> String {
    let mut without_comments = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        without_comments.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    without_comments.push_str(rest);

    let mut out = String::with_capacity(without_comments.len());
    let mut pending_space = false;
    for c in without_comments.chars() {
        if c.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if matches!(c, '{' | '}' | ':' | ';' | ',') {
            pending_space = false;
        } else if pending_space && !out.ends_with(['{', '}', ':', ';', ',']) {
            out.push(' ');
        }
        pending_space = false;
        out.push(c);
    }
    out
}

pub fn css_size_kb(css: &str) -> f64 {
    css.len() as f64 / 1024.0
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn generator() -> TokenStylesheet {
        TokenStylesheet::new(Arc::new(DesignTokens::embedded().unwrap()))
    }

    #[test]
    fn collects_classes_from_every_literal_form() {
        let code = r#"
            <div className="bg-bg p-4">
              <a className='text-fg'>x</a>
              <button className={active ? "bg-primary" : `bg-muted ${size} rounded-lg`}>y</button>
            </div>
        "#;
        let classes: Vec<_> = class_names(code).into_iter().collect();
        assert_eq!(classes, ["bg-bg", "p-4", "text-fg", "bg-primary", "bg-muted", "rounded-lg"]);
    }

    #[test]
    fn emits_rules_for_token_backed_utilities() {
        let css = generator()
            .generate(r#"<div className="bg-primary/50 text-fg px-md gap-2 rounded-lg shadow-sm flex">x</div>"#)
            .unwrap();
        assert!(css.contains(".bg-primary\\/50{background-color:color-mix(in srgb,#FF422E 50%,transparent)}"));
        assert!(css.contains(".text-fg{color:#FAFAFA}"));
        assert!(css.contains(".px-md{padding-left:0.75rem;padding-right:0.75rem}"));
        assert!(css.contains(".gap-2{gap:0.5rem}"));
        assert!(css.contains(".rounded-lg{border-radius:0.75rem}"));
        assert!(!css.contains(".flex"));
    }

    #[test]
    fn variants_become_pseudo_classes_and_media_queries() {
        let css = generator()
            .generate(r#"<a className="hover:bg-accent md:p-8 md:hover:text-primary">x</a>"#)
            .unwrap();
        assert!(css.contains(".hover\\:bg-accent:hover{background-color:#37383C}"));
        assert!(css.contains("@media (min-width:768px){.md\\:p-8{padding:2rem}"));
        assert!(css.contains(".md\\:hover\\:text-primary:hover{color:#FF422E}"));
    }

    #[test]
    fn optimize_strips_comments_and_whitespace() {
        let css = "/* header */\n.a {\n  color : red ;\n}\n\n.b , .c { margin: 0 auto; }";
        assert_eq!(optimize_css(css), ".a{color:red;}.b,.c{margin:0 auto;}");
    }

    #[test]
    fn no_classes_means_an_empty_sheet() {
        assert_eq!(generator().generate("export default function A() { return null; }").unwrap(), "");
    }
}
