//! Best-effort repair of generated source before it reaches a transpiler.
//!
//! Every rule runs on masked text (see [`lexical`]) so string, template and
//! comment contents are never rewritten. Source that is already plain
//! JavaScript/JSX comes out unchanged.

use std::ops::Range;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::lexical::{self, Masked};

const PRIMITIVE_TYPES: &[&str] = &[
    "string", "number", "boolean", "any", "void", "unknown", "never", "object", "null", "undefined", "bigint",
    "symbol",
];

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*import\s+(?:[\w$*{},\s]+?\s*from\s*)?[\x{E100}-\x{F8FF}][ \t]*;?[ \t]*(?:\r?\n)?")
        .expect("import pattern")
});

static LEADING_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\A(?:[ \t]*\r?\n)+").expect("blank line pattern"));

static TYPE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:interface|type)\s+[A-Za-z_$][\w$]*\s*(?:<[^{};=]*>)?\s*(?:extends\s+[^{};=]+)?=?\s*\{")
        .expect("type block pattern")
});

static TYPE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:readonly\s+)?[A-Za-z_$][\w$]*\??\s*(?:\([^()]*\)\s*)?:\s*[^;,{}]+$").expect("field pattern")
});

static TYPE_ALIAS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ \t]*(?:export[ \t]+)?type[ \t]+[A-Za-z_$][\w$]*(?:<[^=\n]*>)?[ \t]*=[ \t]*[^;{\s]")
        .expect("type alias pattern")
});

static COMMA_TERMINATOR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*);").expect("comma pattern"));

static VAR_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(const|let|var)(\s+)([A-Za-z_$][\w$]*|\{[^{}]*\}|\[[^\[\]]*\])[ \t]*:[ \t]*([^=;\n]+?)[ \t]*(=|;)")
        .expect("variable annotation pattern")
});

static ARROW_PARAM_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(=[ \t]*)([A-Za-z_$][\w$]*)[ \t]*:[ \t]*[A-Z][\w$.]*(?:<[^<>\n]*>)?(?:\[\])*[ \t]*=>")
        .expect("arrow parameter pattern")
});

static ACCESS_MODIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^[ \t]*|[(,][ \t]*)(?:(?:public|private|protected|readonly)[ \t]+)+([A-Za-z_$][\w$]*[ \t]*[?:=;(,)])")
        .expect("modifier pattern")
});

/// Applies every repair rule in order and returns the corrected source.
pub fn normalize(source: &str) -> String {
    let masked = lexical::mask(source);
    let mut text = strip_imports(masked.text());
    text = terminate_type_members(&text, &masked);
    text = collapse_terminators(&text);
    text = COMMA_TERMINATOR.replace_all(&text, ",$1").into_owned();
    text = strip_annotations(&text);
    text = ACCESS_MODIFIER.replace_all(&text, "$1$2").into_owned();
    masked.restore(&text)
}

fn strip_imports(text: &str) -> String {
    let stripped = IMPORT.replace_all(text, "");
    if stripped.len() == text.len() {
        return text.to_string();
    }
    LEADING_BLANK_LINES.replace(&stripped, "").into_owned()
}

// ---- interface / type blocks ----

fn terminate_type_members(text: &str, masked: &Masked) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 32);
    let mut copied = 0;
    for found in TYPE_BLOCK.find_iter(text) {
        if found.start() < copied || previous_significant(bytes, found.start()) == Some(b'.') {
            continue;
        }
        let open = found.end() - 1;
        let Some(close) = matching_close(bytes, open) else {
            continue;
        };
        out.push_str(&text[copied..=open]);
        out.push_str(&terminate_fields(&text[open + 1..close], masked));
        copied = close;
    }
    out.push_str(&text[copied..]);
    terminate_aliases(&out, masked)
}

fn terminate_fields(body: &str, masked: &Masked) -> String {
    let mut lines: Vec<String> = body.split('\n').map(str::to_string).collect();
    let last = lines.len().saturating_sub(1);
    for line in lines.iter_mut().take(last) {
        let content = code_part(line, masked);
        if TYPE_FIELD.is_match(content.trim()) && !ends_terminated(content) {
            let at = content.trim_end().len();
            line.insert(at, ';');
        }
    }
    lines.join("\n")
}

fn terminate_aliases(text: &str, masked: &Masked) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut out = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let content = code_part(line, masked);
        let continued = lines[i + 1..]
            .iter()
            .find(|next| !next.trim().is_empty())
            .is_some_and(|next| next.trim_start().starts_with(['|', '&']));
        let open_ended = content.trim_end().ends_with(['|', '&', '=', ',', '(', '<']);
        if TYPE_ALIAS.is_match(content) && !content.contains('{') && !ends_terminated(content) && !open_ended && !continued {
            let at = content.trim_end().len();
            let mut fixed = line.to_string();
            fixed.insert(at, ';');
            out.push(fixed);
        } else {
            out.push(line.to_string());
        }
    }
    out.join("\n")
}

/// The line without a trailing comment placeholder.
fn code_part<'a>(line: &'a str, masked: &Masked) -> &'a str {
    let trimmed = line.trim_end();
    match trimmed.chars().last() {
        Some(c) if masked.is_comment(c) => &trimmed[..trimmed.len() - c.len_utf8()],
        _ => line,
    }
}

fn ends_terminated(content: &str) -> bool {
    content
        .trim_end()
        .ends_with([';', ',', '{', '}', '[', ']', '(', ')', '=', '>', '<'])
}

// ---- terminators ----

/// Drops a `;` directly before `{` on the same line and folds runs of `;`,
/// outside parentheses so `for (;;)` headers are left alone.
fn collapse_terminators(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            b';' if depth == 0 => {
                let mut run_end = i + 1;
                loop {
                    let next = skip_whitespace(bytes, run_end);
                    if bytes.get(next) == Some(&b';') {
                        run_end = next + 1;
                    } else {
                        break;
                    }
                }
                let after = skip_inline_whitespace(bytes, run_end);
                if bytes.get(after) == Some(&b'{') {
                    out.push_str(&text[copied..i]);
                    if after == run_end && !text[..i].ends_with(char::is_whitespace) {
                        out.push(' ');
                    }
                    copied = run_end;
                } else if run_end > i + 1 {
                    out.push_str(&text[copied..=i]);
                    copied = run_end;
                }
                i = run_end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&text[copied..]);
    out
}

// ---- annotations ----

fn strip_annotations(text: &str) -> String {
    let text = VAR_ANNOTATION.replace_all(text, |caps: &Captures| {
        if looks_like_type(&caps[4]) {
            format!("{}{}{} {}", &caps[1], &caps[2], &caps[3], &caps[5])
        } else {
            caps[0].to_string()
        }
    });
    let text = ARROW_PARAM_ANNOTATION.replace_all(&text, "$1$2 =>");
    strip_signature_types(&text)
}

/// Removes parameter and return-type annotations from function signatures.
fn strip_signature_types(text: &str) -> String {
    let bytes = text.as_bytes();
    let prose = jsx_text_ranges(text);
    let mut cuts: Vec<Range<usize>> = Vec::new();
    for open in bytes.iter().enumerate().filter(|(_, b)| **b == b'(').map(|(i, _)| i) {
        if prose.iter().any(|text| text.contains(&open)) {
            continue;
        }
        let Some(close) = matching_close(bytes, open) else {
            continue;
        };
        let return_type = return_annotation(text, close + 1);
        let after = skip_whitespace(bytes, close + 1);
        let is_signature = return_type.is_some()
            || bytes[after..].starts_with(b"=>")
            || preceded_by_function(bytes, open)
            || (previous_significant(bytes, open).is_some_and(is_ident_byte) && bytes.get(after) == Some(&b'{'));
        if !is_signature {
            continue;
        }
        cuts.extend(parameter_annotations(text, open + 1, close));
        cuts.extend(return_type);
    }
    cuts.sort_by_key(|cut| cut.start);

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    for cut in cuts {
        if cut.start < copied {
            continue;
        }
        out.push_str(&text[copied..cut.start]);
        copied = cut.end;
    }
    out.push_str(&text[copied..]);
    out
}

fn parameter_annotations(text: &str, start: usize, end: usize) -> Vec<Range<usize>> {
    split_top_level(text.as_bytes(), start, end)
        .into_iter()
        .filter_map(|param| parameter_annotation(text, param))
        .collect()
}

fn parameter_annotation(text: &str, param: Range<usize>) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut colon = None;
    let mut default = param.end;
    for i in param.clone() {
        match bytes[i] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b')' | b']' | b'}' | b'>' => depth = depth.saturating_sub(1),
            b':' if depth == 0 && colon.is_none() => colon = Some(i),
            b'=' if depth == 0 && bytes.get(i + 1) != Some(&b'>') && bytes.get(i + 1) != Some(&b'=') => {
                default = i;
                break;
            }
            _ => {}
        }
    }
    let colon = colon.filter(|c| *c < default)?;
    let binding = text[param.start..colon].trim();
    if !is_binding(binding) {
        return None;
    }
    let type_text = text[colon + 1..default].trim();
    if !looks_like_type(type_text) {
        return None;
    }
    let binding_end = param.start + text[param.start..colon].trim_end().len();
    let cut_start = if binding.ends_with('?') { binding_end - 1 } else { binding_end };
    let cut_end = colon + 1 + text[colon + 1..default].trim_end().len();
    Some(cut_start..cut_end)
}

fn is_binding(text: &str) -> bool {
    let text = text.strip_prefix("...").unwrap_or(text);
    if (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']')) {
        return true;
    }
    let name = text.strip_suffix('?').unwrap_or(text);
    name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name.bytes().all(is_ident_byte)
}

/// `: Type` between a signature's `)` and its `{` or `=>`.
fn return_annotation(text: &str, from: usize) -> Option<Range<usize>> {
    let bytes = text.as_bytes();
    let colon = skip_inline_whitespace(bytes, from);
    if bytes.get(colon) != Some(&b':') {
        return None;
    }
    let mut i = colon + 1;
    let mut angle = 0usize;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'=' if bytes.get(i + 1) == Some(&b'>') && angle == 0 => break,
            b'{' if angle == 0 => break,
            b'<' => angle += 1,
            b'>' => angle = angle.checked_sub(1)?,
            b'\n' | b'=' | b';' | b'}' | b'(' | b')' | b'?' => return None,
            _ if is_ident_byte(b) || b >= 0x80 || b" \t.[]|&,".contains(&b) => {}
            _ => return None,
        }
        i += 1;
    }
    if angle != 0 || i >= bytes.len() || !looks_like_type(&text[colon + 1..i]) {
        return None;
    }
    let end = colon + 1 + text[colon + 1..i].trim_end().len();
    Some(from..end)
}

fn looks_like_type(text: &str) -> bool {
    let text = text.trim_start();
    let word_len = text.bytes().take_while(|b| is_ident_byte(*b)).count();
    let word = &text[..word_len];
    word.starts_with(|c: char| c.is_ascii_uppercase()) || PRIMITIVE_TYPES.contains(&word)
}

// ---- scanning helpers ----

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn skip_inline_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while matches!(bytes.get(i), Some(b' ' | b'\t')) {
        i += 1;
    }
    i
}

fn previous_significant(bytes: &[u8], before: usize) -> Option<u8> {
    bytes[..before].iter().rev().find(|b| !b.is_ascii_whitespace()).copied()
}

/// Index of the bracket closing the one at `open`, counting all three kinds.
pub(crate) fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(bytes: &[u8], start: usize, end: usize) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut part_start = start;
    for i in start..end {
        match bytes[i] {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b')' | b']' | b'}' | b'>' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(part_start..i);
                part_start = i + 1;
            }
            _ => {}
        }
    }
    if part_start < end {
        parts.push(part_start..end);
    }
    parts
}

fn preceded_by_function(bytes: &[u8], open: usize) -> bool {
    let mut i = open;
    let skip_back_ws = |mut i: usize| {
        while i > 0 && bytes[i - 1].is_ascii_whitespace() {
            i -= 1;
        }
        i
    };
    i = skip_back_ws(i);
    if i > 0 && bytes[i - 1] == b'>' {
        // generic parameter list
        while i > 0 && bytes[i - 1] != b'<' {
            i -= 1;
        }
        i = skip_back_ws(i.saturating_sub(1));
    }
    let word_end = i;
    while i > 0 && is_ident_byte(bytes[i - 1]) {
        i -= 1;
    }
    if &bytes[i..word_end] == b"function" {
        return true;
    }
    i = skip_back_ws(i);
    if i > 0 && bytes[i - 1] == b'*' {
        i = skip_back_ws(i - 1);
    }
    let keyword_end = i;
    while i > 0 && is_ident_byte(bytes[i - 1]) {
        i -= 1;
    }
    &bytes[i..keyword_end] == b"function"
}

// ---- JSX text ----

/// Byte ranges of JSX text children. They are prose, so a `word (a: B) {`
/// inside them is never a signature.
fn jsx_text_ranges(text: &str) -> Vec<Range<usize>> {
    let mut scanner = JsxScanner {
        bytes: text.as_bytes(),
        pos: 0,
        prose: Vec::new(),
    };
    scanner.code(false);
    scanner.prose
}

struct JsxScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
    prose: Vec<Range<usize>>,
}

impl JsxScanner<'_> {
    /// Code up to the `}` closing an expression container, or to the end.
    fn code(&mut self, in_container: bool) {
        let mut depth = 0usize;
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'{' => depth += 1,
                b'}' if depth == 0 && in_container => {
                    self.pos += 1;
                    return;
                }
                b'}' => depth = depth.saturating_sub(1),
                b'<' if self.tag_ahead() => {
                    self.element();
                    continue;
                }
                _ => {}
            }
            self.pos += 1;
        }
    }

    /// A `<` in operand position that starts a tag rather than a comparison
    /// or a generic parameter list.
    fn tag_ahead(&self) -> bool {
        let operand = match previous_significant(self.bytes, self.pos) {
            None => true,
            Some(b) if is_ident_byte(b) => previous_word(self.bytes, self.pos) == b"return",
            Some(b) => b"(,=?:{[&|>}".contains(&b),
        };
        if !operand {
            return false;
        }
        let name_start = self.pos + 1;
        match self.bytes.get(name_start) {
            Some(b'>') => return true,
            Some(b) if b.is_ascii_alphabetic() => {}
            _ => return false,
        }
        let mut i = name_start;
        while self.bytes.get(i).is_some_and(|b| is_ident_byte(*b) || b".-:".contains(b)) {
            i += 1;
        }
        let after = skip_whitespace(self.bytes, i);
        match self.bytes.get(after) {
            Some(b'>' | b'/' | b'{') => true,
            Some(b) if is_ident_byte(*b) => !self.bytes[after..].starts_with(b"extends"),
            _ => false,
        }
    }

    fn element(&mut self) {
        if self.tag() {
            self.children();
        }
    }

    /// Consumes one opening tag. True when children follow it.
    fn tag(&mut self) -> bool {
        self.pos += 1;
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'{' => {
                    self.pos += 1;
                    self.code(true);
                    continue;
                }
                b'/' if self.bytes.get(self.pos + 1) == Some(&b'>') => {
                    self.pos += 2;
                    return false;
                }
                b'>' => {
                    self.pos += 1;
                    return true;
                }
                _ => self.pos += 1,
            }
        }
        false
    }

    /// Children through the closing tag.
    fn children(&mut self) {
        let mut start = self.pos;
        while let Some(&b) = self.bytes.get(self.pos) {
            match b {
                b'{' => {
                    self.text(start);
                    self.pos += 1;
                    self.code(true);
                    start = self.pos;
                }
                b'<' if self.bytes.get(self.pos + 1) == Some(&b'/') => {
                    self.text(start);
                    while let Some(&c) = self.bytes.get(self.pos) {
                        self.pos += 1;
                        if c == b'>' {
                            break;
                        }
                    }
                    return;
                }
                b'<' => {
                    self.text(start);
                    self.element();
                    start = self.pos;
                }
                _ => self.pos += 1,
            }
        }
        self.text(start);
    }

    fn text(&mut self, start: usize) {
        if start < self.pos {
            self.prose.push(start..self.pos);
        }
    }
}

fn previous_word(bytes: &[u8], before: usize) -> &[u8] {
    let end = before - bytes[..before].iter().rev().take_while(|b| b.is_ascii_whitespace()).count();
    let start = end - bytes[..end].iter().rev().take_while(|b| is_ident_byte(**b)).count();
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CLEAN_COMPONENT: &str = r#"function Counter({ start = 0, label }) {
  const [count, setCount] = useState(start);
  const styles = { padding: 8, color: count > 5 ? "red" : "blue" };
  const items = useMemo(() => [1, 2, 3].map((n) => n * count), [count]);
  const handle = (event) => {
    event.preventDefault();
    setCount((c) => (c > 10 ? 0 : c + 1));
  };
  for (let i = 0; i < 3; i++) {
    if (i === count) break;
  }
  for (;;) { break; }
  // type: Comment stays as written
  return (
    <div className="p-4" style={styles}>
      <p>Note: this is private data (for admins: only).</p>
      <p>Open (weekdays: Monday) {label}</p>
      <h2>Plan (monthly): Pro {count}</h2>
      <span>{label ? label : "Count"}: {count}</span>
      <button onClick={handle}>{items.length > 0 ? <b>More</b> : null}</button>
    </div>
  );
}"#;

    #[test]
    fn clean_javascript_is_untouched() {
        assert_eq!(normalize(CLEAN_COMPONENT), CLEAN_COMPONENT);
    }

    #[test]
    fn signatures_in_code_are_still_stripped_next_to_jsx_prose() {
        let source = "const Row = ({ day }: RowProps): JSX.Element => <li>Open (weekdays: Monday) {day}</li>;\nclass Clock {\n  tick(now: Date): void {}\n}";
        assert_eq!(
            normalize(source),
            "const Row = ({ day }) => <li>Open (weekdays: Monday) {day}</li>;\nclass Clock {\n  tick(now) {}\n}"
        );
    }

    #[test]
    fn generic_arrows_are_not_mistaken_for_tags() {
        let source = "const first = <T,>(items: T[]): T => items[0];";
        assert_eq!(normalize(source), "const first = <T,>(items) => items[0];");
    }

    #[test]
    fn strips_imports_and_leading_blank_lines() {
        let source = "import React, { useState } from \"react\";\nimport './styles.css';\n\nexport default function App() {}\n";
        assert_eq!(normalize(source), "export default function App() {}\n");
    }

    #[test]
    fn terminates_interface_fields() {
        let source = "interface Product {\n  id: number\n  name: string\n  tags: string[]\n}\n";
        assert_eq!(
            normalize(source),
            "interface Product {\n  id: number;\n  name: string;\n  tags: string[]\n}\n"
        );
    }

    #[test]
    fn terminates_single_line_type_aliases() {
        let source = "type Size = 'sm' | 'md'\ntype Mode =\n  | 'a'\n  | 'b';\n";
        assert_eq!(normalize(source), "type Size = 'sm' | 'md';\ntype Mode =\n  | 'a'\n  | 'b';\n");
    }

    #[test]
    fn collapses_stray_terminators() {
        assert_eq!(normalize("const a = 1;;\nfoo();{"), "const a = 1;\nfoo() {");
        assert_eq!(normalize("const o = { a: 1,; b: 2 };"), "const o = { a: 1, b: 2 };");
    }

    #[test]
    fn strips_type_annotations() {
        let source = "function Card({ title, items }: CardProps): JSX.Element {\n  const count: number = items.length;\n  const pick = (item: Item, index?: number) => item;\n  const on = e: Event => e;\n  return null;\n}";
        assert_eq!(
            normalize(source),
            "function Card({ title, items }) {\n  const count = items.length;\n  const pick = (item, index) => item;\n  const on = e => e;\n  return null;\n}"
        );
    }

    #[test]
    fn keeps_ternaries_with_capitalised_branches() {
        let source = "const View = ok ? (Primary) : Fallback;\nconst x = (a ? b : C);";
        assert_eq!(normalize(source), source);
    }

    #[test]
    fn strips_access_modifiers() {
        let source = "class Store {\n  private readonly items = [];\n  constructor(public name) {}\n}";
        assert_eq!(normalize(source), "class Store {\n  items = [];\n  constructor(name) {}\n}");
    }

    #[test]
    fn leaves_literal_text_alone() {
        let source = "const hint = \"(value: String) => x\";\nconst s = `let y: Foo = ${z}`;";
        assert_eq!(normalize(source), source);
    }

    #[test]
    fn normalizing_twice_changes_nothing() {
        let source = "import { useState } from 'react';\ninterface Props {\n  title: string\n}\nexport default function Hero({ title }: Props) {\n  const [open, setOpen]: [boolean, Function] = useState(false);\n  const n: number = 3;;\n  return <h1>{title}</h1>;\n}\n";
        let once = normalize(source);
        assert_eq!(normalize(&once), once);
    }
}
