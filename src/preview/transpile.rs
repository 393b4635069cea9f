//! JSX and TypeScript to plain script.
//!
//! The transpiler works in one pass over the source: type-only syntax is
//! dropped, JSX elements become `React.createElement` calls, and everything
//! else is copied through untouched so line numbers stay close to the input.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::PreviewError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TranspileError {
    #[error("{filename}: {message} ({line}:{column})")]
    Syntax {
        filename: String,
        message: String,
        line: u32,
        column: u32,
    },
}

/// Turns component source into code the script engine can run.
pub trait Transpiler: Send + Sync {
    fn transpile(&self, source: &str, filename: &str) -> Result<String, TranspileError>;
}

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct LoadError(pub String);

/// Produces a transpiler on first use.
#[async_trait]
pub trait TranspilerLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Transpiler>, LoadError>;
}

pub struct BuiltinLoader;

#[async_trait]
impl TranspilerLoader for BuiltinLoader {
    async fn load(&self) -> Result<Arc<dyn Transpiler>, LoadError> {
        Ok(Arc::new(JsxTranspiler))
    }
}

/// Lazily loaded, process-wide transpiler. A failed load is not remembered,
/// so the next render tries again.
pub struct TranspilerHandle {
    loader: Arc<dyn TranspilerLoader>,
    loaded: OnceCell<Arc<dyn Transpiler>>,
}

impl TranspilerHandle {
    pub fn new(loader: Arc<dyn TranspilerLoader>) -> Self {
        Self {
            loader,
            loaded: OnceCell::new(),
        }
    }

    pub fn builtin() -> Self {
        Self::new(Arc::new(BuiltinLoader))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }

    pub async fn ready(&self) -> Result<Arc<dyn Transpiler>, PreviewError> {
        let transpiler = self
            .loaded
            .get_or_try_init(|| async {
                tracing::info!("🧩 Loading transpiler");
                self.loader.load().await
            })
            .await
            .map_err(|err| {
                tracing::error!("❌ Transpiler failed to load: {}", err);
                PreviewError::TranspilerUnavailable(err.to_string())
            })?;
        Ok(Arc::clone(transpiler))
    }
}

/// The in-process transpiler for TSX sources.
pub struct JsxTranspiler;

impl Transpiler for JsxTranspiler {
    fn transpile(&self, source: &str, filename: &str) -> Result<String, TranspileError> {
        let mut emitter = Emitter::new(source, filename);
        emitter.code(Stop::Eof)?;
        Ok(emitter.out)
    }
}

/// Words after which a `/` or `<` starts an operand rather than an operator.
const EXPR_KEYWORDS: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do", "else",
    "yield", "await", "default", "extends",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stop {
    Eof,
    Brace,
}

struct Emitter<'a> {
    src: &'a str,
    bytes: &'a [u8],
    filename: &'a str,
    pos: usize,
    out: String,
    expr_allowed: bool,
    pending_newlines: usize,
}

impl<'a> Emitter<'a> {
    fn new(src: &'a str, filename: &'a str) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            filename,
            pos: 0,
            out: String::with_capacity(src.len() + src.len() / 2),
            expr_allowed: true,
            pending_newlines: 0,
        }
    }

    fn error(&self, at: usize, message: impl Into<String>) -> TranspileError {
        let (line, column) = line_column(self.src, at);
        TranspileError::Syntax {
            filename: self.filename.to_string(),
            message: message.into(),
            line,
            column,
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn starts_with(&self, text: &str) -> bool {
        self.bytes[self.pos..].starts_with(text.as_bytes())
    }

    fn push_byte(&mut self) {
        self.out.push(self.bytes[self.pos] as char);
        self.pos += 1;
    }

    /// Copies one whole character, which may be several bytes long.
    fn copy_char(&mut self) {
        if let Some(c) = self.src[self.pos..].chars().next() {
            self.out.push(c);
            self.pos += c.len_utf8();
        }
    }

    fn copy_to(&mut self, end: usize) {
        self.out.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn code(&mut self, stop: Stop) -> Result<(), TranspileError> {
        let mut brackets: Vec<(u8, usize)> = Vec::new();
        self.expr_allowed = true;

        loop {
            let Some(b) = self.peek() else {
                if let Some(&(open, at)) = brackets.last() {
                    return Err(self.error(at, format!("Unexpected token, expected \"{}\"", closer(open) as char)));
                }
                return match stop {
                    Stop::Eof => Ok(()),
                    Stop::Brace => Err(self.error(self.pos, "Unexpected token, expected \"}\"")),
                };
            };

            match b {
                b' ' | b'\t' | b'\n' | b'\r' => self.push_byte(),
                b'/' if self.peek_at(1) == Some(b'/') => self.line_comment(),
                b'/' if self.peek_at(1) == Some(b'*') => self.block_comment()?,
                b'"' | b'\'' => {
                    self.string()?;
                    self.expr_allowed = false;
                }
                b'`' => {
                    self.template()?;
                    self.expr_allowed = false;
                }
                b'/' if self.expr_allowed => {
                    self.regex()?;
                    self.expr_allowed = false;
                }
                b'<' if self.expr_allowed && self.jsx_ahead() => {
                    self.element()?;
                    self.expr_allowed = false;
                }
                b'(' | b'[' | b'{' => {
                    brackets.push((b, self.pos));
                    self.push_byte();
                    self.expr_allowed = true;
                }
                b')' | b']' => {
                    match brackets.pop() {
                        Some((open, _)) if closer(open) == b => {}
                        _ => return Err(self.error(self.pos, format!("Unexpected token \"{}\"", b as char))),
                    }
                    self.push_byte();
                    self.expr_allowed = false;
                }
                b'}' => match brackets.pop() {
                    Some((b'{', _)) => {
                        self.push_byte();
                        self.expr_allowed = true;
                    }
                    None if stop == Stop::Brace => {
                        self.pos += 1;
                        return Ok(());
                    }
                    _ => return Err(self.error(self.pos, "Unexpected token \"}\"")),
                },
                // Non-null assertion.
                b'!' if !self.expr_allowed && self.peek_at(1) != Some(b'=') => self.pos += 1,
                b'0'..=b'9' => {
                    self.number();
                    self.expr_allowed = false;
                }
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.number();
                    self.expr_allowed = false;
                }
                _ if is_ident_start(b) => self.word()?,
                _ if b >= 0x80 => {
                    self.copy_char();
                    self.expr_allowed = false;
                }
                _ => self.punct(),
            }
        }
    }

    fn line_comment(&mut self) {
        while let Some(b) = self.peek() {
            if b == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    fn block_comment(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        let Some(offset) = self.bytes[start + 2..].windows(2).position(|w| w == b"*/") else {
            return Err(self.error(start, "Unterminated comment"));
        };
        let end = start + 2 + offset + 2;
        let newlines = self.bytes[start..end].iter().filter(|b| **b == b'\n').count();
        self.out.push(' ');
        self.out.extend(std::iter::repeat('\n').take(newlines));
        self.pos = end;
        Ok(())
    }

    fn string(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        let quote = self.bytes[start];
        self.push_byte();
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error(start, "Unterminated string constant")),
                Some(b'\\') => {
                    self.push_byte();
                    self.copy_char();
                }
                Some(b) if b == quote => {
                    self.push_byte();
                    return Ok(());
                }
                Some(_) => self.copy_char(),
            }
        }
    }

    fn template(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        self.push_byte();
        loop {
            match self.peek() {
                None => return Err(self.error(start, "Unterminated template")),
                Some(b'\\') => {
                    self.push_byte();
                    self.copy_char();
                }
                Some(b'`') => {
                    self.push_byte();
                    return Ok(());
                }
                Some(b'$') if self.peek_at(1) == Some(b'{') => {
                    self.out.push_str("${");
                    self.pos += 2;
                    self.code(Stop::Brace)?;
                    self.out.push('}');
                }
                Some(_) => self.copy_char(),
            }
        }
    }

    fn regex(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        self.push_byte();
        let mut in_class = false;
        loop {
            match self.peek() {
                None | Some(b'\n') => return Err(self.error(start, "Unterminated regular expression")),
                Some(b'\\') => {
                    self.push_byte();
                    self.copy_char();
                }
                Some(b'[') => {
                    in_class = true;
                    self.push_byte();
                }
                Some(b']') => {
                    in_class = false;
                    self.push_byte();
                }
                Some(b'/') if !in_class => {
                    self.push_byte();
                    break;
                }
                Some(_) => self.copy_char(),
            }
        }
        let flags_end = ident_end(self.bytes, self.pos);
        self.copy_to(flags_end);
        Ok(())
    }

    fn number(&mut self) {
        let start = self.pos;
        let hex = self.starts_with("0x") || self.starts_with("0X");
        let mut end = start;
        while let Some(&b) = self.bytes.get(end) {
            let exponent_sign =
                (b == b'+' || b == b'-') && !hex && end > start && matches!(self.bytes[end - 1], b'e' | b'E');
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                end += 1;
            } else {
                break;
            }
        }
        self.copy_to(end);
    }

    fn punct(&mut self) {
        let b = self.bytes[self.pos];
        if (b == b'+' || b == b'-') && self.peek_at(1) == Some(b) {
            // `i++` keeps the operand state, `++i` keeps the operator state.
            self.copy_to(self.pos + 2);
            return;
        }
        self.push_byte();
        self.expr_allowed = true;
    }

    fn word(&mut self) -> Result<(), TranspileError> {
        let src = self.src;
        let start = self.pos;
        let end = ident_end(self.bytes, start);
        let word = &src[start..end];
        let member = self.out.trim_end().ends_with('.');

        if !member {
            match word {
                "interface" if self.declaration_ahead(end, false) => return self.skip_interface(start),
                "type" if self.declaration_ahead(end, true) => return self.skip_type_alias(start),
                "as" if !self.expr_allowed => {
                    if let Some(type_end) = self.assertion_end(end) {
                        // Keep the operand state: `(x as Foo).bar`.
                        let kept = self.out.trim_end_matches([' ', '\t']).len();
                        self.out.truncate(kept);
                        self.pos = type_end;
                        return Ok(());
                    }
                }
                _ => {}
            }
        }

        self.out.push_str(word);
        self.pos = end;
        let keyword = EXPR_KEYWORDS.contains(&word);
        if !member && !keyword && self.peek() == Some(b'<') {
            if let Some(args_end) = self.type_arguments_end(self.pos) {
                self.pos = args_end;
            }
        }
        self.expr_allowed = !member && keyword;
        Ok(())
    }

    /// `interface Name {` / `type Name = ...` as opposed to a variable that
    /// happens to be called `type`.
    fn declaration_ahead(&self, after: usize, alias: bool) -> bool {
        let name_start = skip_inline_space(self.bytes, after);
        if name_start == after || !self.bytes.get(name_start).copied().is_some_and(is_ident_start) {
            return false;
        }
        let mut i = skip_inline_space(self.bytes, ident_end(self.bytes, name_start));
        if alias {
            if self.bytes.get(i) == Some(&b'<') {
                match angle_end(self.bytes, i) {
                    Some(end) => i = skip_inline_space(self.bytes, end),
                    None => return false,
                }
            }
            self.bytes.get(i) == Some(&b'=') && !matches!(self.bytes.get(i + 1), Some(b'=') | Some(b'>'))
        } else {
            matches!(self.bytes.get(i), Some(b'{') | Some(b'<')) || self.bytes[i..].starts_with(b"extends")
        }
    }

    fn skip_interface(&mut self, start: usize) -> Result<(), TranspileError> {
        let Some(open) = self.bytes[start..].iter().position(|b| *b == b'{').map(|p| start + p) else {
            return Err(self.error(start, "Unexpected token, expected \"{\""));
        };
        let Some(end) = balanced_end(self.bytes, open) else {
            return Err(self.error(open, "Unexpected token, expected \"}\""));
        };
        self.skip_declaration(start, end);
        Ok(())
    }

    fn skip_type_alias(&mut self, start: usize) -> Result<(), TranspileError> {
        let Some(eq) = self.bytes[start..].iter().position(|b| *b == b'=').map(|p| start + p) else {
            return Err(self.error(start, "Unexpected token, expected \"=\""));
        };
        let end = type_alias_end(self.bytes, eq + 1);
        self.skip_declaration(start, end);
        Ok(())
    }

    /// Drops a type-only declaration, along with an `export` in front of it.
    fn skip_declaration(&mut self, start: usize, end: usize) {
        let trimmed = self.out.trim_end();
        for prefix in ["export", "declare"] {
            if trimmed.ends_with(prefix) && !trimmed[..trimmed.len() - prefix.len()].ends_with(is_ident_char) {
                let keep = trimmed.len() - prefix.len();
                self.out.truncate(keep);
                break;
            }
        }
        let newlines = self.bytes[start..end].iter().filter(|b| **b == b'\n').count();
        self.out.extend(std::iter::repeat('\n').take(newlines));
        self.pos = end;
        self.expr_allowed = true;
    }

    /// End of the type after `as`, or `None` when this is not an assertion.
    fn assertion_end(&self, after: usize) -> Option<usize> {
        let start = skip_inline_space(self.bytes, after);
        if start == after {
            return None;
        }
        type_end(self.bytes, start)
    }

    /// End of `<...>` when it is an explicit type argument list for a call.
    fn type_arguments_end(&self, open: usize) -> Option<usize> {
        let end = angle_end(self.bytes, open)?;
        let next = skip_inline_space(self.bytes, end);
        (self.bytes.get(next) == Some(&b'(')).then_some(end)
    }

    fn jsx_ahead(&self) -> bool {
        match self.peek_at(1) {
            Some(b'>') => true,
            Some(b) => is_ident_start(b),
            None => false,
        }
    }

    fn skip_jsx_space(&mut self) {
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    if b == b'\n' {
                        self.pending_newlines += 1;
                    }
                    self.pos += 1;
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => self.line_comment(),
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    match self.bytes[self.pos + 2..].windows(2).position(|w| w == b"*/") {
                        Some(offset) => self.pos += 2 + offset + 2,
                        None => self.pos = self.bytes.len(),
                    }
                }
                _ => break,
            }
        }
    }

    fn jsx_name(&mut self) -> Result<String, TranspileError> {
        let start = self.pos;
        if !self.peek().is_some_and(is_ident_start) {
            return Err(self.error(start, "Unexpected token, expected a JSX identifier"));
        }
        let mut end = start;
        loop {
            while self.bytes.get(end).is_some_and(|b| is_ident_char(*b as char) || *b == b'-') {
                end += 1;
            }
            match (self.bytes.get(end), self.bytes.get(end + 1)) {
                (Some(b'.') | Some(b':'), Some(next)) if is_ident_start(*next) => end += 1,
                _ => break,
            }
        }
        self.pos = end;
        Ok(self.src[start..end].to_string())
    }

    fn element(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        self.pos += 1;
        self.skip_jsx_space();

        if self.peek() == Some(b'>') {
            self.pos += 1;
            self.out.push_str("React.createElement(React.Fragment, null");
            self.children(start, None)?;
            self.out.push(')');
            return Ok(());
        }

        let name = self.jsx_name()?;
        self.out.push_str("React.createElement(");
        self.out.push_str(&element_type(&name));

        let mut props: Vec<String> = Vec::new();
        let self_closing = loop {
            self.skip_jsx_space();
            match self.peek() {
                None => return Err(self.error(start, "Unterminated JSX contents")),
                Some(b'/') if self.peek_at(1) == Some(b'>') => {
                    self.pos += 2;
                    break true;
                }
                Some(b'>') => {
                    self.pos += 1;
                    break false;
                }
                Some(b'{') => {
                    let at = self.pos;
                    self.pos += 1;
                    self.skip_jsx_space();
                    if !self.starts_with("...") {
                        return Err(self.error(at, "Unexpected token, expected \"...\""));
                    }
                    self.pos += 3;
                    let expr = self.expression_container()?;
                    props.push(format!("...{}", expr.trim()));
                }
                Some(b) if is_ident_start(b) => {
                    let attr = self.jsx_name()?;
                    self.skip_jsx_space();
                    let value = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        self.skip_jsx_space();
                        self.attribute_value()?
                    } else {
                        "true".to_string()
                    };
                    props.push(format!("{}: {}", property_key(&attr), value));
                }
                Some(_) => return Err(self.error(self.pos, "Unexpected token")),
            }
        };

        if props.is_empty() {
            self.out.push_str(", null");
        } else {
            self.out.push_str(", {");
            self.out.push_str(&props.join(", "));
            self.out.push('}');
        }
        if !self_closing {
            self.children(start, Some(&name))?;
        }
        self.out.push(')');
        Ok(())
    }

    fn attribute_value(&mut self) -> Result<String, TranspileError> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => {
                let start = self.pos;
                let Some(len) = self.bytes[start + 1..].iter().position(|b| *b == quote) else {
                    return Err(self.error(start, "Unterminated string constant"));
                };
                let raw = &self.src[start + 1..start + 1 + len];
                self.pos = start + len + 2;
                Ok(js_string(&decode_entities(raw)))
            }
            Some(b'{') => {
                let at = self.pos;
                self.pos += 1;
                let expr = self.expression_container()?;
                if expr.trim().is_empty() {
                    return Err(self.error(at, "JSX attributes must only be assigned a non-empty expression"));
                }
                Ok(expr.trim().to_string())
            }
            Some(b'<') if self.jsx_ahead() => {
                let outer = std::mem::take(&mut self.out);
                let result = self.element();
                let inner = std::mem::replace(&mut self.out, outer);
                result.map(|_| inner)
            }
            _ => Err(self.error(self.pos, "JSX value should be either an expression or a quoted JSX text")),
        }
    }

    /// Transpiles the body of a `{ ... }` into its own buffer. The opening
    /// brace has already been consumed.
    fn expression_container(&mut self) -> Result<String, TranspileError> {
        let outer = std::mem::take(&mut self.out);
        let result = self.code(Stop::Brace);
        let inner = std::mem::replace(&mut self.out, outer);
        result.map(|_| inner)
    }

    fn children(&mut self, start: usize, name: Option<&str>) -> Result<(), TranspileError> {
        loop {
            match self.peek() {
                None => {
                    let message = match name {
                        Some(name) => format!("Unterminated JSX contents, expected closing tag for <{name}>"),
                        None => "Unterminated JSX contents".to_string(),
                    };
                    return Err(self.error(start, message));
                }
                Some(b'<') if self.peek_at(1) == Some(b'/') => {
                    let close_at = self.pos;
                    self.pos += 2;
                    self.skip_jsx_space();
                    let closing = if self.peek() == Some(b'>') {
                        String::new()
                    } else {
                        self.jsx_name()?
                    };
                    self.skip_jsx_space();
                    if self.peek() != Some(b'>') {
                        return Err(self.error(self.pos, "Unexpected token, expected \">\""));
                    }
                    self.pos += 1;

                    let expected = name.unwrap_or("");
                    if closing != expected {
                        let message = if expected.is_empty() {
                            "Expected corresponding closing tag for JSX fragment".to_string()
                        } else {
                            format!("Expected corresponding JSX closing tag for <{expected}>")
                        };
                        return Err(self.error(close_at, message));
                    }
                    return Ok(());
                }
                Some(b'<') => {
                    self.separator();
                    self.element()?;
                }
                Some(b'{') => {
                    self.pos += 1;
                    let expr = self.expression_container()?;
                    let expr = expr.trim();
                    // `{/* comment */}` renders nothing.
                    if !expr.is_empty() {
                        self.separator();
                        self.out.push_str(expr);
                    }
                }
                Some(_) => self.jsx_text()?,
            }
        }
    }

    fn jsx_text(&mut self) -> Result<(), TranspileError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b'<' | b'{' => break,
                b'>' => return Err(self.error(self.pos, "Unexpected token `>`. Did you mean `&gt;` or `{'>'}`?")),
                b'}' => return Err(self.error(self.pos, "Unexpected token `}`. Did you mean `&rbrace;` or `{'}'}`?")),
                _ => self.pos += 1,
            }
        }
        let raw = &self.src[start..self.pos];
        let text = clean_jsx_text(raw);
        let newlines = raw.matches('\n').count();
        if !text.is_empty() {
            self.separator();
            self.out.push_str(&js_string(&decode_entities(&text)));
        }
        self.pending_newlines += newlines;
        Ok(())
    }

    /// Argument separator between children. Line breaks of the source are
    /// carried over so later errors point at the right line.
    fn separator(&mut self) {
        self.out.push(',');
        if self.pending_newlines == 0 {
            self.out.push(' ');
        } else {
            self.out.extend(std::iter::repeat('\n').take(self.pending_newlines));
            self.pending_newlines = 0;
        }
    }
}

fn closer(open: u8) -> u8 {
    match open {
        b'(' => b')',
        b'[' => b']',
        _ => b'}',
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'$'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn ident_end(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while bytes.get(end).is_some_and(|b| is_ident_char(*b as char)) {
        end += 1;
    }
    end
}

fn skip_inline_space(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(|b| matches!(b, b' ' | b'\t')) {
        i += 1;
    }
    i
}

fn skip_space(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn quoted_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return None,
            _ if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Index just past the bracket that closes the one at `open`.
fn balanced_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'"' | b'\'' => {
                i = quoted_end(bytes, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index just past the `>` closing a type parameter or argument list.
fn angle_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'<' => depth += 1,
            b'>' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            b'=' if bytes.get(i + 1) == Some(&b'>') => i += 1,
            b'"' | b'\'' => {
                i = quoted_end(bytes, i)?;
                continue;
            }
            b'(' | b'[' | b'{' => {
                i = balanced_end(bytes, i)?;
                continue;
            }
            _ if is_ident_char(b as char) => {}
            b' ' | b'\t' | b'\r' | b'\n' | b'.' | b',' | b'|' | b'&' | b'?' | b':' => {}
            _ => return None,
        }
        i += 1;
        if i - open > 512 {
            return None;
        }
    }
    None
}

/// End of a type expression such as `Foo.Bar<T>[] | null` or `const`.
fn type_end(bytes: &[u8], mut i: usize) -> Option<usize> {
    loop {
        match bytes.get(i).copied()? {
            b if is_ident_start(b) => {
                i = ident_end(bytes, i);
                while bytes.get(i) == Some(&b'.') && bytes.get(i + 1).copied().is_some_and(is_ident_start) {
                    i = ident_end(bytes, i + 1);
                }
            }
            b'{' | b'[' | b'(' => i = balanced_end(bytes, i)?,
            b'"' | b'\'' => i = quoted_end(bytes, i)?,
            _ => return None,
        }
        if bytes.get(i) == Some(&b'<') {
            i = angle_end(bytes, i)?;
        }
        while bytes[i..].starts_with(b"[]") {
            i += 2;
        }
        let next = skip_inline_space(bytes, i);
        match (bytes.get(next), bytes.get(next + 1)) {
            (Some(b'|'), Some(b'|')) | (Some(b'&'), Some(b'&')) => return Some(i),
            (Some(b'|') | Some(b'&'), _) => i = skip_inline_space(bytes, next + 1),
            _ => return Some(i),
        }
    }
}

/// End of a type alias body: its `;`, or the line break that ends it when
/// the next line does not continue the type.
fn type_alias_end(bytes: &[u8], mut i: usize) -> usize {
    let mut depth = 0usize;
    let mut last_significant = b'=';
    while let Some(&b) = bytes.get(i) {
        match b {
            b'(' | b'[' | b'{' | b'<' => depth += 1,
            b'>' if i > 0 && bytes[i - 1] == b'=' => {}
            b')' | b']' | b'}' | b'>' => {
                if depth == 0 {
                    return i;
                }
                depth -= 1;
            }
            b';' if depth == 0 => return i + 1,
            b'\n' if depth == 0 => {
                let next = skip_space(bytes, i);
                let continued = matches!(last_significant, b'=' | b'|' | b'&' | b',' | b':' | b'?')
                    || matches!(bytes.get(next), Some(b'|') | Some(b'&') | Some(b'?') | Some(b':'));
                if !continued {
                    return i;
                }
            }
            b'"' | b'\'' => {
                match quoted_end(bytes, i) {
                    Some(end) => i = end,
                    None => i += 1,
                }
                last_significant = b'"';
                continue;
            }
            _ => {}
        }
        if !b.is_ascii_whitespace() {
            last_significant = b;
        }
        i += 1;
    }
    bytes.len()
}

/// First argument of `createElement`: a string for intrinsic tags, the
/// identifier for components.
fn element_type(name: &str) -> String {
    let intrinsic = !name.contains('.')
        && (name.starts_with(|c: char| c.is_ascii_lowercase()) || name.contains('-') || name.contains(':'));
    if intrinsic {
        js_string(name)
    } else {
        name.to_string()
    }
}

fn property_key(name: &str) -> String {
    let plain = name.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_' || c == '$') && name.chars().all(is_ident_char);
    if plain {
        name.to_string()
    } else {
        js_string(name)
    }
}

fn js_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_default()
}

/// Whitespace rules for JSX text: lines are trimmed where they meet a line
/// break, blank lines vanish, and the rest join with single spaces.
fn clean_jsx_text(raw: &str) -> String {
    let lines: Vec<&str> = raw.split('\n').collect();
    let is_blank = |line: &&str| line.chars().all(|c| matches!(c, ' ' | '\t' | '\r'));
    let last_non_empty = lines.iter().rposition(|line| !is_blank(line));

    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        let line = line.replace('\t', " ");
        let mut trimmed: &str = &line;
        if i != 0 {
            trimmed = trimmed.trim_start_matches([' ', '\r']);
        }
        if i != lines.len() - 1 {
            trimmed = trimmed.trim_end_matches([' ', '\r']);
        }
        if !trimmed.is_empty() {
            out.push_str(trimmed);
            if Some(i) != last_non_empty {
                out.push(' ');
            }
        }
    }
    out
}

const ENTITIES: &[(&str, char)] = &[
    ("amp", '&'),
    ("lt", '<'),
    ("gt", '>'),
    ("quot", '"'),
    ("apos", '\''),
    ("nbsp", '\u{a0}'),
    ("lbrace", '{'),
    ("rbrace", '}'),
    ("copy", '©'),
    ("reg", '®'),
    ("trade", '™'),
    ("hellip", '…'),
    ("mdash", '—'),
    ("ndash", '–'),
    ("times", '×'),
    ("middot", '·'),
    ("bull", '•'),
    ("larr", '←'),
    ("rarr", '→'),
    ("uarr", '↑'),
    ("darr", '↓'),
    ("laquo", '«'),
    ("raquo", '»'),
    ("lsquo", '‘'),
    ("rsquo", '’'),
    ("ldquo", '“'),
    ("rdquo", '”'),
    ("deg", '°'),
    ("plusmn", '±'),
    ("euro", '€'),
    ("pound", '£'),
    ("yen", '¥'),
    ("cent", '¢'),
    ("hearts", '♥'),
    ("check", '✓'),
];

fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let after = &rest[amp + 1..];
        let decoded = after
            .find(';')
            .filter(|end| *end <= 10)
            .and_then(|end| decode_entity(&after[..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push('&');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return u32::from_str_radix(hex, 16).ok().and_then(char::from_u32);
    }
    if let Some(dec) = name.strip_prefix('#') {
        return dec.parse::<u32>().ok().and_then(char::from_u32);
    }
    ENTITIES.iter().find(|(entity, _)| *entity == name).map(|(_, c)| *c)
}

/// One-based line and column of a byte offset.
fn line_column(src: &str, at: usize) -> (u32, u32) {
    let at = at.min(src.len());
    let before = src.get(..at).unwrap_or(src);
    let line = before.matches('\n').count() as u32 + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) as u32 + 1;
    (line, column)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use pretty_assertions::assert_eq;

    fn transpile(source: &str) -> Result<String, TranspileError> {
        JsxTranspiler.transpile(source, "dynamic-component.tsx")
    }

    fn compact(code: &str) -> String {
        code.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn plain_script_passes_through() {
        let source = "function add(a, b) {\n  return a + b;\n}";
        assert_eq!(transpile(source).unwrap(), source);
    }

    #[test]
    fn elements_become_create_element_calls() {
        let out = transpile("const a = <div className=\"box\" hidden>Hi {name}!</div>;").unwrap();
        assert_eq!(
            compact(&out),
            "const a = React.createElement(\"div\", {className: \"box\", hidden: true}, \"Hi \", name, \"!\");"
        );
    }

    #[test]
    fn components_fragments_and_spreads() {
        let out = transpile("const a = <><Card {...props} aria-label='x' /></>;").unwrap();
        assert_eq!(
            compact(&out),
            "const a = React.createElement(React.Fragment, null, React.createElement(Card, {...props, \"aria-label\": \"x\"}));"
        );
    }

    #[test]
    fn jsx_text_whitespace_is_collapsed() {
        let out = transpile("const a = <p>\n    Hello\n    world &amp; more\n  </p>;").unwrap();
        assert!(compact(&out).contains("\"Hello world & more\""), "{out}");
    }

    #[test]
    fn nested_jsx_inside_expressions() {
        let source = "function List({ items }) {\n  return <ul>{items.map(i => <li key={i}>{`#${i}`}</li>)}</ul>;\n}";
        let out = transpile(source).unwrap();
        assert!(out.contains("React.createElement(\"li\", {key: i}, `#${i}`)"), "{out}");
        assert_eq!(out.lines().count(), 3);
    }

    #[test]
    fn comparisons_are_not_jsx() {
        let out = transpile("const ok = a < b && c > d;\nconst n = i<limit ? 1 : 2;").unwrap();
        assert_eq!(out, "const ok = a < b && c > d;\nconst n = i<limit ? 1 : 2;");
    }

    #[test]
    fn type_syntax_is_removed() {
        let source = "interface Props { title: string }\ntype Size = 'sm' | 'lg';\nconst [v, setV] = useState<string>('');\nconst el = ref.current!;\nconst n = (value as number) + 1;";
        let out = transpile(source).unwrap();
        assert!(!out.contains("interface") && !out.contains("type Size"), "{out}");
        assert!(out.contains("useState('')"), "{out}");
        assert!(out.contains("ref.current;"), "{out}");
        assert!(out.contains("(value) + 1"), "{out}");
        assert_eq!(out.lines().count(), source.lines().count());
    }

    #[test]
    fn comment_children_render_nothing() {
        let out = transpile("const a = <div>{/* note */}</div>;").unwrap();
        assert_eq!(compact(&out), "const a = React.createElement(\"div\", null);");
    }

    #[test]
    fn mismatched_closing_tag_is_reported() {
        let err = transpile("const a = <div>\n  <span></div>;").unwrap_err();
        let TranspileError::Syntax { message, line, .. } = err;
        assert!(message.contains("<span>"), "{message}");
        assert_eq!(line, 2);
    }

    #[test]
    fn unterminated_element_is_reported() {
        let err = transpile("function A() {\n  return <div>\n}").unwrap_err();
        assert!(err.to_string().starts_with("dynamic-component.tsx: "), "{err}");
    }

    #[test]
    fn stray_brace_in_text_is_reported() {
        let err = transpile("const a = <p>a } b</p>;").unwrap_err();
        assert!(err.to_string().contains("&rbrace;"), "{err}");
    }

    #[test]
    fn unterminated_string_reports_where_it_opened() {
        let err = transpile("function A() {\n  const label = 'Save;\n  return label;\n}").unwrap_err();
        let TranspileError::Syntax { message, line, column, .. } = err;
        assert_eq!(message, "Unterminated string constant");
        assert_eq!((line, column), (2, 17));
    }

    #[test]
    fn regex_literals_pass_through() {
        let source = "const valid = /^[^\\s@]+@[^\\s@]+\\.[^\\s@]+$/.test(email);\nconst a = <p title={/a\\/b/.source}>x</p>;";
        let out = transpile(source).unwrap();
        assert!(out.starts_with("const valid = /^[^\\s@]+@[^\\s@]+\\.[^\\s@]+$/.test(email);"), "{out}");
        assert!(out.contains("{title: /a\\/b/.source}"), "{out}");
    }

    #[test]
    fn entities_in_attributes_are_decoded() {
        let out = transpile("const a = <img alt=\"Tom &amp; Jerry\" />;").unwrap();
        assert!(out.contains("alt: \"Tom & Jerry\""), "{out}");
    }

    struct FlakyLoader {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TranspilerLoader for FlakyLoader {
        async fn load(&self) -> Result<Arc<dyn Transpiler>, LoadError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LoadError("network unreachable".into()))
            } else {
                Ok(Arc::new(JsxTranspiler))
            }
        }
    }

    #[tokio::test]
    async fn failed_loads_are_retried() {
        let loader = Arc::new(FlakyLoader {
            calls: AtomicUsize::new(0),
        });
        let handle = TranspilerHandle::new(loader.clone());

        assert!(matches!(handle.ready().await, Err(PreviewError::TranspilerUnavailable(_))));
        assert!(!handle.is_loaded());
        assert!(handle.ready().await.is_ok());
        assert!(handle.ready().await.is_ok());
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }
}
