//! Hides string, template and comment text from the regex-based rewrites.
//!
//! Each literal region is swapped for one private-use placeholder character,
//! so patterns like `\w+\s*:` can never match inside user-visible text, and
//! restored verbatim afterwards.

const PLACEHOLDER_BASE: u32 = 0xE100;
const PLACEHOLDER_LAST: u32 = 0xF8FF;

#[derive(Debug)]
pub struct Masked {
    text: String,
    literals: Vec<String>,
}

impl Masked {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when `c` stands for a `//` or `/* */` comment.
    pub fn is_comment(&self, c: char) -> bool {
        placeholder_index(c)
            .and_then(|i| self.literals.get(i))
            .is_some_and(|literal| literal.starts_with("//") || literal.starts_with("/*"))
    }

    /// Puts the original literal text back in place of every placeholder.
    pub fn restore(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len() + self.literals.iter().map(String::len).sum::<usize>());
        for c in text.chars() {
            match placeholder_index(c).and_then(|i| self.literals.get(i)) {
                Some(literal) => out.push_str(literal),
                None => out.push(c),
            }
        }
        out
    }
}

/// True for characters that stand in for a masked literal.
pub fn is_placeholder(c: char) -> bool {
    (PLACEHOLDER_BASE..=PLACEHOLDER_LAST).contains(&(c as u32))
}

fn placeholder_index(c: char) -> Option<usize> {
    is_placeholder(c).then(|| (c as u32 - PLACEHOLDER_BASE) as usize)
}

pub fn mask(source: &str) -> Masked {
    // Source that already uses the placeholder range is left alone.
    if source.chars().any(is_placeholder) {
        return Masked {
            text: source.to_string(),
            literals: Vec::new(),
        };
    }

    let bytes = source.as_bytes();
    let mut text = String::with_capacity(source.len());
    let mut literals = Vec::new();
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        let end = match bytes[i] {
            b'"' | b'\'' => quoted_end(bytes, i),
            b'`' => template_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => Some(line_end(bytes, i)),
            b'/' if bytes.get(i + 1) == Some(&b'*') => block_comment_end(bytes, i),
            _ => None,
        };
        let Some(end) = end else {
            i += 1;
            continue;
        };
        let Some(placeholder) = char::from_u32(PLACEHOLDER_BASE + literals.len() as u32).filter(|c| is_placeholder(*c)) else {
            break;
        };
        text.push_str(&source[copied..i]);
        text.push(placeholder);
        literals.push(source[i..end].to_string());
        copied = end;
        i = end;
    }
    text.push_str(&source[copied..]);
    Masked { text, literals }
}

/// End (exclusive) of a quoted string. A quote that is not closed on its own
/// line is treated as plain text, which keeps apostrophes in JSX text from
/// swallowing code.
fn quoted_end(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            c if c == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

pub(crate) fn template_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'`' => return Some(i + 1),
            b'$' if bytes.get(i + 1) == Some(&b'{') => i = substitution_end(bytes, i + 2)?,
            _ => i += 1,
        }
    }
    None
}

/// Skips a `${ ... }` body, returning the index just past its closing brace.
fn substitution_end(bytes: &[u8], mut i: usize) -> Option<usize> {
    let mut depth = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' if depth == 0 => return Some(i + 1),
            b'}' => depth -= 1,
            b'"' | b'\'' => {
                i = quoted_end(bytes, i)?;
                continue;
            }
            b'`' => {
                i = template_end(bytes, i)?;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|b| *b == b'\n')
        .map_or(bytes.len(), |offset| start + offset)
}

fn block_comment_end(bytes: &[u8], start: usize) -> Option<usize> {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map(|offset| start + 2 + offset + 2)
}
