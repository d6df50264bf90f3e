//
// resolve/context.rs
//
// Lexical context around the cursor: the clicked word and its receiver
//

use std::sync::OnceLock;

use regex::Regex;

use crate::syntax::{ScopeKind, ScopeTree};

/// How far back from `->` the receiver expression is searched.
const RECEIVER_WINDOW: usize = 512;

/// Byte range of the word under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
}

impl WordSpan {
    pub fn text<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }
}

/// ASCII alphanumerics, `_`, and any byte of a multi-byte character.
pub fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

/// Maximal word touching `offset`, if any.
pub fn word_at(text: &str, offset: usize) -> Option<WordSpan> {
    let bytes = text.as_bytes();
    let idx = offset.min(bytes.len());
    let mut start = idx;
    let mut end = idx;
    while start > 0 && is_word_byte(bytes[start - 1]) {
        start -= 1;
    }
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    (start < end).then_some(WordSpan { start, end })
}

/// The word at `offset`, else at `offset - 1` or `offset + 1`, else the
/// single character at `offset`. `None` only past the end of the text.
pub fn word_span(text: &str, offset: usize) -> Option<WordSpan> {
    let candidates = [Some(offset), offset.checked_sub(1), offset.checked_add(1)];
    if let Some(span) = candidates.into_iter().flatten().find_map(|o| word_at(text, o)) {
        return Some(span);
    }

    let mut start = offset.min(text.len());
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let ch = text[start..].chars().next()?;
    Some(WordSpan {
        start,
        end: start + ch.len_utf8(),
    })
}

fn skip_whitespace_back(bytes: &[u8], mut i: usize) -> usize {
    while i > 0 && bytes[i - 1].is_ascii_whitespace() {
        i -= 1;
    }
    i
}

fn skip_whitespace_forward(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Offset of a `->` directly before the span, whitespace allowed between.
pub fn arrow_before(text: &str, span: WordSpan) -> Option<usize> {
    let bytes = text.as_bytes();
    let i = skip_whitespace_back(bytes, span.start);
    (i >= 2 && &bytes[i - 2..i] == b"->").then(|| i - 2)
}

/// Whether the next non-whitespace character after the span is `(`.
pub fn followed_by_call(text: &str, span: WordSpan) -> bool {
    let bytes = text.as_bytes();
    bytes.get(skip_whitespace_forward(bytes, span.end)) == Some(&b'(')
}

/// `->word` not followed by `(`.
pub fn is_property_access(text: &str, span: WordSpan) -> bool {
    arrow_before(text, span).is_some() && !followed_by_call(text, span)
}

/// Whether an occurrence at `span` reads like a property: `->word` or `$word`.
pub fn looks_like_property(text: &str, span: WordSpan) -> bool {
    (span.start > 0 && text.as_bytes()[span.start - 1] == b'$') || arrow_before(text, span).is_some()
}

/// Expression on the left of a member access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receiver {
    /// `new C(...)->`
    New(String),
    /// `$this->`
    This,
    /// `$name->`, without the sigil
    Variable(String),
}

struct ContextPatterns {
    new_call: Regex,
    variable: Regex,
}

fn patterns() -> &'static ContextPatterns {
    static PATTERNS: OnceLock<ContextPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| ContextPatterns {
        new_call: Regex::new(r"new\s+([A-Za-z_]\w*)\s*\([^()]*\)\s*$").unwrap(),
        variable: Regex::new(r"\$([A-Za-z_]\w*)\s*$").unwrap(),
    })
}

/// Receiver of the member access ending at `span`, if the span follows `->`.
pub fn receiver(text: &str, span: WordSpan) -> Option<Receiver> {
    let arrow = arrow_before(text, span)?;
    let mut window_start = arrow.saturating_sub(RECEIVER_WINDOW);
    while !text.is_char_boundary(window_start) {
        window_start -= 1;
    }
    let prefix = &text[window_start..arrow];

    let p = patterns();
    if let Some(caps) = p.new_call.captures(prefix) {
        return Some(Receiver::New(caps[1].to_string()));
    }
    let caps = p.variable.captures(prefix)?;
    match &caps[1] {
        "this" => Some(Receiver::This),
        name => Some(Receiver::Variable(name.to_string())),
    }
}

/// Class of the last `$var = new C(` before `before`.
pub fn trace_assignment(text: &str, var: &str, before: usize) -> anyhow::Result<Option<String>> {
    let pattern = Regex::new(&format!(
        r"\${}\s*=\s*new\s+([A-Za-z_]\w*)\s*\(",
        regex::escape(var)
    ))?;
    let end = before.min(text.len());
    Ok(pattern
        .captures_iter(&text[..end])
        .last()
        .map(|caps| caps[1].to_string()))
}

/// Short name of the class owning the member at `span`, when the receiver
/// can be traced to one.
pub fn owning_class(text: &str, span: WordSpan, tree: &ScopeTree) -> anyhow::Result<Option<String>> {
    let class = match receiver(text, span) {
        Some(Receiver::New(class)) => Some(class),
        Some(Receiver::This) => tree
            .enclosing(tree.innermost_at(span.start), ScopeKind::Class)
            .map(|id| tree.get(id).name.clone()),
        Some(Receiver::Variable(var)) => trace_assignment(text, &var, span.start)?,
        None => None,
    };
    Ok(class.filter(|c| !c.is_empty()))
}

/// Word-bounded occurrences of `word` in `text`.
pub fn occurrences<'a>(text: &'a str, word: &'a str) -> impl Iterator<Item = WordSpan> + 'a {
    let bytes = text.as_bytes();
    text.match_indices(word).filter_map(move |(start, m)| {
        let end = start + m.len();
        let bounded_left = start == 0 || !is_word_byte(bytes[start - 1]);
        let bounded_right = end == bytes.len() || !is_word_byte(bytes[end]);
        (bounded_left && bounded_right).then_some(WordSpan { start, end })
    })
}
