//
// syntax/tokenizer.rs
//
// Gapless tokenizer for Zy source text
//

use super::keywords::is_keyword;

/// Token classification. Whitespace and unknown characters are tokens too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    LineComment,
    BlockComment,
    String,
    Number,
    /// `$` followed by identifier characters, e.g. `$name`
    Variable,
    Keyword,
    Identifier,
    BraceOpen,
    BraceClose,
    Semicolon,
    Colon,
    Comma,
    Whitespace,
    /// Single-character fallback for operators and anything unrecognized
    Operator,
}

impl TokenKind {
    /// Comments and whitespace.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::LineComment | TokenKind::BlockComment
        )
    }
}

/// A slice of the source buffer with its classification and byte span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub start: usize,
    pub end: usize,
}

impl<'a> Token<'a> {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// True for an `Operator` token whose text is exactly `op`.
    pub fn is_operator(&self, op: &str) -> bool {
        self.kind == TokenKind::Operator && self.text == op
    }
}

pub(crate) fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

pub(crate) fn is_ident_continue(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

/// Tokenize `text` into a sequence covering `[0, text.len())` without gaps.
///
/// Never fails: every branch consumes at least one character, and
/// unterminated comments and strings run to the end of the buffer.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::with_capacity(text.len() / 4 + 1);
    let mut pos = 0;

    while pos < text.len() {
        let rest = &text[pos..];
        let (kind, len) = scan_token(rest);
        debug_assert!(len > 0 && rest.is_char_boundary(len));
        let end = pos + len;
        tokens.push(Token {
            kind,
            text: &text[pos..end],
            start: pos,
            end,
        });
        pos = end;
    }

    tokens
}

/// Classify the token at the front of `rest`, returning its kind and byte length.
fn scan_token(rest: &str) -> (TokenKind, usize) {
    let bytes = rest.as_bytes();
    // Callers guarantee `rest` is non-empty.
    let first = rest.chars().next().unwrap_or('\0');

    if rest.starts_with("//") {
        let len = rest.find('\n').unwrap_or(rest.len());
        return (TokenKind::LineComment, len);
    }

    if rest.starts_with("/*") {
        let len = rest[2..].find("*/").map_or(rest.len(), |i| i + 4);
        return (TokenKind::BlockComment, len);
    }

    if first == '"' || first == '\'' {
        return (TokenKind::String, scan_string(rest, first));
    }

    if first.is_ascii_digit() {
        let len = bytes
            .iter()
            .position(|b| !(b.is_ascii_digit() || *b == b'.'))
            .unwrap_or(bytes.len());
        return (TokenKind::Number, len);
    }

    if first == '$' {
        let ident_len = ident_len(&rest[1..]);
        if ident_len > 0 {
            return (TokenKind::Variable, 1 + ident_len);
        }
        return (TokenKind::Operator, 1);
    }

    if is_ident_start(first) {
        let len = ident_len(rest);
        let kind = if is_keyword(&rest[..len]) {
            TokenKind::Keyword
        } else {
            TokenKind::Identifier
        };
        return (kind, len);
    }

    match first {
        '{' => return (TokenKind::BraceOpen, 1),
        '}' => return (TokenKind::BraceClose, 1),
        ';' => return (TokenKind::Semicolon, 1),
        ':' => return (TokenKind::Colon, 1),
        ',' => return (TokenKind::Comma, 1),
        _ => {}
    }

    if first.is_whitespace() {
        let len = rest
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map_or(rest.len(), |(i, _)| i);
        return (TokenKind::Whitespace, len);
    }

    (TokenKind::Operator, first.len_utf8())
}

/// Length of the identifier run at the front of `s` (0 if none).
fn ident_len(s: &str) -> usize {
    let mut chars = s.char_indices();
    match chars.next() {
        Some((_, c)) if is_ident_start(c) => {}
        _ => return 0,
    }
    chars
        .find(|(_, c)| !is_ident_continue(*c))
        .map_or(s.len(), |(i, _)| i)
}

/// Length of a quoted string starting at the front of `s`, closing quote included.
fn scan_string(s: &str, quote: char) -> usize {
    let mut chars = s.char_indices().skip(1);
    while let Some((i, c)) = chars.next() {
        if c == '\\' {
            // The escaped character, if any, belongs to the string.
            if chars.next().is_none() {
                return s.len();
            }
            continue;
        }
        if c == quote {
            return i + c.len_utf8();
        }
    }
    s.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, &str)> {
        tokenize(text).into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn test_class_declaration() {
        let toks: Vec<_> = kinds("class Users {")
            .into_iter()
            .filter(|(k, _)| *k != TokenKind::Whitespace)
            .collect();
        assert_eq!(
            toks,
            vec![
                (TokenKind::Keyword, "class"),
                (TokenKind::Identifier, "Users"),
                (TokenKind::BraceOpen, "{"),
            ]
        );
    }

    #[test]
    fn test_variable_and_lone_dollar() {
        assert_eq!(
            kinds("$name $"),
            vec![
                (TokenKind::Variable, "$name"),
                (TokenKind::Whitespace, " "),
                (TokenKind::Operator, "$"),
            ]
        );
    }

    #[test]
    fn test_comments() {
        let toks = kinds("// hi\n/* a */x");
        assert_eq!(toks[0], (TokenKind::LineComment, "// hi"));
        assert_eq!(toks[1], (TokenKind::Whitespace, "\n"));
        assert_eq!(toks[2], (TokenKind::BlockComment, "/* a */"));
        assert_eq!(toks[3], (TokenKind::Identifier, "x"));
    }

    #[test]
    fn test_unterminated_block_comment_runs_to_end() {
        let toks = kinds("a /* never closed { class");
        assert_eq!(toks.last().unwrap(), &(TokenKind::BlockComment, "/* never closed { class"));
    }

    #[test]
    fn test_string_escapes() {
        let toks = kinds(r#""a\"b" 'c'"#);
        assert_eq!(toks[0], (TokenKind::String, r#""a\"b""#));
        assert_eq!(toks[2], (TokenKind::String, "'c'"));
    }

    #[test]
    fn test_unterminated_string_and_trailing_escape() {
        assert_eq!(kinds("\"abc"), vec![(TokenKind::String, "\"abc")]);
        assert_eq!(kinds("'x\\"), vec![(TokenKind::String, "'x\\")]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(kinds("3.14"), vec![(TokenKind::Number, "3.14")]);
    }

    #[test]
    fn test_arrow_is_two_operators() {
        assert_eq!(
            kinds("->"),
            vec![(TokenKind::Operator, "-"), (TokenKind::Operator, ">")]
        );
    }

    #[test]
    fn test_non_ascii_is_kept_whole() {
        let toks = tokenize("é€");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].text, "€");
    }

    #[test]
    fn test_namespace_path_tokens() {
        let toks = kinds("Model\\Users");
        assert_eq!(
            toks,
            vec![
                (TokenKind::Identifier, "Model"),
                (TokenKind::Operator, "\\"),
                (TokenKind::Identifier, "Users"),
            ]
        );
    }

    #[test]
    fn test_empty_input() {
        assert!(tokenize("").is_empty());
    }
}
