/// Keyword set for the Zy language.
///
/// Keywords are classified by the tokenizer and drive scope creation
/// (`namespace`, `class`, `function`). The declaration subset also
/// disqualifies property candidates during the class-body scan. Literal
/// values such as `null` or `true` are not keywords.

/// Every word the tokenizer classifies as [`TokenKind::Keyword`](super::TokenKind::Keyword).
pub const KEYWORDS: &[&str] = &[
    "namespace",
    "class",
    "function",
    "public",
    "private",
    "protected",
    "static",
    "final",
    "abstract",
    "string",
    "int",
    "bool",
    "array",
    "use",
    "as",
    "new",
    "extends",
    "implements",
    "return",
];

/// Keywords that start or qualify a declaration. Only these end a
/// property candidate in a class body, so `private $repo = new Repo();`
/// still declares `$repo`.
pub const DECLARATION_KEYWORDS: &[&str] = &[
    "namespace",
    "class",
    "function",
    "public",
    "private",
    "protected",
    "static",
    "final",
    "abstract",
    "string",
    "int",
    "bool",
    "array",
];

pub fn is_declaration_keyword(word: &str) -> bool {
    DECLARATION_KEYWORDS.contains(&word)
}

/// Check if a word is a Zy keyword. The check is case-sensitive.
///
/// ```
/// use zynav::syntax::keywords::is_keyword;
///
/// assert!(is_keyword("class"));
/// assert!(is_keyword("namespace"));
/// assert!(!is_keyword("Class"));
/// assert!(!is_keyword("null"));
/// ```
pub fn is_keyword(word: &str) -> bool {
    matches!(
        word,
        "namespace"
            | "class"
            | "function"
            | "public"
            | "private"
            | "protected"
            | "static"
            | "final"
            | "abstract"
            | "string"
            | "int"
            | "bool"
            | "array"
            | "use"
            | "as"
            | "new"
            | "extends"
            | "implements"
            | "return"
    )
}
