//
// syntax/mod.rs
//
// Lexical layer: tokens, keywords, and the scope tree
//

pub mod keywords;
pub mod scope;
pub mod tokenizer;

pub use scope::{parse_scopes, Scope, ScopeId, ScopeKind, ScopeTree};
pub use tokenizer::{tokenize, Token, TokenKind};

/// Tokenize and build the scope tree in one step.
pub fn parse(text: &str) -> ScopeTree {
    let tokens = tokenize(text);
    parse_scopes(&tokens, text.len())
}
