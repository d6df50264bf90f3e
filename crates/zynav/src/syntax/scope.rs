//
// syntax/scope.rs
//
// Arena-backed scope tree built from a token stream
//

use super::tokenizer::{Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Namespace,
    Class,
    Method,
    Function,
}

/// Index of a scope inside its [`ScopeTree`]. Only meaningful for the tree
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub kind: ScopeKind,
    /// Empty for the global scope. Namespaces carry the full `A\B` path.
    pub name: String,
    /// Offset of the introducing keyword (0 for the global scope)
    pub start: usize,
    /// End of the closing brace; `None` while the scope is still open,
    /// which callers read as "extends to end of file"
    pub end: Option<usize>,
    /// Start of the name token
    pub name_offset: usize,
    /// Offset of the `{` that opens the body, if one was seen
    pub body_start: Option<usize>,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
}

/// Scopes of a single parse, stored in document order.
#[derive(Debug, Clone)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
    text_len: usize,
}

impl ScopeTree {
    fn new(text_len: usize) -> Self {
        Self {
            scopes: vec![Scope {
                kind: ScopeKind::Global,
                name: String::new(),
                start: 0,
                end: Some(text_len),
                name_offset: 0,
                body_start: None,
                parent: None,
                children: Vec::new(),
            }],
            text_len,
        }
    }

    fn push(&mut self, scope: Scope) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        if let Some(parent) = scope.parent {
            self.scopes[parent.index()].children.push(id);
        }
        self.scopes.push(scope);
        id
    }

    fn get_mut(&mut self, id: ScopeId) -> &mut Scope {
        &mut self.scopes[id.index()]
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    /// Number of scopes, the global scope included.
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// All scopes in document order, the global scope first.
    pub fn iter(&self) -> impl Iterator<Item = (ScopeId, &Scope)> + '_ {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// End offset, treating an open scope as extending to end of file.
    pub fn end_or_eof(&self, id: ScopeId) -> usize {
        self.get(id).end.unwrap_or(self.text_len)
    }

    pub fn contains(&self, id: ScopeId, offset: usize) -> bool {
        let scope = self.get(id);
        scope.start <= offset && offset < self.end_or_eof(id)
    }

    /// First scope of `kind` in document order.
    pub fn first_of_kind(&self, kind: ScopeKind) -> Option<ScopeId> {
        self.iter().find(|(_, s)| s.kind == kind).map(|(id, _)| id)
    }

    /// First class scope named `name`.
    pub fn find_class(&self, name: &str) -> Option<ScopeId> {
        self.iter()
            .find(|(_, s)| s.kind == ScopeKind::Class && s.name == name)
            .map(|(id, _)| id)
    }

    /// Deepest scope whose span contains `offset`.
    pub fn innermost_at(&self, offset: usize) -> ScopeId {
        let mut current = self.root();
        'descend: loop {
            for &child in &self.get(current).children {
                if self.contains(child, offset) {
                    current = child;
                    continue 'descend;
                }
            }
            return current;
        }
    }

    /// Nearest scope of `kind` at or above `id`.
    pub fn enclosing(&self, id: ScopeId, kind: ScopeKind) -> Option<ScopeId> {
        let mut current = Some(id);
        while let Some(cur) = current {
            let scope = self.get(cur);
            if scope.kind == kind {
                return Some(cur);
            }
            current = scope.parent;
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Body {
    /// Keyword and name seen, no `{` or `;` yet
    Pending,
    /// Body opened at this brace depth
    Braced(usize),
    /// `namespace X;` form, open until end of file
    FileLevel,
}

struct OpenScope {
    id: ScopeId,
    body: Body,
}

/// Build the scope tree for `tokens`, which must come from a buffer of
/// `text_len` bytes.
///
/// `namespace`, `class` and `function` keywords open scopes; a scope is
/// closed by the `}` that matches its own opening brace, so unnamed blocks
/// inside a body never close it early.
pub fn parse_scopes(tokens: &[Token<'_>], text_len: usize) -> ScopeTree {
    let mut tree = ScopeTree::new(text_len);
    let mut stack = vec![OpenScope {
        id: tree.root(),
        body: Body::FileLevel,
    }];
    let mut depth = 0usize;

    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::Keyword => {
                let Some(keyword_kind) = keyword_scope_kind(token.text) else {
                    continue;
                };
                let Some((name, name_offset)) = scope_name(tokens, i, keyword_kind) else {
                    continue;
                };
                let parent = stack.last().map_or(tree.root(), |open| open.id);
                let kind = match keyword_kind {
                    ScopeKind::Function if tree.get(parent).kind == ScopeKind::Class => {
                        ScopeKind::Method
                    }
                    other => other,
                };
                let id = tree.push(Scope {
                    kind,
                    name,
                    start: token.start,
                    end: None,
                    name_offset,
                    body_start: None,
                    parent: Some(parent),
                    children: Vec::new(),
                });
                stack.push(OpenScope {
                    id,
                    body: Body::Pending,
                });
            }
            TokenKind::BraceOpen => {
                depth += 1;
                if let Some(top) = stack.last_mut() {
                    if top.body == Body::Pending {
                        top.body = Body::Braced(depth);
                        tree.get_mut(top.id).body_start = Some(token.start);
                    }
                }
            }
            TokenKind::BraceClose => {
                if depth == 0 {
                    log::trace!("ignoring unmatched '}}' at offset {}", token.start);
                    continue;
                }
                close_pending(&mut tree, &mut stack, token.start);
                if let Some(top) = stack.last() {
                    if top.body == Body::Braced(depth) {
                        tree.get_mut(top.id).end = Some(token.end);
                        stack.pop();
                    }
                }
                depth -= 1;
            }
            TokenKind::Semicolon => {
                if let Some(top) = stack.last_mut() {
                    if top.body == Body::Pending {
                        if tree.get(top.id).kind == ScopeKind::Namespace {
                            top.body = Body::FileLevel;
                        } else {
                            // Bodiless declaration such as an abstract method.
                            tree.get_mut(top.id).end = Some(token.end);
                            stack.pop();
                        }
                    }
                }
            }
            _ => {}
        }
    }

    tree
}

/// Close class/function scopes that never received a body before a `}`.
fn close_pending(tree: &mut ScopeTree, stack: &mut Vec<OpenScope>, at: usize) {
    while let Some(top) = stack.last_mut() {
        if top.body != Body::Pending {
            return;
        }
        if tree.get(top.id).kind == ScopeKind::Namespace {
            top.body = Body::FileLevel;
            return;
        }
        tree.get_mut(top.id).end = Some(at);
        stack.pop();
    }
}

fn keyword_scope_kind(keyword: &str) -> Option<ScopeKind> {
    match keyword {
        "namespace" => Some(ScopeKind::Namespace),
        "class" => Some(ScopeKind::Class),
        "function" => Some(ScopeKind::Function),
        _ => None,
    }
}

/// Look past the keyword at `keyword_index` for the scope's name.
///
/// Stops at `;` or `{`; a function also stops at `(` so closures stay
/// anonymous. Namespace names are collected as `A\B\C` paths.
fn scope_name(tokens: &[Token<'_>], keyword_index: usize, kind: ScopeKind) -> Option<(String, usize)> {
    let mut j = keyword_index + 1;
    while let Some(token) = tokens.get(j) {
        match token.kind {
            TokenKind::BraceOpen | TokenKind::Semicolon => return None,
            TokenKind::Operator if kind == ScopeKind::Function && token.text == "(" => return None,
            TokenKind::Identifier => {
                let mut name = token.text.to_string();
                if kind == ScopeKind::Namespace {
                    while let (Some(sep), Some(next)) = (tokens.get(j + 1), tokens.get(j + 2)) {
                        if !(sep.is_operator("\\") && next.is(TokenKind::Identifier)) {
                            break;
                        }
                        name.push('\\');
                        name.push_str(next.text);
                        j += 2;
                    }
                }
                return Some((name, token.start));
            }
            _ => j += 1,
        }
    }
    None
}
