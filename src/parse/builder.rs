//! The incremental tree builder.
//!
//! A grammar drives a [`TreeBuilder`] over a token list by opening [`Marker`]s
//! at the current position and later closing them into nodes:
//! - [`TreeBuilder::mark`] opens a marker at the current token,
//! - [`TreeBuilder::done`] closes a marker into a node covering everything consumed since it opened,
//! - [`TreeBuilder::abandon`] drops a marker without producing a node,
//! - [`TreeBuilder::precede`] opens a marker at the start of an existing marker or node,
//!   so that a node can be wrapped after it has been built (e.g., the left operand of a binary operator),
//! - [`TreeBuilder::rollback_to`] returns to the state just before a marker was opened,
//!   discarding everything that happened since (speculative parsing).
//!
//! The builder never builds a tree itself. It produces a flat list of [`CompletedNode`]s,
//! which [`SyntaxTree::new`] reconstructs into a tree.
//!
//! [`SyntaxTree::new`]: super::tree::SyntaxTree::new

use std::ops::Range;

use super::lex::{Token, TokenKind};
use super::{ParseErr, ParseErrKind};

/// The kinds of node the grammar produces.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum NodeKind {
    /// The whole file.
    File,
    /// One statement.
    Line,
    /// `name:`
    LabelDecl,
    /// A mnemonic and its operands.
    Instruction,
    /// `disp(base)`
    OperandIndexed,
    /// A directive and its arguments.
    Directive,
    /// An integer, float, character, or boolean literal.
    Literal,
    /// A string literal.
    StrLiteral,
    /// `${expr}` inside of a string literal.
    Interpolation,
    /// An identifier.
    Name,
    /// A binary operation.
    Infix,
    /// A prefix operation.
    Prefix,
    /// A postfix operation.
    Postfix,
    /// A parenthesized expression.
    Group,
    /// `target = value`
    Assign,
    /// Tokens which could not be parsed.
    ErrorNode,
}

/// A marker which has been opened and must be closed.
///
/// A marker must eventually be passed to [`TreeBuilder::done`], [`TreeBuilder::abandon`],
/// or [`TreeBuilder::rollback_to`]. Markers still open when the builder finishes
/// are reported as fatal errors.
#[must_use = "markers must be completed, abandoned, or rolled back"]
#[derive(Debug, PartialEq, Eq)]
pub struct Marker {
    id: u64,
    start: usize,
}

/// A marker which has been completed into a node.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CompletedMarker {
    id: u64,
    start: usize,
    end: usize,
    kind: NodeKind,
}
impl CompletedMarker {
    /// The kind of node this marker completed into.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// The half-open token range of the node.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Anything that has a start position that [`TreeBuilder::precede`] can open a new marker at.
pub trait AnyMarker {
    /// The marker's id.
    fn id(&self) -> u64;
    /// The token index the marker starts at.
    fn start(&self) -> usize;
}
impl AnyMarker for Marker {
    fn id(&self) -> u64 { self.id }
    fn start(&self) -> usize { self.start }
}
impl AnyMarker for CompletedMarker {
    fn id(&self) -> u64 { self.id }
    fn start(&self) -> usize { self.start }
}

/// A node produced by the builder.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct CompletedNode {
    /// The id of the marker that produced this node.
    pub id: u64,
    /// The first token of the node.
    pub start_token: usize,
    /// The token after the last token of the node.
    pub end_token: usize,
    /// The kind of node.
    pub kind: NodeKind,
    /// If this node was opened with [`TreeBuilder::precede`], the id of the marker it wraps.
    pub precedes: Option<u64>,
}
impl CompletedNode {
    /// The half-open token range of the node.
    pub fn range(&self) -> Range<usize> {
        self.start_token..self.end_token
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Active,
    Completed,
    Abandoned,
}

/// The state of the builder just before a marker was created.
#[derive(Debug, Clone)]
struct Slot {
    id: u64,
    state: SlotState,
    precedes: Option<u64>,
    cursor: usize,
    last_end: usize,
    n_completed: usize,
    n_errors: usize,
}

/// The output of a finished [`TreeBuilder`].
#[derive(Debug)]
pub struct BuilderOutput {
    /// The nodes, in order of completion.
    pub completed: Vec<CompletedNode>,
    /// Syntax errors.
    pub errors: Vec<ParseErr>,
    /// Errors which indicate the grammar misused the builder.
    ///
    /// If this is non-empty, the nodes should not be trusted.
    pub fatal: Vec<ParseErr>,
}

/// Something a token can be expected to be.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Expect<'a> {
    /// A token of the given kind.
    Kind(TokenKind),
    /// A token with the given text.
    Text(&'a str),
}
impl std::fmt::Display for Expect<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expect::Kind(k) => k.fmt(f),
            Expect::Text(t) => write!(f, "'{t}'"),
        }
    }
}

/// Builds a flat node list out of a token list.
///
/// # Example
/// ```
/// use sectasm::parse::builder::{TreeBuilder, NodeKind};
/// use sectasm::parse::lex::{tokenize, LexRules};
///
/// let tokens = tokenize("a + b", &LexRules::default());
/// let mut p = TreeBuilder::new(&tokens);
///
/// let m = p.mark();
/// p.bump();
/// let lhs = p.done(m, NodeKind::Name);
///
/// // Wrap `a` into `a + b` now that we know it's an operand.
/// let infix = p.precede(&lhs);
/// p.bump();
/// let m = p.mark();
/// p.bump();
/// p.done(m, NodeKind::Name);
/// let node = p.done(infix, NodeKind::Infix);
///
/// assert_eq!(node.range(), 0..3);
/// assert!(p.finish().fatal.is_empty());
/// ```
pub struct TreeBuilder<'t> {
    tokens: &'t [Token],
    cursor: usize,
    last_end: usize,
    next_id: u64,
    slots: Vec<Slot>,
    completed: Vec<CompletedNode>,
    errors: Vec<ParseErr>,
    fatal: Vec<ParseErr>,
}
impl<'t> TreeBuilder<'t> {
    /// Creates a new builder over a token list.
    ///
    /// The token list should end with an [`TokenKind::Eof`] token.
    /// The builder starts at the very first token, even if it is trivia.
    pub fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            cursor: 0,
            last_end: 0,
            next_id: 0,
            slots: vec![],
            completed: vec![],
            errors: vec![],
            fatal: vec![],
        }
    }

    /// The tokens this builder is running over.
    pub fn tokens(&self) -> &'t [Token] {
        self.tokens
    }

    /// The index of the current token.
    pub fn pos(&self) -> usize {
        self.cursor
    }

    /// The current token.
    pub fn current(&self) -> Option<&'t Token> {
        self.tokens.get(self.cursor)
    }

    /// The kind of the current token ([`TokenKind::Eof`] past the end).
    pub fn current_kind(&self) -> TokenKind {
        self.current().map_or(TokenKind::Eof, |t| t.kind)
    }

    /// The `n`th significant token after the current one.
    pub fn nth(&self, n: usize) -> Option<&'t Token> {
        self.tokens[self.cursor.min(self.tokens.len())..]
            .iter()
            .filter(|t| !t.is_trivia())
            .nth(n)
    }

    /// Whether the current token matches.
    pub fn at(&self, e: Expect<'_>) -> bool {
        self.current().is_some_and(|t| match e {
            Expect::Kind(k) => t.kind == k,
            Expect::Text(s) => t.text == s && !matches!(t.kind, TokenKind::Str(_) | TokenKind::Comment),
        })
    }

    /// Whether the builder has consumed every token (except for the final `Eof`).
    pub fn at_eof(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    /// The byte range of the token at the given index.
    ///
    /// For indices past the end, this is an empty range at the end of source.
    pub fn byte_range(&self, index: usize) -> Range<usize> {
        match self.tokens.get(index).or(self.tokens.last()) {
            Some(t) if index < self.tokens.len() => t.range.clone(),
            Some(t) => t.range.end..t.range.end,
            None => 0..0,
        }
    }

    /// Skips whitespace and comments.
    pub fn skip_trivia(&mut self) {
        while self.current().is_some_and(Token::is_trivia) {
            self.cursor += 1;
        }
    }

    /// Consumes the current token (and any trivia after it).
    ///
    /// This does nothing at the end of input.
    pub fn bump(&mut self) {
        if self.cursor < self.tokens.len() && !self.at_eof() {
            self.cursor += 1;
            self.last_end = self.cursor;
            self.skip_trivia();
        }
    }

    /// Consumes the current token if it matches, otherwise records an error at the current token.
    ///
    /// Returns whether the token matched.
    pub fn expect(&mut self, e: Expect<'_>) -> bool {
        if self.at(e) {
            self.bump();
            true
        } else {
            let found = self.current_kind();
            self.error(ParseErrKind::Expected { expected: e.to_string(), found }, self.byte_range(self.cursor));
            false
        }
    }

    /// Records a syntax error.
    pub fn error(&mut self, kind: ParseErrKind, span: Range<usize>) {
        self.errors.push(ParseErr::new(kind, span));
    }

    /// The span of the most recently recorded syntax error.
    pub fn last_error_span(&self) -> Option<&Range<usize>> {
        self.errors.last().map(|e| &e.span)
    }

    /// Opens a marker at the current token.
    pub fn mark(&mut self) -> Marker {
        self.open(self.cursor, None)
    }

    fn open(&mut self, start: usize, precedes: Option<u64>) -> Marker {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.push(Slot {
            id,
            state: SlotState::Active,
            precedes,
            cursor: self.cursor,
            last_end: self.last_end,
            n_completed: self.completed.len(),
            n_errors: self.errors.len(),
        });
        Marker { id, start }
    }

    fn slot_mut(&mut self, id: u64) -> Option<&mut Slot> {
        // Slots are always sorted by id.
        let i = self.slots.binary_search_by_key(&id, |s| s.id).ok()?;
        self.slots.get_mut(i)
    }

    /// Opens a marker at the same start as another marker, which will wrap it.
    pub fn precede<M: AnyMarker>(&mut self, inner: &M) -> Marker {
        self.open(inner.start(), Some(inner.id()))
    }

    /// Closes a marker into a node ending at the last consumed token.
    ///
    /// Completing a marker that was rolled back or already closed is recorded as a fatal error.
    pub fn done(&mut self, m: Marker, kind: NodeKind) -> CompletedMarker {
        let end = self.last_end.max(m.start);
        let cm = CompletedMarker { id: m.id, start: m.start, end, kind };

        let span = self.byte_range(m.start);
        let precedes = match self.slot_mut(m.id) {
            Some(slot) if slot.state == SlotState::Active => {
                slot.state = SlotState::Completed;
                slot.precedes
            },
            _ => {
                self.fatal.push(ParseErr::new(ParseErrKind::StaleMarker, span));
                return cm;
            }
        };

        self.completed.push(CompletedNode { id: m.id, start_token: m.start, end_token: end, kind, precedes });
        cm
    }

    /// Drops a marker without producing a node.
    pub fn abandon(&mut self, m: Marker) {
        let span = self.byte_range(m.start);
        match self.slot_mut(m.id) {
            Some(slot) if slot.state == SlotState::Active => slot.state = SlotState::Abandoned,
            _ => self.fatal.push(ParseErr::new(ParseErrKind::StaleMarker, span)),
        }
    }

    /// Restores the builder to its state just before the marker was opened.
    ///
    /// Every marker, node, and error created at or after the marker is discarded.
    pub fn rollback_to(&mut self, m: Marker) {
        let i = self.slots.partition_point(|s| s.id < m.id);
        let Some(slot) = self.slots.get(i).filter(|s| s.id == m.id).cloned() else {
            let span = self.byte_range(m.start);
            self.fatal.push(ParseErr::new(ParseErrKind::StaleMarker, span));
            return;
        };

        self.slots.truncate(i);
        // Older markers which were completed after this one was opened are open again.
        for node in self.completed.drain(slot.n_completed..) {
            if let Ok(j) = self.slots.binary_search_by_key(&node.id, |s| s.id) {
                self.slots[j].state = SlotState::Active;
            }
        }
        self.errors.truncate(slot.n_errors);
        self.cursor = slot.cursor;
        self.last_end = slot.last_end;
    }

    /// Finishes building.
    ///
    /// Markers which are still open are reported as fatal errors.
    pub fn finish(mut self) -> BuilderOutput {
        let unclosed: Vec<_> = self.slots.iter()
            .filter(|s| s.state == SlotState::Active)
            .map(|s| s.cursor)
            .collect();
        for start in unclosed {
            let span = self.byte_range(start);
            self.fatal.push(ParseErr::new(ParseErrKind::UnclosedMarker, span));
        }

        BuilderOutput { completed: self.completed, errors: self.errors, fatal: self.fatal }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{Expect, NodeKind, TreeBuilder};
    use crate::parse::lex::{tokenize, LexRules, TokenKind};
    use crate::parse::ParseErrKind;

    #[test]
    fn test_done_excludes_trailing_trivia() {
        let rules = LexRules { keep_whitespace: true, keep_comments: true, ..Default::default() };
        let tokens = tokenize("a   # c\nb", &rules);
        let mut p = TreeBuilder::new(&tokens);

        let m = p.mark();
        p.bump();
        let a = p.done(m, NodeKind::Name);
        // `a`, then whitespace and comment were skipped.
        assert_eq!(a.range(), 0..1);
        assert!(p.at(Expect::Kind(TokenKind::Linebreak)));
        assert!(p.finish().fatal.is_empty());
    }

    #[test]
    fn test_precede_chain() {
        let tokens = tokenize("a + b", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);

        let m = p.mark();
        p.bump();
        let lhs = p.done(m, NodeKind::Name);
        let outer = p.precede(&lhs);
        p.bump();
        let m = p.mark();
        p.bump();
        p.done(m, NodeKind::Name);
        p.done(outer, NodeKind::Infix);

        let out = p.finish();
        assert!(out.fatal.is_empty());
        let infix = out.completed.iter().find(|n| n.kind == NodeKind::Infix).unwrap();
        assert_eq!(infix.precedes, Some(out.completed[0].id));
        assert_eq!(infix.range(), 0..3);
    }

    #[test]
    fn test_rollback() {
        let tokens = tokenize("a b c", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);

        let outer = p.mark();
        let m = p.mark();
        p.bump();
        let inner = p.mark();
        p.bump();
        p.done(inner, NodeKind::Name);
        p.error(ParseErrKind::Unexpected, 0..1);
        p.rollback_to(m);

        assert_eq!(p.pos(), 0);
        p.bump();
        p.bump();
        p.bump();
        p.done(outer, NodeKind::Line);

        let out = p.finish();
        assert!(out.fatal.is_empty());
        assert!(out.errors.is_empty());
        assert_eq!(out.completed.len(), 1);
        assert_eq!(out.completed[0].range(), 0..3);
    }

    #[test]
    fn test_rollback_reopens_completed() {
        let tokens = tokenize("a b", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);

        let outer = p.mark();
        let attempt = p.mark();
        p.bump();
        // The outer marker closing is part of what gets undone.
        let _ = p.done(outer, NodeKind::Line);
        p.rollback_to(attempt);

        let out = p.finish();
        assert!(out.completed.is_empty());
        assert_eq!(out.fatal.len(), 1);
        assert_eq!(out.fatal[0].kind, ParseErrKind::UnclosedMarker);
    }

    #[test]
    fn test_stale_marker() {
        let tokens = tokenize("a b", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);

        let outer = p.mark();
        let inner = p.mark();
        p.bump();
        p.rollback_to(outer);
        // `inner` was created after `outer`, so it is gone.
        let _ = p.done(inner, NodeKind::Name);

        let out = p.finish();
        assert!(out.completed.is_empty());
        assert_eq!(out.fatal.len(), 1);
        assert_eq!(out.fatal[0].kind, ParseErrKind::StaleMarker);
    }

    #[test]
    fn test_unclosed_marker() {
        let tokens = tokenize("a", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);
        let _m = p.mark();
        let out = p.finish();
        assert_eq!(out.fatal.len(), 1);
        assert_eq!(out.fatal[0].kind, ParseErrKind::UnclosedMarker);
    }

    #[test]
    fn test_expect() {
        let tokens = tokenize("a ,", &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);
        assert!(p.expect(Expect::Kind(TokenKind::Ident)));
        assert!(!p.expect(Expect::Text(":")));
        assert!(p.expect(Expect::Text(",")));
        assert!(p.at_eof());

        let out = p.finish();
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].span, 2..3);
    }

    #[test]
    fn test_random_marker_wellformedness() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let src = (0..40).map(|i| format!("t{i}")).collect::<Vec<_>>().join(" ");
        let tokens = tokenize(&src, &LexRules::default());

        for _ in 0..200 {
            let mut p = TreeBuilder::new(&tokens);
            let root = p.mark();
            let mut stack = vec![];

            while !p.at_eof() {
                match rng.gen_range(0..6) {
                    0 => stack.push(p.mark()),
                    1 | 2 => p.bump(),
                    3 => if let Some(m) = stack.pop() { p.done(m, NodeKind::Name); },
                    4 => if let Some(m) = stack.pop() { p.abandon(m); },
                    _ => if let Some(m) = stack.pop() {
                        let cm = p.done(m, NodeKind::Name);
                        let w = p.precede(&cm);
                        p.bump();
                        stack.push(w);
                    },
                }
            }
            while let Some(m) = stack.pop() {
                p.done(m, NodeKind::Group);
            }
            p.done(root, NodeKind::File);

            let out = p.finish();
            assert!(out.fatal.is_empty());
            let root = out.completed.last().unwrap();
            assert_eq!(root.range(), 0..tokens.len() - 1);

            // Every pair of nodes is disjoint or nested.
            for a in &out.completed {
                assert!(a.start_token <= a.end_token);
                for b in &out.completed {
                    let disjoint = a.end_token <= b.start_token || b.end_token <= a.start_token;
                    let a_in_b = b.start_token <= a.start_token && a.end_token <= b.end_token;
                    let b_in_a = a.start_token <= b.start_token && b.end_token <= a.end_token;
                    assert!(disjoint || a_in_b || b_in_a, "{a:?} overlaps {b:?}");
                }
            }
        }
    }
}
