//! The grammar of the assembly dialect.
//!
//! ```text
//! file      := line* EOF
//! line      := label* [directive | instr | expr] (LINEBREAK | ';' | EOF)
//! label     := IDENT ':'
//! directive := '.'IDENT [expr (',' expr)*]
//! instr     := IDENT [operand (',' operand)*]
//! operand   := expr ['(' expr ')']
//! expr      := binary ['=' expr]
//! binary    := unary (BINOP binary)*
//! unary     := PREFIXOP unary | postfix
//! postfix   := primary POSTFIXOP*
//! primary   := INT | FLOAT | CHAR | KEYWORD | IDENT | string | '(' expr ')'
//! string    := '"' (CONTENT | ESCAPE | '${' expr '}')* '"'
//! ```
//!
//! Labels and assignment statements are recognized speculatively:
//! the grammar tries to parse them and rolls back if they don't fit.

use super::builder::{CompletedMarker, Expect, NodeKind, TreeBuilder};
use super::lex::{StrPart, TokenKind};
use super::ParseErrKind;
use crate::ast::{BinOp, PostOp, UnOp};

/// Parses a whole file.
pub fn file(p: &mut TreeBuilder<'_>) {
    let root = p.mark();
    p.skip_trivia();
    while !p.at_eof() {
        line(p);
    }
    p.done(root, NodeKind::File);
}

fn at_line_end(p: &TreeBuilder<'_>) -> bool {
    matches!(p.current_kind(), TokenKind::Linebreak | TokenKind::Eof) || p.at(Expect::Text(";"))
}

fn line(p: &mut TreeBuilder<'_>) {
    let m = p.mark();
    while label(p) {}

    if !at_line_end(p) {
        let (kind, text) = p.current().map_or((TokenKind::Eof, ""), |t| (t.kind, t.text.as_str()));
        match kind {
            TokenKind::Ident if text.len() > 1 && text.starts_with('.') => {
                if !assignment(p) { directive(p); }
            },
            TokenKind::Ident => {
                if !assignment(p) { instruction(p); }
            },
            _ => { expr(p); },
        }

        if !at_line_end(p) {
            recover(p);
        }
    }
    p.done(m, NodeKind::Line);

    if !p.at_eof() {
        // Line break or ';'
        p.bump();
    }
}

/// Parses a label declaration, or rolls back if there isn't one.
fn label(p: &mut TreeBuilder<'_>) -> bool {
    if !p.at(Expect::Kind(TokenKind::Ident)) {
        return false;
    }

    let m = p.mark();
    p.bump();
    if p.at(Expect::Text(":")) {
        p.bump();
        p.done(m, NodeKind::LabelDecl);
        true
    } else {
        p.rollback_to(m);
        false
    }
}

/// Parses an assignment statement, or rolls back if the line isn't one.
fn assignment(p: &mut TreeBuilder<'_>) -> bool {
    let m = p.mark();
    let e = expr(p);
    if e.kind() == NodeKind::Assign && at_line_end(p) {
        p.abandon(m);
        true
    } else {
        p.rollback_to(m);
        false
    }
}

fn directive(p: &mut TreeBuilder<'_>) {
    let m = p.mark();
    p.bump();
    if !at_line_end(p) {
        loop {
            expr(p);
            if !p.at(Expect::Text(",")) { break; }
            p.bump();
        }
    }
    p.done(m, NodeKind::Directive);
}

fn instruction(p: &mut TreeBuilder<'_>) {
    let m = p.mark();
    p.bump();
    if !at_line_end(p) {
        loop {
            operand(p);
            if !p.at(Expect::Text(",")) { break; }
            p.bump();
        }
    }
    p.done(m, NodeKind::Instruction);
}

fn operand(p: &mut TreeBuilder<'_>) {
    let disp = expr(p);
    if p.at(Expect::Text("(")) {
        let m = p.precede(&disp);
        p.bump();
        expr(p);
        p.expect(Expect::Text(")"));
        p.done(m, NodeKind::OperandIndexed);
    }
}

/// Parses an expression.
pub fn expr(p: &mut TreeBuilder<'_>) -> CompletedMarker {
    let lhs = binary(p, 0);
    if p.at(Expect::Text("=")) {
        let m = p.precede(&lhs);
        p.bump();
        expr(p);
        return p.done(m, NodeKind::Assign);
    }
    lhs
}

fn current_op<T>(p: &TreeBuilder<'_>, f: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    p.current()
        .filter(|t| t.kind == TokenKind::Operator)
        .and_then(|t| f(&t.text))
}

// Precedence climbing. Operators of equal precedence are left associative.
fn binary(p: &mut TreeBuilder<'_>, min_prec: u8) -> CompletedMarker {
    let mut lhs = unary(p);
    while let Some(op) = current_op(p, BinOp::from_token) {
        let prec = op.precedence();
        if prec <= min_prec { break; }

        let m = p.precede(&lhs);
        p.bump();
        binary(p, prec);
        lhs = p.done(m, NodeKind::Infix);
    }
    lhs
}

fn unary(p: &mut TreeBuilder<'_>) -> CompletedMarker {
    if current_op(p, UnOp::from_token).is_some() {
        let m = p.mark();
        p.bump();
        unary(p);
        return p.done(m, NodeKind::Prefix);
    }

    let mut e = primary(p);
    while current_op(p, PostOp::from_token).is_some() {
        let m = p.precede(&e);
        p.bump();
        e = p.done(m, NodeKind::Postfix);
    }
    e
}

fn primary(p: &mut TreeBuilder<'_>) -> CompletedMarker {
    let m = p.mark();
    match p.current_kind() {
        TokenKind::Int(_) | TokenKind::Float(_) | TokenKind::Char | TokenKind::Keyword => {
            p.bump();
            p.done(m, NodeKind::Literal)
        },
        TokenKind::Ident => {
            p.bump();
            p.done(m, NodeKind::Name)
        },
        TokenKind::Str(StrPart::Open) => {
            p.abandon(m);
            string(p)
        },
        TokenKind::Punct if p.at(Expect::Text("(")) => {
            p.bump();
            expr(p);
            p.expect(Expect::Text(")"));
            p.done(m, NodeKind::Group)
        },
        // Already reported by the lexer.
        TokenKind::Error(_) => p.done(m, NodeKind::ErrorNode),
        found => {
            let span = p.byte_range(p.pos());
            p.error(ParseErrKind::Expected { expected: "expression".into(), found }, span);
            p.done(m, NodeKind::ErrorNode)
        }
    }
}

fn string(p: &mut TreeBuilder<'_>) -> CompletedMarker {
    let m = p.mark();
    p.bump();
    loop {
        match p.current_kind() {
            TokenKind::Str(StrPart::Content | StrPart::Escape) => p.bump(),
            TokenKind::Str(StrPart::InterpOpen) => {
                let im = p.mark();
                p.bump();
                if !p.at(Expect::Kind(TokenKind::Str(StrPart::InterpClose))) {
                    expr(p);
                }
                match p.current_kind() {
                    TokenKind::Error(_) => p.bump(),
                    _ => { p.expect(Expect::Kind(TokenKind::Str(StrPart::InterpClose))); },
                }
                p.done(im, NodeKind::Interpolation);
            },
            TokenKind::Str(StrPart::Close) => {
                p.bump();
                break;
            },
            TokenKind::Error(e) => {
                p.bump();
                if matches!(e, super::lex::LexErr::UnclosedStrLit) { break; }
            },
            _ => break,
        }
    }
    p.done(m, NodeKind::StrLiteral)
}

/// Wraps the rest of the line in an error node.
fn recover(p: &mut TreeBuilder<'_>) {
    let span = p.byte_range(p.pos());
    let found = p.current_kind();
    let reported = p.last_error_span().is_some_and(|s| s.start == span.start);
    if !reported && !matches!(found, TokenKind::Error(_)) {
        p.error(ParseErrKind::Expected { expected: "end of line".into(), found }, span);
    }

    let m = p.mark();
    while !at_line_end(p) {
        p.bump();
    }
    p.done(m, NodeKind::ErrorNode);
}

#[cfg(test)]
mod tests {
    use super::file;
    use crate::parse::builder::{NodeKind, TreeBuilder};
    use crate::parse::lex::{tokenize, LexRules};
    use crate::parse::tree::SyntaxTree;

    fn kinds(src: &str) -> Vec<(NodeKind, usize)> {
        let tokens = tokenize(src, &LexRules::default());
        let mut p = TreeBuilder::new(&tokens);
        file(&mut p);
        let out = p.finish();
        assert!(out.fatal.is_empty(), "{:?}", out.fatal);

        let tree = SyntaxTree::new(&out.completed).unwrap();
        let mut acc = vec![];
        let mut stack = vec![(tree.root(), 0)];
        while let Some((i, depth)) = stack.pop() {
            acc.push((tree.node(i).kind, depth));
            let children: Vec<_> = tree.children(i).map(|(c, _)| c).collect();
            stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
        }
        acc
    }

    #[test]
    fn test_tree_shape() {
        assert_eq!(kinds("a: x = -b++ * 2"), [
            (NodeKind::File, 0),
            (NodeKind::Line, 1),
            (NodeKind::LabelDecl, 2),
            (NodeKind::Assign, 2),
            (NodeKind::Name, 3),
            (NodeKind::Infix, 3),
            (NodeKind::Prefix, 4),
            (NodeKind::Postfix, 5),
            (NodeKind::Name, 6),
            (NodeKind::Literal, 4),
        ]);
    }

    #[test]
    fn test_rollback_leaves_no_trace() {
        // `mov` is first tried as an assignment, then as an instruction.
        assert_eq!(kinds("mov a, b"), [
            (NodeKind::File, 0),
            (NodeKind::Line, 1),
            (NodeKind::Instruction, 2),
            (NodeKind::Name, 3),
            (NodeKind::Name, 3),
        ]);
    }

    #[test]
    fn test_root_covers_tokens() {
        let src = "  .text\nfoo: .word 1, 2 # c\n\n  ret\n";
        let rules = LexRules { keep_whitespace: true, keep_comments: true, ..Default::default() };
        let tokens = tokenize(src, &rules);
        let mut p = TreeBuilder::new(&tokens);
        file(&mut p);
        let out = p.finish();
        assert!(out.fatal.is_empty());
        assert!(out.errors.is_empty());

        let root = out.completed.iter().find(|n| n.kind == NodeKind::File).unwrap();
        assert_eq!(root.start_token, 0);
        assert_eq!(root.end_token, tokens.len() - 1);
    }
}
