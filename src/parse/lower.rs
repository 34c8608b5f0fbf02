//! Lowering a syntax tree into [`Stmt`]s.

use std::ops::Range;

use super::builder::NodeKind;
use super::lex::{LexRules, StrPart, Token, TokenKind};
use super::tree::SyntaxTree;
use crate::ast::{BinOp, Directive, DirectiveKind, Expr, ExprKind, Instruction, Label, Literal, Operand, PostOp, Stmt, StrSegment, UnOp};

pub(super) struct Lowerer<'a> {
    tokens: &'a [Token],
    tree: &'a SyntaxTree,
    rules: &'a LexRules,
    /// Byte offsets where lexical or syntax errors were reported.
    error_offsets: Vec<usize>,
}
impl<'a> Lowerer<'a> {
    pub(super) fn new(tokens: &'a [Token], tree: &'a SyntaxTree, rules: &'a LexRules, error_offsets: Vec<usize>) -> Self {
        Self { tokens, tree, rules, error_offsets }
    }

    pub(super) fn file(&self) -> Vec<Stmt> {
        let root = self.tree.root();
        self.tree.children(root)
            .filter(|(_, n)| n.kind == NodeKind::Line)
            .flat_map(|(i, _)| self.line(i))
            .collect()
    }

    fn byte_span(&self, tokens: &Range<usize>) -> Range<usize> {
        let start = self.tokens.get(tokens.start).map_or(0, |t| t.range.start);
        match tokens.is_empty() {
            true => start..start,
            false => start..self.tokens[tokens.end - 1].range.end,
        }
    }

    /// The significant tokens of a node which are not inside any of its children.
    fn own_tokens(&self, index: usize) -> Vec<&'a Token> {
        let node = self.tree.node(index);
        let mut own = vec![];
        let mut children = self.tree.children(index).map(|(_, c)| c.tokens.clone()).peekable();
        let mut i = node.tokens.start;
        while i < node.tokens.end {
            if let Some(c) = children.peek().filter(|c| c.start == i && !c.is_empty()) {
                i = c.end;
                children.next();
                continue;
            }
            while children.peek().is_some_and(|c| c.is_empty() && c.start <= i) {
                children.next();
            }
            if !self.tokens[i].is_trivia() {
                own.push(&self.tokens[i]);
            }
            i += 1;
        }
        own
    }

    fn line(&self, index: usize) -> Vec<Stmt> {
        let node = self.tree.node(index);
        let span = self.byte_span(&node.tokens);
        let has_error = self.error_offsets.iter().any(|&o| span.start <= o && o <= span.end)
            || self.tree.children(index).any(|(_, c)| c.kind == NodeKind::ErrorNode);

        let mut labels = vec![];
        let mut stmt = Stmt { span, ..Default::default() };
        for (i, child) in self.tree.children(index) {
            match child.kind {
                NodeKind::LabelDecl => {
                    if let Some(name) = self.own_tokens(i).first() {
                        let span = self.byte_span(&child.tokens);
                        labels.push(Label { name: name.text.clone(), span });
                    }
                },
                _ if has_error => {},
                NodeKind::Directive => stmt.directive = self.directive(i),
                NodeKind::Instruction => stmt.instr = self.instruction(i),
                NodeKind::ErrorNode => {},
                _ => stmt.expr = self.expr(i),
            }
        }

        // Only the last label shares its line with the rest of the statement.
        let mut stmts: Vec<_> = labels.into_iter()
            .map(|label| Stmt { span: label.span.clone(), label: Some(label), ..Default::default() })
            .collect();
        if !stmt.is_empty() {
            match stmts.pop() {
                Some(last) => stmts.push(Stmt { label: last.label, ..stmt }),
                None => stmts.push(stmt),
            }
        }
        stmts
    }

    fn directive(&self, index: usize) -> Option<Directive> {
        let node = self.tree.node(index);
        let name = self.own_tokens(index).first()?.text.clone();
        let args = self.tree.children(index)
            .map(|(i, _)| self.expr(i))
            .collect::<Option<Vec<_>>>()?;

        Some(Directive {
            kind: DirectiveKind::from_name(&name),
            name,
            args,
            span: self.byte_span(&node.tokens),
        })
    }

    fn instruction(&self, index: usize) -> Option<Instruction> {
        let node = self.tree.node(index);
        let mnemonic = self.own_tokens(index).first()?.text.clone();
        let operands = self.tree.children(index)
            .map(|(i, child)| match child.kind {
                NodeKind::OperandIndexed => {
                    let mut parts = self.tree.children(i).map(|(j, _)| self.expr(j));
                    let disp = parts.next()??;
                    let base = parts.next()??;
                    Some(Operand::Indexed { disp, base, span: self.byte_span(&child.tokens) })
                },
                _ => self.expr(i).map(Operand::Expr),
            })
            .collect::<Option<Vec<_>>>()?;

        Some(Instruction { mnemonic, operands, span: self.byte_span(&node.tokens) })
    }

    fn child_exprs(&self, index: usize) -> Option<Vec<Expr>> {
        self.tree.children(index).map(|(i, _)| self.expr(i)).collect()
    }

    fn expr(&self, index: usize) -> Option<Expr> {
        let node = self.tree.node(index);
        let span = self.byte_span(&node.tokens);

        let kind = match node.kind {
            NodeKind::Literal => {
                let tok = *self.own_tokens(index).first()?;
                match tok.kind {
                    TokenKind::Keyword if tok.text.eq_ignore_ascii_case("true") => ExprKind::Literal(Literal::Bool(true)),
                    TokenKind::Keyword if tok.text.eq_ignore_ascii_case("false") => ExprKind::Literal(Literal::Bool(false)),
                    TokenKind::Keyword => ExprKind::Ident(tok.text.clone()),
                    TokenKind::Int(_) => {
                        let (base, digits) = self.rules.split_int(&tok.text).ok()?;
                        ExprKind::Literal(Literal::Int { base, digits })
                    },
                    TokenKind::Float(form) => {
                        let text = tok.text.chars().filter(|&c| c != '_').collect();
                        ExprKind::Literal(Literal::Float { text, form })
                    },
                    TokenKind::Char => ExprKind::Literal(Literal::Char(self.decode_char(&tok.text)?)),
                    _ => return None,
                }
            },
            NodeKind::Name => ExprKind::Ident(self.own_tokens(index).first()?.text.clone()),
            NodeKind::Infix => {
                let op = BinOp::from_token(&self.own_tokens(index).first()?.text)?;
                let [lhs, rhs] = <[Expr; 2]>::try_from(self.child_exprs(index)?).ok()?;
                ExprKind::Infix { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
            },
            NodeKind::Prefix => {
                let op = UnOp::from_token(&self.own_tokens(index).first()?.text)?;
                let [operand] = <[Expr; 1]>::try_from(self.child_exprs(index)?).ok()?;
                ExprKind::Prefix { op, operand: Box::new(operand) }
            },
            NodeKind::Postfix => {
                let op = PostOp::from_token(&self.own_tokens(index).last()?.text)?;
                let [operand] = <[Expr; 1]>::try_from(self.child_exprs(index)?).ok()?;
                ExprKind::Postfix { op, operand: Box::new(operand) }
            },
            NodeKind::Group => {
                let [inner] = <[Expr; 1]>::try_from(self.child_exprs(index)?).ok()?;
                ExprKind::Group(Box::new(inner))
            },
            NodeKind::Assign => {
                let [target, value] = <[Expr; 2]>::try_from(self.child_exprs(index)?).ok()?;
                ExprKind::Assign { target: Box::new(target), value: Box::new(value) }
            },
            NodeKind::StrLiteral => ExprKind::Literal(Literal::Str(self.string(index)?)),
            _ => return None,
        };

        Some(Expr::new(kind, span))
    }

    fn decode_char(&self, text: &str) -> Option<char> {
        let mut chars = text.chars();
        chars.next()?;
        match chars.next()? {
            '\\' => self.rules.escape(chars.next()?),
            c => Some(c),
        }
    }

    fn string(&self, index: usize) -> Option<Vec<StrSegment>> {
        let node = self.tree.node(index);
        let mut segments: Vec<StrSegment> = vec![];
        let push_text = |segments: &mut Vec<StrSegment>, s: &str| match segments.last_mut() {
            Some(StrSegment::Text(t)) => t.push_str(s),
            _ => segments.push(StrSegment::Text(s.to_string())),
        };

        let mut children = self.tree.children(index).peekable();
        let mut i = node.tokens.start;
        while i < node.tokens.end {
            if let Some(&(ci, child)) = children.peek().filter(|(_, c)| c.tokens.start == i) {
                let [inner] = <[Expr; 1]>::try_from(self.child_exprs(ci)?).ok()?;
                segments.push(StrSegment::Interp(Box::new(inner)));
                i = child.tokens.end.max(i + 1);
                children.next();
                continue;
            }

            let tok = &self.tokens[i];
            match tok.kind {
                TokenKind::Str(StrPart::Content) => push_text(&mut segments, &tok.text),
                TokenKind::Str(StrPart::Escape) => {
                    let c = self.rules.escape(tok.text.chars().nth(1)?)?;
                    push_text(&mut segments, c.encode_utf8(&mut [0; 4]));
                },
                _ => {},
            }
            i += 1;
        }

        Some(segments)
    }
}
