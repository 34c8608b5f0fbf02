//! Parsing assembly source code into an AST.
//!
//! Parsing runs in four steps:
//! 1. [`lex::tokenize`] converts the source text into tokens, according to a [`LexRules`],
//! 2. [`grammar::file`] drives a [`builder::TreeBuilder`] over the tokens,
//!    producing a flat list of nodes,
//! 3. [`tree::SyntaxTree::new`] reconstructs those nodes into a tree,
//! 4. and the tree is lowered into [`Stmt`]s (one per line).
//!
//! Parsing never fails. Lexical and syntax errors become [`Diagnostic`]s on the resulting
//! [`SourceFile`], and the lines they occur on are left out of its statements.
//!
//! # Example
//! ```
//! use sectasm::parse::{parse_source, lex::LexRules};
//!
//! let file = parse_source("start: li a0, 1\n.word start", &LexRules::default());
//! assert!(!file.has_errors());
//! assert_eq!(file.stmts.len(), 2);
//! assert_eq!(file.stmts[0].label.as_ref().unwrap().name, "start");
//! assert_eq!(file.stmts[0].instr.as_ref().unwrap().operands.len(), 2);
//! ```

pub mod lex;
pub mod builder;
pub mod tree;
pub mod grammar;
mod lower;

use std::borrow::Cow;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::ast::Stmt;
use crate::err::{Diagnostic, ErrSpan, NodeRef, Severity};
use lex::{LexErr, LexRules, TokenKind};

/// Kinds of errors that can occur while parsing.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ParseErrKind {
    /// A lexical error.
    Lex(LexErr),
    /// A token did not match what the grammar required.
    Expected {
        /// What was expected.
        expected: String,
        /// What was found.
        found: TokenKind,
    },
    /// A token appeared where nothing else was allowed.
    Unexpected,
    /// A marker was completed, abandoned, or rolled back after it was already discarded.
    StaleMarker,
    /// A marker was never completed.
    UnclosedMarker,
}
impl std::fmt::Display for ParseErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErrKind::Lex(e) => e.fmt(f),
            ParseErrKind::Expected { expected, found } => write!(f, "expected {expected}, found {found}"),
            ParseErrKind::Unexpected => f.write_str("unexpected token"),
            ParseErrKind::StaleMarker => f.write_str("marker was used after it was discarded"),
            ParseErrKind::UnclosedMarker => f.write_str("marker was never completed"),
        }
    }
}

/// Error from parsing source code.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct ParseErr {
    /// The kind of error.
    pub kind: ParseErrKind,
    /// The byte span where the error occurred.
    pub span: Range<usize>,
}
impl ParseErr {
    /// Creates a new [`ParseErr`].
    pub fn new(kind: ParseErrKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Whether this error indicates the grammar misused the tree builder.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ParseErrKind::StaleMarker | ParseErrKind::UnclosedMarker)
    }
}
impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for ParseErr {}
impl crate::err::Error for ParseErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(ErrSpan::from(self.span.clone()))
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            ParseErrKind::Lex(e) => crate::err::Error::help(e),
            ParseErrKind::Expected { .. } => None,
            ParseErrKind::Unexpected => Some("statements end at a line break or ';'".into()),
            ParseErrKind::StaleMarker
            | ParseErrKind::UnclosedMarker => Some("this is a bug in the grammar, not in the source".into()),
        }
    }
}

/// A parsed source file.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Where this file came from.
    pub path: Arc<Path>,
    /// The source text.
    pub src: Arc<str>,
    /// The statements of the file, in order.
    pub stmts: Vec<Stmt>,
    /// Lexical and syntax diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}
impl SourceFile {
    /// Whether parsing raised any error diagnostics.
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Parses source text that has no particular path.
pub fn parse_source(src: &str, rules: &LexRules) -> SourceFile {
    parse_file(Path::new("<source>"), src, rules)
}

/// Parses source text, attaching the given path to it and its diagnostics.
pub fn parse_file(path: &Path, src: &str, rules: &LexRules) -> SourceFile {
    let path: Arc<Path> = Arc::from(path);
    let tokens = lex::tokenize(src, rules);

    let mut diagnostics = vec![];
    for t in &tokens {
        if let TokenKind::Error(e) = t.kind {
            let err = ParseErr::new(ParseErrKind::Lex(e), t.range.clone());
            diagnostics.push(Diagnostic::from_err(&err, Severity::Error, Some(&path), NodeRef::Syntax));
        }
    }

    let mut p = builder::TreeBuilder::new(&tokens);
    grammar::file(&mut p);
    let out = p.finish();

    for err in out.errors.iter().chain(&out.fatal) {
        diagnostics.push(Diagnostic::from_err(err, Severity::Error, Some(&path), NodeRef::Syntax));
    }

    let error_offsets = tokens.iter()
        .filter(|t| matches!(t.kind, TokenKind::Error(_)))
        .map(|t| t.range.start)
        .chain(out.errors.iter().map(|e| e.span.start))
        .collect();
    let stmts = match (out.fatal.is_empty(), tree::SyntaxTree::new(&out.completed)) {
        (true, Some(tree)) => lower::Lowerer::new(&tokens, &tree, rules, error_offsets).file(),
        _ => vec![],
    };

    tracing::debug!(
        path = %path.display(),
        tokens = tokens.len(),
        stmts = stmts.len(),
        diagnostics = diagnostics.len(),
        "parsed file"
    );

    SourceFile { path, src: Arc::from(src), stmts, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::{parse_source, ParseErrKind};
    use crate::ast::{BinOp, DirectiveKind, ExprKind, Literal, Operand, StrSegment, UnOp};
    use crate::ast::directive::AssignKind;
    use crate::parse::lex::{IntBase, LexRules};

    fn parse(src: &str) -> super::SourceFile {
        parse_source(src, &LexRules::default())
    }

    #[test]
    fn test_labels_and_instructions() {
        let f = parse("loop: addi t0, t0, -1\n  bnez t0, loop\n");
        assert!(!f.has_errors(), "{:?}", f.diagnostics);
        assert_eq!(f.stmts.len(), 2);

        let s0 = &f.stmts[0];
        assert_eq!(s0.label.as_ref().map(|l| &*l.name), Some("loop"));
        let i0 = s0.instr.as_ref().unwrap();
        assert_eq!(i0.mnemonic, "addi");
        assert_eq!(i0.operands.len(), 3);
        let Operand::Expr(e) = &i0.operands[2] else { panic!("expected plain operand") };
        assert!(matches!(&e.kind, ExprKind::Prefix { op: UnOp::Neg, .. }));

        assert_eq!(f.stmts[1].label, None);
        assert_eq!(f.stmts[1].instr.as_ref().unwrap().mnemonic, "bnez");
    }

    #[test]
    fn test_multiple_labels() {
        let f = parse("a: b: nop");
        assert!(!f.has_errors());
        assert_eq!(f.stmts.len(), 2);
        assert_eq!(f.stmts[0].label.as_ref().unwrap().name, "a");
        assert!(f.stmts[0].instr.is_none());
        assert_eq!(f.stmts[1].label.as_ref().unwrap().name, "b");
        assert!(f.stmts[1].instr.is_some());
    }

    #[test]
    fn test_indexed_operand() {
        let f = parse("lw a0, 8(sp)");
        let instr = f.stmts[0].instr.as_ref().unwrap();
        let Operand::Indexed { disp, base, span } = &instr.operands[1] else { panic!("expected indexed operand") };
        assert_eq!(disp.to_string(), "8");
        assert_eq!(base.as_ident(), Some("sp"));
        assert_eq!(*span, 7..12);
    }

    #[test]
    fn test_precedence() {
        let f = parse("x = 1 + 2 * 3 << 1 | 4");
        assert!(!f.has_errors());
        let e = f.stmts[0].expr.as_ref().unwrap();
        let ExprKind::Assign { target, value } = &e.kind else { panic!("expected assignment") };
        assert_eq!(target.as_ident(), Some("x"));

        let ExprKind::Infix { op: BinOp::Or, lhs, .. } = &value.kind else { panic!("expected |") };
        let ExprKind::Infix { op: BinOp::Shl, lhs, .. } = &lhs.kind else { panic!("expected <<") };
        let ExprKind::Infix { op: BinOp::Add, rhs, .. } = &lhs.kind else { panic!("expected +") };
        assert!(matches!(&rhs.kind, ExprKind::Infix { op: BinOp::Mul, .. }));

        // Left associativity.
        let f = parse("y = 8 - 2 - 1");
        let ExprKind::Assign { value, .. } = &f.stmts[0].expr.as_ref().unwrap().kind else { panic!() };
        assert_eq!(value.to_string(), "8 - 2 - 1");
        let ExprKind::Infix { lhs, .. } = &value.kind else { panic!() };
        assert_eq!(lhs.to_string(), "8 - 2");
    }

    #[test]
    fn test_directives() {
        let f = parse(".section .data, \"aw\", @progbits\n.byte 1, 'a', 0x10\n.set N, 4\n.asciz \"hi\\n\"");
        assert!(!f.has_errors(), "{:?}", f.diagnostics);
        assert_eq!(f.stmts.len(), 4);

        let d0 = f.stmts[0].directive.as_ref().unwrap();
        assert_eq!(d0.kind, DirectiveKind::Section);
        assert_eq!(d0.args.len(), 3);
        assert_eq!(d0.args[1].as_plain_str().as_deref(), Some("aw"));

        let d1 = f.stmts[1].directive.as_ref().unwrap();
        assert_eq!(d1.kind, DirectiveKind::Emit(1));
        assert_eq!(d1.args[1].kind, ExprKind::Literal(Literal::Char('a')));
        assert_eq!(d1.args[2].kind, ExprKind::Literal(Literal::Int { base: IntBase::Hex, digits: "10".into() }));

        assert_eq!(f.stmts[2].directive.as_ref().unwrap().kind, DirectiveKind::Assign(AssignKind::Set));
        assert_eq!(f.stmts[3].directive.as_ref().unwrap().args[0].as_plain_str().as_deref(), Some("hi\n"));
    }

    #[test]
    fn test_interpolation() {
        let f = parse(".ascii \"v=${1 + 2}!\"");
        assert!(!f.has_errors(), "{:?}", f.diagnostics);
        let arg = &f.stmts[0].directive.as_ref().unwrap().args[0];
        let ExprKind::Literal(Literal::Str(segs)) = &arg.kind else { panic!("expected string") };
        assert_eq!(segs.len(), 3);
        assert_eq!(segs[0], StrSegment::Text("v=".into()));
        assert!(matches!(&segs[1], StrSegment::Interp(e) if e.to_string() == "1 + 2"));
        assert_eq!(segs[2], StrSegment::Text("!".into()));
    }

    #[test]
    fn test_dot_assignment_and_semicolons() {
        let f = parse(". = 0x100; .L1: .word .");
        assert!(!f.has_errors(), "{:?}", f.diagnostics);
        assert_eq!(f.stmts.len(), 2);
        let ExprKind::Assign { target, .. } = &f.stmts[0].expr.as_ref().unwrap().kind else { panic!() };
        assert_eq!(target.as_ident(), Some("."));
        assert_eq!(f.stmts[1].label.as_ref().unwrap().name, ".L1");
    }

    #[test]
    fn test_error_recovery() {
        let f = parse("li a0, )\nnop\n.byte 1 2\nret");
        let errors: Vec<_> = f.diagnostics.iter().filter(|d| d.is_error()).collect();
        assert_eq!(errors.len(), 2, "{errors:?}");

        // The malformed lines are dropped, the rest still parse.
        let mnemonics: Vec<_> = f.stmts.iter()
            .filter_map(|s| s.instr.as_ref())
            .map(|i| i.mnemonic.as_str())
            .collect();
        assert_eq!(mnemonics, ["nop", "ret"]);
        assert!(f.stmts.iter().all(|s| s.directive.is_none()));
    }

    #[test]
    fn test_lex_errors_reported_once() {
        let f = parse(".byte 0x1G\n.word ?");
        assert_eq!(f.diagnostics.len(), 2, "{:?}", f.diagnostics);
        assert!(f.stmts.is_empty());
        assert!(f.diagnostics.iter().all(|d| d.is_error()));
    }

    #[test]
    fn test_label_keeps_on_bad_line() {
        let f = parse("lbl: .word (1");
        assert!(f.has_errors());
        assert_eq!(f.stmts.len(), 1);
        assert_eq!(f.stmts[0].label.as_ref().unwrap().name, "lbl");
        assert!(f.stmts[0].directive.is_none());
    }

    #[test]
    fn test_err_kinds() {
        let f = parse("(1");
        let err = f.diagnostics.first().unwrap();
        assert_eq!(err.message, ParseErrKind::Expected { expected: "')'".into(), found: crate::parse::lex::TokenKind::Eof }.to_string());
    }
}
