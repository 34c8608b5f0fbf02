//! Components relating to the abstract syntax tree (AST) of assembly source.
//!
//! A source file lowers into a list of [`Stmt`]s (one per source line), each holding
//! some combination of:
//! - a [`Label`] declaration,
//! - an [`Instruction`] (a mnemonic and its operands),
//! - a [`Directive`] (see [`directive::DirectiveKind`] for the recognized directives),
//! - and a bare [`Expr`] (usually an assignment, `name = value`).
//!
//! Every node carries the byte span it occupies in its file.

pub mod directive;

use std::fmt::Write as _;
use std::ops::Range;

pub use directive::DirectiveKind;
use crate::parse::lex::{FloatForm, IntBase};

/// An expression, along with its span in source.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Expr {
    /// The expression.
    pub kind: ExprKind,
    /// The byte span of the expression.
    pub span: Range<usize>,
}
impl Expr {
    /// Creates a new expression.
    pub fn new(kind: ExprKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// If this expression is a bare identifier, gets its name.
    pub fn as_ident(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// If this expression is a string literal without interpolation, gets its text.
    pub fn as_plain_str(&self) -> Option<String> {
        let ExprKind::Literal(Literal::Str(segments)) = &self.kind else { return None };
        segments.iter().try_fold(String::new(), |mut acc, s| match s {
            StrSegment::Text(t) => { acc.push_str(t); Some(acc) },
            StrSegment::Interp(_) => None,
        })
    }
}

/// The kinds of expression.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum ExprKind {
    /// A literal value (e.g., `12`, `1.5`, `'a'`, `"abc"`, `true`).
    Literal(Literal),
    /// A name (e.g., a symbol, `.`).
    Ident(String),
    /// A binary operation (e.g., `a + b`).
    Infix {
        /// The operator.
        op: BinOp,
        /// The left operand.
        lhs: Box<Expr>,
        /// The right operand.
        rhs: Box<Expr>,
    },
    /// A prefix operation (e.g., `-a`).
    Prefix {
        /// The operator.
        op: UnOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A postfix operation (e.g., `a++`).
    Postfix {
        /// The operator.
        op: PostOp,
        /// The operand.
        operand: Box<Expr>,
    },
    /// A parenthesized expression.
    Group(Box<Expr>),
    /// An assignment (`target = value`).
    Assign {
        /// Where the value is assigned.
        target: Box<Expr>,
        /// The value.
        value: Box<Expr>,
    },
}

/// A literal value, as written in source.
///
/// Literals are kept in their source form. Each evaluation domain decides
/// which of these it accepts and how to interpret them.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Literal {
    /// An integer literal (digits have their prefix and separators removed).
    Int {
        /// The base of the literal.
        base: IntBase,
        /// The digits of the literal.
        digits: String,
    },
    /// A floating point literal.
    Float {
        /// The literal's source text (without separators).
        text: String,
        /// The shape of the literal.
        form: FloatForm,
    },
    /// A character literal (escapes decoded).
    Char(char),
    /// A string literal (escapes decoded).
    Str(Vec<StrSegment>),
    /// `true` or `false`.
    Bool(bool),
}
impl Literal {
    /// A readable name for the type of literal.
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Int { .. } => "integer",
            Literal::Float { .. } => "float",
            Literal::Char(_) => "character",
            Literal::Str(_) => "string",
            Literal::Bool(_) => "boolean",
        }
    }
}

/// A piece of a string literal.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum StrSegment {
    /// Literal text.
    Text(String),
    /// An interpolated expression (`${expr}`).
    Interp(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[allow(missing_docs)]
pub enum BinOp {
    Add, Sub, Mul, Div, Rem,
    Shl, Shr,
    And, Or, Xor,
    LogAnd, LogOr,
    Eq, Ne, Lt, Le, Gt, Ge,
}
impl BinOp {
    /// Gets the operator matching the token text, if any.
    pub fn from_token(text: &str) -> Option<Self> {
        let op = match text {
            "+"  => BinOp::Add,
            "-"  => BinOp::Sub,
            "*"  => BinOp::Mul,
            "/"  => BinOp::Div,
            "%"  => BinOp::Rem,
            "<<" => BinOp::Shl,
            ">>" => BinOp::Shr,
            "&"  => BinOp::And,
            "|"  => BinOp::Or,
            "^"  => BinOp::Xor,
            "&&" => BinOp::LogAnd,
            "||" => BinOp::LogOr,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<"  => BinOp::Lt,
            "<=" => BinOp::Le,
            ">"  => BinOp::Gt,
            ">=" => BinOp::Ge,
            _ => return None,
        };
        Some(op)
    }

    /// The operator as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Rem => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::And => "&",
            BinOp::Or  => "|",
            BinOp::Xor => "^",
            BinOp::LogAnd => "&&",
            BinOp::LogOr  => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
        }
    }

    /// The binding power of the operator. Higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinOp::LogOr  => 1,
            BinOp::LogAnd => 2,
            BinOp::Or     => 3,
            BinOp::Xor    => 4,
            BinOp::And    => 5,
            BinOp::Eq | BinOp::Ne => 6,
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => 7,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Mul | BinOp::Div | BinOp::Rem => 10,
        }
    }
}
impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prefix operators.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum UnOp {
    /// `-`
    Neg,
    /// `+`
    Plus,
    /// `~`
    Not,
    /// `!`
    LogNot,
}
impl UnOp {
    /// Gets the operator matching the token text, if any.
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            "-" => Some(UnOp::Neg),
            "+" => Some(UnOp::Plus),
            "~" => Some(UnOp::Not),
            "!" => Some(UnOp::LogNot),
            _ => None,
        }
    }

    /// The operator as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Plus => "+",
            UnOp::Not => "~",
            UnOp::LogNot => "!",
        }
    }
}
impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Postfix operators.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum PostOp {
    /// `++`
    Inc,
    /// `--`
    Dec,
}
impl PostOp {
    /// Gets the operator matching the token text, if any.
    pub fn from_token(text: &str) -> Option<Self> {
        match text {
            "++" => Some(PostOp::Inc),
            "--" => Some(PostOp::Dec),
            _ => None,
        }
    }

    /// The operator as written in source.
    pub fn as_str(self) -> &'static str {
        match self {
            PostOp::Inc => "++",
            PostOp::Dec => "--",
        }
    }
}
impl std::fmt::Display for PostOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.kind {
            ExprKind::Literal(lit) => lit.fmt(f),
            ExprKind::Ident(name) => f.write_str(name),
            ExprKind::Infix { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            ExprKind::Prefix { op, operand } => write!(f, "{op}{operand}"),
            ExprKind::Postfix { op, operand } => write!(f, "{operand}{op}"),
            ExprKind::Group(inner) => write!(f, "({inner})"),
            ExprKind::Assign { target, value } => write!(f, "{target} = {value}"),
        }
    }
}
impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Literal::Int { base: IntBase::Bin, digits } => write!(f, "0b{digits}"),
            Literal::Int { base: IntBase::Oct, digits } => write!(f, "0o{digits}"),
            Literal::Int { base: IntBase::Dec, digits } => f.write_str(digits),
            Literal::Int { base: IntBase::Hex, digits } => write!(f, "0x{digits}"),
            Literal::Float { text, .. } => f.write_str(text),
            Literal::Char(c) => write!(f, "{c:?}"),
            Literal::Str(segments) => {
                f.write_char('"')?;
                for s in segments {
                    match s {
                        StrSegment::Text(t) => write!(f, "{}", t.escape_debug())?,
                        StrSegment::Interp(e) => write!(f, "${{{e}}}")?,
                    }
                }
                f.write_char('"')
            },
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// A label declaration (`name:`).
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Label {
    /// The label's name.
    pub name: String,
    /// The byte span of the declaration.
    pub span: Range<usize>,
}

/// An operand of an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum Operand {
    /// A plain expression operand.
    Expr(Expr),
    /// An indexed operand (`disp(base)`).
    Indexed {
        /// The displacement.
        disp: Expr,
        /// The base expression (typically a register).
        base: Expr,
        /// The byte span of the operand (including the parentheses).
        span: Range<usize>,
    },
}
impl Operand {
    /// The byte span of the operand.
    pub fn span(&self) -> Range<usize> {
        match self {
            Operand::Expr(e) => e.span.clone(),
            Operand::Indexed { span, .. } => span.clone(),
        }
    }
}

/// An instruction: a mnemonic followed by operands.
///
/// The assembler core never interprets instructions itself.
/// It hands them to an [`InstructionEncoder`].
///
/// [`InstructionEncoder`]: crate::asm::encoder::InstructionEncoder
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Instruction {
    /// The mnemonic, as written in source.
    pub mnemonic: String,
    /// The operands.
    pub operands: Vec<Operand>,
    /// The byte span of the instruction.
    pub span: Range<usize>,
}

/// A directive (`.name args...`).
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Directive {
    /// Which directive this is.
    pub kind: DirectiveKind,
    /// The directive's name, as written in source (including the leading `.`).
    pub name: String,
    /// The arguments.
    pub args: Vec<Expr>,
    /// The byte span of the directive.
    pub span: Range<usize>,
}

/// A statement: everything on one line of source.
///
/// Any combination of parts may be absent.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct Stmt {
    /// A label declared on this line.
    pub label: Option<Label>,
    /// An instruction on this line.
    pub instr: Option<Instruction>,
    /// A directive on this line.
    pub directive: Option<Directive>,
    /// A bare expression on this line.
    pub expr: Option<Expr>,
    /// The byte span of the line (excluding trailing comments and the line break).
    pub span: Range<usize>,
}
impl Stmt {
    /// Whether this statement has no content.
    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.instr.is_none() && self.directive.is_none() && self.expr.is_none()
    }

    /// If this statement is an `.include`, gets the included path.
    pub fn include_path(&self) -> Option<(String, Range<usize>)> {
        let d = self.directive.as_ref()?;
        if d.kind != DirectiveKind::Include { return None; }
        let [arg] = d.args.as_slice() else { return None };
        Some((arg.as_plain_str()?, d.span.clone()))
    }
}
