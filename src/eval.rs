//! Evaluating expressions.
//!
//! The [`Evaluator`] owns the recursion over an [`Expr`] tree, while a [`Domain`] defines
//! what values look like and what each literal and operator means for them.
//! Four domains are provided:
//! - [`IntDomain`]: arbitrary-precision integers with a target bit width,
//! - [`BoolDomain`]: strictly `true`/`false`,
//! - [`FloatDomain`]: `f32` or `f64`,
//! - [`StringDomain`]: strings.
//!
//! Identifiers are resolved through a resolver closure given to the evaluator, and
//! assignments (`name = expr`) are persisted through an optional assignment hook.
//! Both receive a caller-defined context `C`.
//!
//! # Example
//! ```
//! use sectasm::eval::{Evaluator, IntDomain, Lookup};
//! use sectasm::parse::{parse_source, lex::LexRules};
//! use num_bigint::BigInt;
//! use std::collections::HashMap;
//!
//! let file = parse_source("x = y * 2 + 1", &LexRules::default());
//! let expr = file.stmts[0].expr.as_ref().unwrap();
//!
//! let mut vars = HashMap::from([("y".to_string(), BigInt::from(20))]);
//! let mut eval = Evaluator::new(IntDomain::new(64), |name: &str, vars: &HashMap<String, BigInt>| {
//!     vars.get(name).cloned().map_or(Lookup::Missing, Lookup::Found)
//! })
//! .with_assign_hook(|target, value: &BigInt, vars: &mut HashMap<String, BigInt>| {
//!     vars.insert(target.as_ident().unwrap_or_default().to_string(), value.clone());
//!     Ok(())
//! });
//!
//! assert_eq!(eval.evaluate(expr, &mut vars), Ok(BigInt::from(41)));
//! assert_eq!(vars["x"], BigInt::from(41));
//! ```

pub mod int;
pub mod boolean;
pub mod float;
pub mod string;

use std::borrow::Cow;
use std::ops::Range;

use crate::ast::{BinOp, Expr, ExprKind, Literal, PostOp, UnOp};
use crate::err::ErrSpan;

pub use boolean::BoolDomain;
pub use float::FloatDomain;
pub use int::IntDomain;
pub use string::StringDomain;

/// The result of resolving an identifier.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Lookup<T> {
    /// The identifier has a value.
    Found(T),
    /// The identifier exists, but its value is not known yet (e.g., a label during pass 1).
    Unresolved,
    /// The identifier does not exist.
    Missing,
}

/// The semantics of one result type.
pub trait Domain {
    /// The type of value expressions evaluate to.
    type Value: Clone;

    /// A readable name of the value type (used in errors).
    fn type_name(&self) -> &'static str;

    /// Converts a literal into a value.
    fn parse_literal(&self, lit: &Literal) -> Result<Self::Value, EvalErrKind>;

    /// Applies a binary operator.
    fn evaluate_infix(&self, op: BinOp, lhs: Self::Value, rhs: Self::Value) -> Result<Self::Value, EvalErrKind>;

    /// Applies a prefix operator.
    fn evaluate_prefix(&self, op: UnOp, operand: Self::Value) -> Result<Self::Value, EvalErrKind>;

    /// Applies a postfix operator.
    ///
    /// By default, no postfix operator is supported.
    fn evaluate_postfix(&self, op: PostOp, operand: Self::Value) -> Result<Self::Value, EvalErrKind> {
        let _ = operand;
        Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() })
    }
}

/// Kinds of errors that can occur while evaluating an expression.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum EvalErrKind {
    /// The domain does not accept this kind of literal.
    UnsupportedLiteral {
        /// The domain's type.
        ty: &'static str,
        /// The literal's type.
        found: &'static str,
    },
    /// The domain does not support this operator.
    UnsupportedOperator {
        /// The operator.
        op: &'static str,
        /// The domain's type.
        ty: &'static str,
    },
    /// An identifier does not exist.
    UndefinedIdentifier(String),
    /// An identifier exists, but does not have a value yet.
    Unresolved(String),
    /// Division or remainder by zero.
    DivisionByZero,
    /// A shift amount is negative or not less than the target width.
    ShiftOutOfRange {
        /// The shift amount.
        amount: String,
        /// The target width in bits.
        width: u32,
    },
    /// A literal could not be converted.
    InvalidLiteral(String),
    /// A string literal has interpolation blocks.
    InterpolationUnsupported,
    /// The target of an assignment is not a name.
    NotAssignable,
    /// An assignment was evaluated with no hook to persist it.
    NoAssignHook,
    /// The assignment hook rejected an assignment.
    Rejected(String),
}
impl std::fmt::Display for EvalErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedLiteral { ty, found } => write!(f, "unsupported literal type: {found} literal in {ty} expression"),
            Self::UnsupportedOperator { op, ty } => write!(f, "operator {op} is not supported for {ty} values"),
            Self::UndefinedIdentifier(name) => write!(f, "undefined identifier {name}"),
            Self::Unresolved(name) => write!(f, "value of {name} is not known yet"),
            Self::DivisionByZero => f.write_str("division by zero"),
            Self::ShiftOutOfRange { amount, width } => write!(f, "shift amount {amount} exceeds the range of a {width}-bit value"),
            Self::InvalidLiteral(lit) => write!(f, "invalid literal {lit}"),
            Self::InterpolationUnsupported => f.write_str("interpolation is not supported"),
            Self::NotAssignable => f.write_str("cannot assign to this expression"),
            Self::NoAssignHook => f.write_str("assignment is not allowed here"),
            Self::Rejected(msg) => f.write_str(msg),
        }
    }
}

/// Error from evaluating an expression.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct EvalErr {
    /// The kind of error.
    pub kind: EvalErrKind,
    /// The span of the node that failed.
    pub span: Range<usize>,
}
impl EvalErr {
    /// Creates a new [`EvalErr`].
    pub fn new(kind: EvalErrKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Whether evaluation failed only because some value is not known yet.
    pub fn is_unresolved(&self) -> bool {
        matches!(self.kind, EvalErrKind::Unresolved(_))
    }
}
impl std::fmt::Display for EvalErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for EvalErr {}
impl crate::err::Error for EvalErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(ErrSpan::from(self.span.clone()))
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            EvalErrKind::UnsupportedLiteral { ty, .. } => Some(format!("use a literal which is valid for {ty} values").into()),
            EvalErrKind::UndefinedIdentifier(_) => Some("define this name with a label, .set, or .equ".into()),
            EvalErrKind::ShiftOutOfRange { width, .. } => Some(format!("shift amounts must be between 0 and {}", width.saturating_sub(1)).into()),
            EvalErrKind::InterpolationUnsupported => Some("remove the ${...} block from this string".into()),
            _ => None,
        }
    }
}

type Resolver<'r, T, C> = Box<dyn Fn(&str, &C) -> Lookup<T> + 'r>;
type AssignHook<'r, T, C> = Box<dyn FnMut(&Expr, &T, &mut C) -> Result<(), EvalErrKind> + 'r>;

/// Evaluates expressions in a given [`Domain`].
pub struct Evaluator<'r, D: Domain, C> {
    domain: D,
    resolver: Resolver<'r, D::Value, C>,
    hook: Option<AssignHook<'r, D::Value, C>>,
}
impl<'r, D: Domain, C> Evaluator<'r, D, C> {
    /// Creates an evaluator with the given identifier resolver.
    pub fn new(domain: D, resolver: impl Fn(&str, &C) -> Lookup<D::Value> + 'r) -> Self {
        Self { domain, resolver: Box::new(resolver), hook: None }
    }

    /// Sets the hook which persists assignments.
    pub fn with_assign_hook(mut self, hook: impl FnMut(&Expr, &D::Value, &mut C) -> Result<(), EvalErrKind> + 'r) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    /// The domain of this evaluator.
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Evaluates an expression.
    ///
    /// Evaluating an assignment evaluates its value, passes it to the assignment hook,
    /// and evaluates to that value.
    pub fn evaluate(&mut self, expr: &Expr, ctx: &mut C) -> Result<D::Value, EvalErr> {
        let at = |kind: EvalErrKind| EvalErr::new(kind, expr.span.clone());

        match &expr.kind {
            ExprKind::Literal(lit) => self.domain.parse_literal(lit).map_err(at),
            ExprKind::Ident(name) => match (self.resolver)(name, ctx) {
                Lookup::Found(v) => Ok(v),
                Lookup::Unresolved => Err(at(EvalErrKind::Unresolved(name.clone()))),
                Lookup::Missing => Err(at(EvalErrKind::UndefinedIdentifier(name.clone()))),
            },
            ExprKind::Infix { op, lhs, rhs } => {
                let l = self.evaluate(lhs, ctx)?;
                let r = self.evaluate(rhs, ctx)?;
                self.domain.evaluate_infix(*op, l, r).map_err(at)
            },
            ExprKind::Prefix { op, operand } => {
                let v = self.evaluate(operand, ctx)?;
                self.domain.evaluate_prefix(*op, v).map_err(at)
            },
            ExprKind::Postfix { op, operand } => {
                let v = self.evaluate(operand, ctx)?;
                self.domain.evaluate_postfix(*op, v).map_err(at)
            },
            ExprKind::Group(inner) => self.evaluate(inner, ctx),
            ExprKind::Assign { target, value } => {
                let v = self.evaluate(value, ctx)?;
                self.assign(target, &v, ctx)?;
                Ok(v)
            },
        }
    }

    /// Assigns a value to a target through the assignment hook.
    ///
    /// The target must be a name (possibly parenthesized).
    pub fn assign(&mut self, target: &Expr, value: &D::Value, ctx: &mut C) -> Result<(), EvalErr> {
        let mut t = target;
        while let ExprKind::Group(inner) = &t.kind {
            t = inner;
        }
        if t.as_ident().is_none() {
            return Err(EvalErr::new(EvalErrKind::NotAssignable, target.span.clone()));
        }

        let hook = self.hook.as_mut()
            .ok_or_else(|| EvalErr::new(EvalErrKind::NoAssignHook, target.span.clone()))?;
        hook(t, value, ctx).map_err(|kind| EvalErr::new(kind, target.span.clone()))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;

    use num_bigint::BigInt;

    use super::{BoolDomain, EvalErrKind, Evaluator, IntDomain, Lookup};
    use crate::ast::Expr;
    use crate::parse::lex::LexRules;
    use crate::parse::parse_source;

    /// Parses `src` as the value of an assignment (`_ = src`).
    pub(crate) fn expr(src: &str) -> Expr {
        let file = parse_source(&format!("_ = {src}"), &LexRules::default());
        assert!(!file.has_errors(), "{:?}", file.diagnostics);
        let stmt = file.stmts.into_iter().next().unwrap();
        match stmt.expr.unwrap().kind {
            crate::ast::ExprKind::Assign { value, .. } => *value,
            k => panic!("expected assignment, found {k:?}"),
        }
    }

    type Vars = HashMap<String, Option<BigInt>>;
    fn int_eval<'r>() -> Evaluator<'r, IntDomain, Vars> {
        Evaluator::new(IntDomain::new(32), |name: &str, vars: &Vars| match vars.get(name) {
            Some(Some(v)) => Lookup::Found(v.clone()),
            Some(None) => Lookup::Unresolved,
            None => Lookup::Missing,
        })
    }

    #[test]
    fn test_identifiers() {
        let mut vars = Vars::from([("a".to_string(), Some(BigInt::from(3))), ("fwd".to_string(), None)]);
        let mut eval = int_eval();

        assert_eq!(eval.evaluate(&expr("a * (a + 1)"), &mut vars), Ok(BigInt::from(12)));

        let err = eval.evaluate(&expr("a + fwd"), &mut vars).unwrap_err();
        assert!(err.is_unresolved());
        assert_eq!(err.span, 8..11);

        let err = eval.evaluate(&expr("nope"), &mut vars).unwrap_err();
        assert_eq!(err.kind, EvalErrKind::UndefinedIdentifier("nope".into()));
    }

    #[test]
    fn test_assignment() {
        let mut vars = Vars::new();
        let file = parse_source("x = 4 << 2", &LexRules::default());
        let e = file.stmts[0].expr.as_ref().unwrap();

        // No hook
        let err = int_eval().evaluate(e, &mut vars).unwrap_err();
        assert_eq!(err.kind, EvalErrKind::NoAssignHook);
        assert_eq!(err.span, 0..1);

        let mut eval = int_eval().with_assign_hook(|target, value, vars: &mut Vars| {
            vars.insert(target.as_ident().unwrap().to_string(), Some(value.clone()));
            Ok(())
        });
        assert_eq!(eval.evaluate(e, &mut vars), Ok(BigInt::from(16)));
        assert_eq!(vars["x"], Some(BigInt::from(16)));

        // Not a name
        let file = parse_source("1 = 2", &LexRules::default());
        let e = file.stmts[0].expr.as_ref().unwrap();
        assert_eq!(eval.evaluate(e, &mut vars).unwrap_err().kind, EvalErrKind::NotAssignable);

        // Rejected by the hook
        let mut eval = int_eval().with_assign_hook(|_, _, _| Err(EvalErrKind::Rejected("read only".into())));
        let file = parse_source("y = 1", &LexRules::default());
        let err = eval.evaluate(file.stmts[0].expr.as_ref().unwrap(), &mut vars).unwrap_err();
        assert_eq!(err.to_string(), "read only");
    }

    #[test]
    fn test_postfix_unsupported() {
        let mut vars = Vars::from([("a".to_string(), Some(BigInt::from(3)))]);
        let err = int_eval().evaluate(&expr("a++"), &mut vars).unwrap_err();
        assert_eq!(err.kind, EvalErrKind::UnsupportedOperator { op: "++", ty: "integer" });

        let mut eval = Evaluator::new(BoolDomain, |_: &str, _: &()| Lookup::Missing);
        assert!(eval.evaluate(&expr("true--"), &mut ()).is_err());
    }
}
