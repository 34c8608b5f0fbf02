//! The boolean domain.

use super::{Domain, EvalErrKind};
use crate::ast::{BinOp, Literal, UnOp};

/// Strict booleans.
///
/// Only `true` and `false` are accepted as literals. There is no numeric coercion.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct BoolDomain;

impl Domain for BoolDomain {
    type Value = bool;

    fn type_name(&self) -> &'static str {
        "boolean"
    }

    fn parse_literal(&self, lit: &Literal) -> Result<bool, EvalErrKind> {
        match lit {
            Literal::Bool(b) => Ok(*b),
            _ => Err(EvalErrKind::UnsupportedLiteral { ty: self.type_name(), found: lit.type_name() }),
        }
    }

    fn evaluate_infix(&self, op: BinOp, lhs: bool, rhs: bool) -> Result<bool, EvalErrKind> {
        match op {
            BinOp::LogAnd => Ok(lhs && rhs),
            BinOp::LogOr => Ok(lhs || rhs),
            BinOp::Eq => Ok(lhs == rhs),
            BinOp::Ne => Ok(lhs != rhs),
            _ => Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() }),
        }
    }

    fn evaluate_prefix(&self, op: UnOp, operand: bool) -> Result<bool, EvalErrKind> {
        match op {
            UnOp::LogNot => Ok(!operand),
            _ => Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BoolDomain;
    use crate::eval::tests::expr;
    use crate::eval::{EvalErrKind, Evaluator, Lookup};

    fn eval(src: &str) -> Result<bool, EvalErrKind> {
        Evaluator::new(BoolDomain, |name: &str, _: &()| match name {
            "on" => Lookup::Found(true),
            _ => Lookup::Missing,
        })
        .evaluate(&expr(src), &mut ())
        .map_err(|e| e.kind)
    }

    #[test]
    fn test_logic() {
        assert_eq!(eval("true && !false"), Ok(true));
        assert_eq!(eval("false || (on && false)"), Ok(false));
        assert_eq!(eval("on == true"), Ok(true));
        assert_eq!(eval("on != on"), Ok(false));
    }

    #[test]
    fn test_strict() {
        let err = eval("1").unwrap_err();
        assert_eq!(err, EvalErrKind::UnsupportedLiteral { ty: "boolean", found: "integer" });
        assert!(err.to_string().starts_with("unsupported literal type"));

        assert_eq!(eval("true + true"), Err(EvalErrKind::UnsupportedOperator { op: "+", ty: "boolean" }));
        assert_eq!(eval("-true"), Err(EvalErrKind::UnsupportedOperator { op: "-", ty: "boolean" }));
        assert!(eval("'c'").is_err());
    }
}
