//! The string domain.

use num_bigint::BigInt;

use super::{Domain, EvalErrKind};
use crate::ast::{BinOp, Literal, StrSegment, UnOp};

/// Strings.
///
/// Non-string literals are converted to their textual form
/// (integers are written in decimal). `+` concatenates, and
/// comparisons are lexicographic, producing `"1"` or `"0"`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct StringDomain;

fn truth(b: bool) -> String {
    String::from(if b { "1" } else { "0" })
}

impl Domain for StringDomain {
    type Value = String;

    fn type_name(&self) -> &'static str {
        "string"
    }

    fn parse_literal(&self, lit: &Literal) -> Result<String, EvalErrKind> {
        match lit {
            Literal::Str(segments) => segments.iter()
                .map(|seg| match seg {
                    StrSegment::Text(t) => Ok(t.as_str()),
                    StrSegment::Interp(_) => Err(EvalErrKind::InterpolationUnsupported),
                })
                .collect(),
            Literal::Int { base, digits } => BigInt::parse_bytes(digits.as_bytes(), base.radix())
                .map(|n| n.to_string())
                .ok_or_else(|| EvalErrKind::InvalidLiteral(lit.to_string())),
            Literal::Float { text, .. } => Ok(text.clone()),
            Literal::Char(c) => Ok(c.to_string()),
            Literal::Bool(b) => Ok(b.to_string()),
        }
    }

    fn evaluate_infix(&self, op: BinOp, lhs: String, rhs: String) -> Result<String, EvalErrKind> {
        let value = match op {
            BinOp::Add => lhs + &rhs,
            BinOp::Eq => truth(lhs == rhs),
            BinOp::Ne => truth(lhs != rhs),
            BinOp::Lt => truth(lhs < rhs),
            BinOp::Le => truth(lhs <= rhs),
            BinOp::Gt => truth(lhs > rhs),
            BinOp::Ge => truth(lhs >= rhs),
            _ => return Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() }),
        };
        Ok(value)
    }

    fn evaluate_prefix(&self, op: UnOp, _operand: String) -> Result<String, EvalErrKind> {
        Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() })
    }
}

#[cfg(test)]
mod tests {
    use super::StringDomain;
    use crate::eval::tests::expr;
    use crate::eval::{EvalErrKind, Evaluator, Lookup};

    fn eval(src: &str) -> Result<String, EvalErrKind> {
        Evaluator::new(StringDomain, |name: &str, _: &()| match name {
            "greeting" => Lookup::Found(String::from("hello")),
            _ => Lookup::Missing,
        })
        .evaluate(&expr(src), &mut ())
        .map_err(|e| e.kind)
    }

    #[test]
    fn test_concat() {
        assert_eq!(eval(r#"greeting + ", " + "world""#).as_deref(), Ok("hello, world"));
        assert_eq!(eval(r#""a\tb" + 'c'"#).as_deref(), Ok("a\tbc"));
        assert_eq!(eval(r#""n=" + 0x10 + " " + 1.5 + " " + true"#).as_deref(), Ok("n=16 1.5 true"));
    }

    #[test]
    fn test_compare() {
        assert_eq!(eval(r#""abc" < "abd""#).as_deref(), Ok("1"));
        assert_eq!(eval(r#"greeting == "hello""#).as_deref(), Ok("1"));
        assert_eq!(eval(r#""b" >= "c""#).as_deref(), Ok("0"));
    }

    #[test]
    fn test_unsupported() {
        assert_eq!(eval(r#""x${greeting}""#), Err(EvalErrKind::InterpolationUnsupported));
        assert_eq!(eval(r#""a" - "b""#), Err(EvalErrKind::UnsupportedOperator { op: "-", ty: "string" }));
        assert_eq!(eval(r#"-"a""#), Err(EvalErrKind::UnsupportedOperator { op: "-", ty: "string" }));
    }
}
