//! The floating point domains.

use std::marker::PhantomData;

use num_traits::Float;

use super::{Domain, EvalErrKind};
use crate::ast::{BinOp, Literal, UnOp};

/// Floating point values of type `F` (`f32` or `f64`).
///
/// Integer literals are accepted and converted. Comparisons produce `1.0` or `0.0`,
/// and equality holds if two values are within a relative epsilon of each other.
#[derive(Debug, Clone, Copy, Default)]
pub struct FloatDomain<F> {
    _float: PhantomData<F>,
}
impl<F: Float> FloatDomain<F> {
    /// Creates a new float domain.
    pub fn new() -> Self {
        Self { _float: PhantomData }
    }

    /// Whether two values are equal within a relative epsilon.
    pub fn approx_eq(a: F, b: F) -> bool {
        if a == b {
            return true;
        }
        let scale = F::one().max(a.abs()).max(b.abs());
        (a - b).abs() <= F::epsilon() * scale
    }
}

/// Names a float type for error messages.
pub trait FloatName {
    /// The name.
    const NAME: &'static str;
}
impl FloatName for f32 {
    const NAME: &'static str = "f32";
}
impl FloatName for f64 {
    const NAME: &'static str = "f64";
}

fn truth<F: Float>(b: bool) -> F {
    if b { F::one() } else { F::zero() }
}

impl<F: Float + FloatName + std::str::FromStr> Domain for FloatDomain<F> {
    type Value = F;

    fn type_name(&self) -> &'static str {
        F::NAME
    }

    fn parse_literal(&self, lit: &Literal) -> Result<F, EvalErrKind> {
        let invalid = || EvalErrKind::InvalidLiteral(lit.to_string());
        match lit {
            Literal::Float { text, .. } => text.parse().map_err(|_| invalid()),
            Literal::Int { base, digits } => {
                let radix = F::from(base.radix()).ok_or_else(invalid)?;
                digits.chars().try_fold(F::zero(), |acc, c| {
                    let d = c.to_digit(base.radix()).and_then(F::from).ok_or_else(invalid)?;
                    Ok(acc * radix + d)
                })
            },
            _ => Err(EvalErrKind::UnsupportedLiteral { ty: self.type_name(), found: lit.type_name() }),
        }
    }

    fn evaluate_infix(&self, op: BinOp, lhs: F, rhs: F) -> Result<F, EvalErrKind> {
        let value = match op {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div | BinOp::Rem if rhs.is_zero() => return Err(EvalErrKind::DivisionByZero),
            BinOp::Div => lhs / rhs,
            BinOp::Rem => lhs % rhs,
            BinOp::Eq => truth(Self::approx_eq(lhs, rhs)),
            BinOp::Ne => truth(!Self::approx_eq(lhs, rhs)),
            BinOp::Lt => truth(lhs < rhs && !Self::approx_eq(lhs, rhs)),
            BinOp::Le => truth(lhs < rhs || Self::approx_eq(lhs, rhs)),
            BinOp::Gt => truth(lhs > rhs && !Self::approx_eq(lhs, rhs)),
            BinOp::Ge => truth(lhs > rhs || Self::approx_eq(lhs, rhs)),
            _ => return Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() }),
        };
        Ok(value)
    }

    fn evaluate_prefix(&self, op: UnOp, operand: F) -> Result<F, EvalErrKind> {
        match op {
            UnOp::Neg => Ok(-operand),
            UnOp::Plus => Ok(operand),
            _ => Err(EvalErrKind::UnsupportedOperator { op: op.as_str(), ty: self.type_name() }),
        }
    }
}
