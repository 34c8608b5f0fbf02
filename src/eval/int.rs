//! The integer domain.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

use super::{Domain, EvalErrKind};
use crate::ast::{BinOp, Literal, UnOp};

/// Arbitrary-precision integers, checked against a target bit width.
///
/// Values are never truncated while evaluating. The target width only limits shift amounts.
/// Comparison and logical operators produce `0` or `1`.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct IntDomain {
    /// The bit width of the target.
    pub width: u32,
}
impl IntDomain {
    /// Creates an integer domain for a target of the given bit width.
    pub fn new(width: u32) -> Self {
        Self { width }
    }
}
impl Default for IntDomain {
    fn default() -> Self {
        Self::new(64)
    }
}

fn truth(b: bool) -> BigInt {
    BigInt::from(u8::from(b))
}

impl Domain for IntDomain {
    type Value = BigInt;

    fn type_name(&self) -> &'static str {
        "integer"
    }

    fn parse_literal(&self, lit: &Literal) -> Result<BigInt, EvalErrKind> {
        match lit {
            Literal::Int { base, digits } => BigInt::parse_bytes(digits.as_bytes(), base.radix())
                .ok_or_else(|| EvalErrKind::InvalidLiteral(lit.to_string())),
            Literal::Char(c) => Ok(BigInt::from(u32::from(*c))),
            _ => Err(EvalErrKind::UnsupportedLiteral { ty: self.type_name(), found: lit.type_name() }),
        }
    }

    fn evaluate_infix(&self, op: BinOp, lhs: BigInt, rhs: BigInt) -> Result<BigInt, EvalErrKind> {
        let value = match op {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div | BinOp::Rem if rhs.is_zero() => return Err(EvalErrKind::DivisionByZero),
            BinOp::Div => lhs / rhs,
            BinOp::Rem => lhs % rhs,
            BinOp::Shl | BinOp::Shr => {
                let amount = rhs.to_u32()
                    .filter(|&n| n < self.width)
                    .ok_or_else(|| EvalErrKind::ShiftOutOfRange { amount: rhs.to_string(), width: self.width })?;
                match op {
                    BinOp::Shl => lhs << amount,
                    _ => lhs >> amount,
                }
            },
            BinOp::And => lhs & rhs,
            BinOp::Or  => lhs | rhs,
            BinOp::Xor => lhs ^ rhs,
            BinOp::LogAnd => truth(!lhs.is_zero() && !rhs.is_zero()),
            BinOp::LogOr  => truth(!lhs.is_zero() || !rhs.is_zero()),
            BinOp::Eq => truth(lhs == rhs),
            BinOp::Ne => truth(lhs != rhs),
            BinOp::Lt => truth(lhs < rhs),
            BinOp::Le => truth(lhs <= rhs),
            BinOp::Gt => truth(lhs > rhs),
            BinOp::Ge => truth(lhs >= rhs),
        };
        Ok(value)
    }

    fn evaluate_prefix(&self, op: UnOp, operand: BigInt) -> Result<BigInt, EvalErrKind> {
        let value = match op {
            UnOp::Neg => -operand,
            UnOp::Plus => operand,
            UnOp::Not => !operand,
            UnOp::LogNot => truth(operand.is_zero()),
        };
        Ok(value)
    }
}

/// Whether a value can be stored in `len` bytes, as either a signed or an unsigned integer.
pub fn fits_in_bytes(value: &BigInt, len: usize) -> bool {
    let bits = len * 8;
    match value.is_negative() {
        // -2^(bits-1) <= value
        true => (-value - 1u8).bits() < bits as u64,
        // value < 2^bits
        false => value.bits() <= bits as u64,
    }
}

/// Converts a value into exactly `len` little-endian two's complement bytes.
///
/// The value should be checked with [`fits_in_bytes`] first. Otherwise, it is truncated.
pub fn to_le_bytes(value: &BigInt, len: usize) -> Vec<u8> {
    let fill = if value.is_negative() { 0xFF } else { 0x00 };
    let mut bytes = value.to_signed_bytes_le();
    bytes.resize(len, fill);
    bytes
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::{fits_in_bytes, to_le_bytes, IntDomain};
    use crate::eval::tests::expr;
    use crate::eval::{EvalErrKind, Evaluator, Lookup};

    fn eval(width: u32, src: &str) -> Result<BigInt, EvalErrKind> {
        Evaluator::new(IntDomain::new(width), |_: &str, _: &()| Lookup::Missing)
            .evaluate(&expr(src), &mut ())
            .map_err(|e| e.kind)
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval(64, "1 + 2 * 3"), Ok(BigInt::from(7)));
        assert_eq!(eval(64, "(1 + 2) * 3"), Ok(BigInt::from(9)));
        assert_eq!(eval(64, "-7 / 2"), Ok(BigInt::from(-3)));
        assert_eq!(eval(64, "-7 % 2"), Ok(BigInt::from(-1)));
        assert_eq!(eval(64, "0x10 | 0b1 ^ 0o3"), Ok(BigInt::from(0x10 | (1 ^ 3))));
        assert_eq!(eval(64, "~0"), Ok(BigInt::from(-1)));
        assert_eq!(eval(64, "'A' + 1"), Ok(BigInt::from(66)));
        assert_eq!(eval(64, "0xFFFF_FFFF_FFFF_FFFF_FF + 1"), Ok(BigInt::from(1u128 << 72)));
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval(64, "3 < 4"), Ok(BigInt::from(1)));
        assert_eq!(eval(64, "3 >= 4"), Ok(BigInt::from(0)));
        assert_eq!(eval(64, "2 && 0"), Ok(BigInt::from(0)));
        assert_eq!(eval(64, "2 || 0"), Ok(BigInt::from(1)));
        assert_eq!(eval(64, "!5"), Ok(BigInt::from(0)));
        assert_eq!(eval(64, "1 == 1 && 2 != 3"), Ok(BigInt::from(1)));
    }

    #[test]
    fn test_shifts() {
        assert_eq!(eval(32, "1 << 31"), Ok(BigInt::from(1u64 << 31)));
        assert_eq!(eval(32, "-16 >> 2"), Ok(BigInt::from(-4)));
        assert_eq!(eval(32, "1 << 33"), Err(EvalErrKind::ShiftOutOfRange { amount: "33".into(), width: 32 }));
        assert_eq!(eval(32, "1 << 32"), Err(EvalErrKind::ShiftOutOfRange { amount: "32".into(), width: 32 }));
        assert_eq!(eval(32, "1 >> -1"), Err(EvalErrKind::ShiftOutOfRange { amount: "-1".into(), width: 32 }));
        assert_eq!(eval(64, "1 << 33"), Ok(BigInt::from(1u64 << 33)));
    }

    #[test]
    fn test_failures() {
        assert_eq!(eval(64, "1 / 0"), Err(EvalErrKind::DivisionByZero));
        assert_eq!(eval(64, "1 % (2 - 2)"), Err(EvalErrKind::DivisionByZero));
        assert_eq!(eval(64, "true"), Err(EvalErrKind::UnsupportedLiteral { ty: "integer", found: "boolean" }));
        assert_eq!(eval(64, "1.5"), Err(EvalErrKind::UnsupportedLiteral { ty: "integer", found: "float" }));
        assert_eq!(eval(64, "\"s\""), Err(EvalErrKind::UnsupportedLiteral { ty: "integer", found: "string" }));
    }

    #[test]
    fn test_byte_conversion() {
        assert!(fits_in_bytes(&BigInt::from(255), 1));
        assert!(fits_in_bytes(&BigInt::from(-128), 1));
        assert!(!fits_in_bytes(&BigInt::from(256), 1));
        assert!(!fits_in_bytes(&BigInt::from(-129), 1));
        assert!(fits_in_bytes(&BigInt::from(-1), 8));

        assert_eq!(to_le_bytes(&BigInt::from(0x1234), 4), [0x34, 0x12, 0, 0]);
        assert_eq!(to_le_bytes(&BigInt::from(-2), 2), [0xFE, 0xFF]);
        assert_eq!(to_le_bytes(&BigInt::from(255), 1), [0xFF]);
    }
}
