//! The interface to target-specific instruction encoders.

use std::borrow::Cow;
use std::ops::Range;

use super::context::EvalContext;
use crate::ast::Instruction;
use crate::err::ErrSpan;
use crate::eval::{EvalErr, EvalErrKind};

/// Encodes instructions for a target.
///
/// Each instruction is encoded in two steps:
/// - In pass 1, [`InstructionEncoder::estimate_size`] reports how many bytes the
///   instruction occupies. Labels are not known yet, so this has to be decided
///   without them (e.g., by assuming the longest form).
/// - In pass 2, [`InstructionEncoder::encode`] produces the bytes. This must produce
///   exactly as many bytes as were estimated.
///
/// Operands can be evaluated with [`EvalContext::eval_int`].
pub trait InstructionEncoder {
    /// Computes the size of an instruction in bytes.
    fn estimate_size(&self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<u64, EncodeErr>;

    /// Encodes an instruction.
    fn encode(&self, instr: &Instruction, ctx: &mut EvalContext<'_>) -> Result<Vec<u8>, EncodeErr>;
}

/// Kinds of errors that can occur while encoding an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum EncodeErrKind {
    /// The mnemonic is not an instruction of this target.
    UnknownMnemonic(String),
    /// The instruction has the wrong number of operands.
    OperandCount {
        /// The number of operands expected.
        expected: usize,
        /// The number of operands found.
        found: usize,
    },
    /// An operand has the wrong form.
    InvalidOperand(String),
    /// A value does not fit in its field.
    OutOfRange {
        /// The value.
        value: String,
        /// The field width in bits.
        bits: u32,
    },
    /// An operand could not be evaluated.
    Eval(EvalErrKind),
}
impl std::fmt::Display for EncodeErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownMnemonic(m) => write!(f, "unknown instruction {m}"),
            Self::OperandCount { expected, found } => write!(f, "expected {expected} operand(s), found {found}"),
            Self::InvalidOperand(msg) => write!(f, "invalid operand: {msg}"),
            Self::OutOfRange { value, bits } => write!(f, "value {value} does not fit in {bits} bits"),
            Self::Eval(e) => e.fmt(f),
        }
    }
}

/// Error from encoding an instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct EncodeErr {
    /// The kind of error.
    pub kind: EncodeErrKind,
    /// The span of the instruction or operand which failed.
    pub span: Range<usize>,
}
impl EncodeErr {
    /// Creates a new [`EncodeErr`].
    pub fn new(kind: EncodeErrKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }
}
impl From<EvalErr> for EncodeErr {
    fn from(value: EvalErr) -> Self {
        Self::new(EncodeErrKind::Eval(value.kind), value.span)
    }
}
impl std::fmt::Display for EncodeErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for EncodeErr {}
impl crate::err::Error for EncodeErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(ErrSpan::from(self.span.clone()))
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            EncodeErrKind::OutOfRange { bits, .. } => Some(format!("use a value which fits in a {bits}-bit field").into()),
            _ => None,
        }
    }
}
