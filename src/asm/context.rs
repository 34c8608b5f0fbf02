//! The evaluation context of the assembler.
//!
//! An [`EvalContext`] binds the generic evaluators of [`crate::eval`] to the
//! state of the assembler: which pass it is in, where the location counter (`.`) is,
//! and which symbols exist.

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Float, ToPrimitive, Zero};

use super::codegen::CodeGen;
use super::section::SectionId;
use super::symbol::SymbolValue;
use crate::ast::directive::AssignKind;
use crate::ast::Expr;
use crate::eval::float::FloatName;
use crate::eval::{BoolDomain, EvalErr, EvalErrKind, Evaluator, FloatDomain, IntDomain, Lookup, StringDomain};

/// Which pass the assembler is in.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Pass {
    /// Addresses are not known yet (preprocess and allocate).
    One,
    /// Addresses are known (generate).
    Two,
}

/// What assignments (`name = expr`) do while evaluating.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AssignPolicy {
    /// Assignments are an error.
    Forbid,
    /// Assignments define absolute symbols, like the given directive.
    Define(AssignKind),
}

/// The state expressions are evaluated in.
pub struct EvalContext<'a> {
    /// The current pass.
    pub pass: Pass,
    /// Whether this is a section-relative evaluation.
    ///
    /// In a pass 1 relative evaluation, `.` and labels of the current section
    /// evaluate to their offset in the section. This allows differences like `. - start`
    /// to be computed before addresses are known.
    pub relative: bool,
    /// The section of the location counter.
    pub section: SectionId,
    /// The offset of the location counter in its section.
    pub offset: u64,
    /// What assignments do.
    pub policy: AssignPolicy,
    /// The file of the expression being evaluated.
    pub file: Option<Arc<Path>>,
    /// The bit width of integer evaluation.
    pub width: u32,
    codegen: &'a mut CodeGen,
}
impl<'a> EvalContext<'a> {
    /// Creates a context at the current location of `codegen`.
    pub fn new(codegen: &'a mut CodeGen, pass: Pass, width: u32) -> Self {
        let (section, offset) = (codegen.current(), codegen.offset());
        Self {
            pass,
            relative: false,
            section,
            offset,
            policy: AssignPolicy::Forbid,
            file: None,
            width,
            codegen,
        }
    }

    /// Moves the location counter.
    pub fn at(mut self, section: SectionId, offset: u64) -> Self {
        self.section = section;
        self.offset = offset;
        self
    }

    /// Makes this a section-relative evaluation.
    pub fn relative(mut self) -> Self {
        self.relative = true;
        self
    }

    /// Sets what assignments do.
    pub fn with_policy(mut self, policy: AssignPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the file of the expressions being evaluated.
    pub fn in_file(mut self, file: &Arc<Path>) -> Self {
        self.file = Some(Arc::clone(file));
        self
    }

    /// The code generator.
    pub fn codegen(&self) -> &CodeGen {
        self.codegen
    }

    /// The value of the location counter (`.`).
    pub fn location(&self) -> Lookup<BigInt> {
        match (self.pass, self.relative) {
            (Pass::One, true) => Lookup::Found(BigInt::from(self.offset)),
            (Pass::One, false) => Lookup::Unresolved,
            (Pass::Two, _) => match &self.codegen.section(self.section).address {
                Some(addr) => Lookup::Found(addr + self.offset),
                None => Lookup::Unresolved,
            },
        }
    }

    /// Resolves a name to its integer value.
    ///
    /// In pass 1, names which do not exist yet are assumed to be defined later.
    /// A name defined in several sections refers to the one in the current section, if there is one.
    pub fn lookup(&self, name: &str) -> Lookup<BigInt> {
        if name == "." {
            return self.location();
        }

        let Some(sym) = self.codegen.symbols().resolve(name, self.section).filter(|s| s.defined) else {
            return match self.pass {
                Pass::One => Lookup::Unresolved,
                Pass::Two => Lookup::Missing,
            };
        };
        match (&sym.value, self.pass) {
            (SymbolValue::Abs(v), _) => Lookup::Found(v.clone()),
            (SymbolValue::Label(offset), Pass::One) if self.relative && sym.section == self.section => {
                Lookup::Found(BigInt::from(*offset))
            },
            (SymbolValue::Label(_), Pass::One) => Lookup::Unresolved,
            (SymbolValue::Label(_), Pass::Two) => self.codegen.symbol_value(sym).map_or(Lookup::Unresolved, Lookup::Found),
        }
    }

    fn define(&mut self, target: &Expr, value: BigInt) -> Result<(), EvalErrKind> {
        let AssignPolicy::Define(kind) = self.policy else {
            return Err(EvalErrKind::NoAssignHook);
        };
        match target.as_ident() {
            Some(".") => Err(EvalErrKind::Rejected("cannot assign to the location counter".into())),
            Some(name) => self.codegen.assign_symbol(name, value, kind).map_err(|e| EvalErrKind::Rejected(e.to_string())),
            None => Err(EvalErrKind::NotAssignable),
        }
    }

    /// Evaluates an integer expression.
    pub fn eval_int(&mut self, expr: &Expr) -> Result<BigInt, EvalErr> {
        Evaluator::new(IntDomain::new(self.width), |name: &str, ctx: &EvalContext<'a>| ctx.lookup(name))
            .with_assign_hook(|target, value: &BigInt, ctx: &mut EvalContext<'a>| ctx.define(target, value.clone()))
            .evaluate(expr, self)
    }

    /// Evaluates a boolean expression.
    ///
    /// Symbols are true if they are nonzero.
    pub fn eval_bool(&mut self, expr: &Expr) -> Result<bool, EvalErr> {
        Evaluator::new(BoolDomain, |name: &str, ctx: &EvalContext<'a>| match ctx.lookup(name) {
            Lookup::Found(v) => Lookup::Found(!v.is_zero()),
            Lookup::Unresolved => Lookup::Unresolved,
            Lookup::Missing => Lookup::Missing,
        })
        .evaluate(expr, self)
    }

    /// Evaluates a floating point expression.
    ///
    /// Symbols are converted to floats.
    pub fn eval_float<F: Float + FloatName + FromStr>(&mut self, expr: &Expr) -> Result<F, EvalErr> {
        Evaluator::new(FloatDomain::<F>::new(), |name: &str, ctx: &EvalContext<'a>| match ctx.lookup(name) {
            Lookup::Found(v) => v.to_f64().and_then(F::from).map_or(Lookup::Missing, Lookup::Found),
            Lookup::Unresolved => Lookup::Unresolved,
            Lookup::Missing => Lookup::Missing,
        })
        .evaluate(expr, self)
    }

    /// Evaluates a string expression.
    ///
    /// Symbols are converted to their decimal representation.
    pub fn eval_str(&mut self, expr: &Expr) -> Result<String, EvalErr> {
        Evaluator::new(StringDomain, |name: &str, ctx: &EvalContext<'a>| match ctx.lookup(name) {
            Lookup::Found(v) => Lookup::Found(v.to_string()),
            Lookup::Unresolved => Lookup::Unresolved,
            Lookup::Missing => Lookup::Missing,
        })
        .evaluate(expr, self)
    }

    /// Evaluates `value` and assigns it to `target`, like `.set target, value`.
    ///
    /// This is the same path assignment expressions (`target = value`) take.
    pub fn eval_assign(&mut self, target: &Expr, value: &Expr, kind: AssignKind) -> Result<BigInt, EvalErr> {
        let v = self.eval_int(value)?;
        let mut ev = Evaluator::new(IntDomain::new(self.width), |name: &str, ctx: &EvalContext<'a>| ctx.lookup(name))
            .with_assign_hook(move |target, value: &BigInt, ctx: &mut EvalContext<'a>| {
                let policy = std::mem::replace(&mut ctx.policy, AssignPolicy::Define(kind));
                let result = ctx.define(target, value.clone());
                ctx.policy = policy;
                result
            });
        ev.assign(target, &v, self)?;
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::{AssignPolicy, EvalContext, Pass};
    use crate::asm::codegen::CodeGen;
    use crate::asm::layout::SequentialLayout;
    use crate::asm::section::{SectionFlags, SectionKind};
    use crate::ast::directive::AssignKind;
    use crate::ast::Expr;
    use crate::eval::tests::expr;
    use crate::eval::EvalErrKind;
    use crate::parse::lex::LexRules;
    use crate::parse::parse_source;

    fn assignment(src: &str) -> Expr {
        let file = parse_source(src, &LexRules::default());
        file.stmts.into_iter().next().and_then(|s| s.expr).unwrap()
    }

    fn codegen() -> CodeGen {
        let mut cg = CodeGen::new();
        cg.get_or_create_section_and_set_current(".text", SectionKind::Progbits, SectionFlags::ALLOC);
        cg.emit(&[0; 4]).unwrap();
        cg.define_label("start").unwrap();
        cg.emit(&[0; 6]).unwrap();
        cg.define_label("end").unwrap();
        cg.assign_symbol("K", BigInt::from(3), AssignKind::Equ).unwrap();
        cg
    }

    #[test]
    fn test_pass_discipline() {
        let mut cg = codegen();

        let mut ctx = EvalContext::new(&mut cg, Pass::One, 32);
        assert_eq!(ctx.eval_int(&expr("K * 2")), Ok(BigInt::from(6)));
        assert!(ctx.eval_int(&expr("start")).unwrap_err().is_unresolved());
        assert!(ctx.eval_int(&expr(".")).unwrap_err().is_unresolved());
        assert!(ctx.eval_int(&expr("later")).unwrap_err().is_unresolved());

        let mut ctx = EvalContext::new(&mut cg, Pass::One, 32).relative();
        assert_eq!(ctx.eval_int(&expr("end - start")), Ok(BigInt::from(6)));
        assert_eq!(ctx.eval_int(&expr(". - start")), Ok(BigInt::from(6)));

        cg.order_sections_and_resolve_addresses(&SequentialLayout { base: BigInt::from(0x100), align: 1 }).unwrap();
        let text = cg.current();
        let mut ctx = EvalContext::new(&mut cg, Pass::Two, 32).at(text, 2);
        assert_eq!(ctx.eval_int(&expr("start")), Ok(BigInt::from(0x104)));
        assert_eq!(ctx.eval_int(&expr(".")), Ok(BigInt::from(0x102)));
        assert_eq!(ctx.eval_int(&expr("later")).unwrap_err().kind, EvalErrKind::UndefinedIdentifier("later".into()));
    }

    #[test]
    fn test_other_domains() {
        let mut cg = codegen();
        let mut ctx = EvalContext::new(&mut cg, Pass::One, 32);
        assert_eq!(ctx.eval_float::<f64>(&expr("K / 2.0")), Ok(1.5));
        assert_eq!(ctx.eval_float::<f32>(&expr("K + 0.5")), Ok(3.5));
        assert_eq!(ctx.eval_bool(&expr("K && true")), Ok(true));
        assert_eq!(ctx.eval_str(&expr("\"K=\" + K")).as_deref(), Ok("K=3"));
    }

    #[test]
    fn test_assignment() {
        let mut cg = codegen();

        let mut ctx = EvalContext::new(&mut cg, Pass::One, 32);
        assert_eq!(ctx.eval_int(&assignment("x = 1")).unwrap_err().kind, EvalErrKind::NoAssignHook);

        let mut ctx = EvalContext::new(&mut cg, Pass::One, 32).with_policy(AssignPolicy::Define(AssignKind::Set));
        assert_eq!(ctx.eval_int(&assignment("x = K + 1")), Ok(BigInt::from(4)));
        assert!(ctx.eval_int(&assignment(". = 4")).is_err());

        let target = expr("K");
        assert!(ctx.eval_assign(&target, &expr("7"), AssignKind::Equ).is_err());
        assert_eq!(ctx.eval_assign(&expr("y"), &expr("x * 2"), AssignKind::Equiv), Ok(BigInt::from(8)));
        assert_eq!(ctx.codegen().symbols().get("y").map(|s| s.defined), Some(true));
    }
}
