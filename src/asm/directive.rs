//! Running directives in the preprocess and allocate phases.

use std::path::Path;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use super::codegen::{CodeGen, DeferredSize};
use super::context::{EvalContext, Pass};
use super::section::{DataKind, LateInit, SectionFlags, SectionKind};
use super::symbol::{Binding, SymbolType};
use super::{AsmErr, AsmErrKind, AsmFlags};
use crate::ast::directive::{BindKind, DirectiveKind};
use crate::ast::{Directive, Expr};

/// Checks the number of arguments of a directive.
fn args(d: &Directive, min: usize, max: usize) -> Result<&[Expr], AsmErr> {
    let found = d.args.len();
    if (min..=max).contains(&found) {
        return Ok(&d.args);
    }

    let expected = if min == max {
        min.to_string()
    } else if max == usize::MAX {
        format!("at least {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(AsmErr::new(AsmErrKind::ArgCount { directive: d.name.clone(), expected, found }, d.span.clone()))
}

/// A name argument: an identifier or a plain string.
fn name_arg(e: &Expr) -> Result<String, AsmErr> {
    e.as_ident()
        .map(str::to_string)
        .or_else(|| e.as_plain_str())
        .ok_or_else(|| AsmErr::new(AsmErrKind::ExpectedName, e.span.clone()))
}

/// Runs the directives of one file against the code generator.
pub(super) struct DirectiveRunner<'a> {
    codegen: &'a mut CodeGen,
    flags: &'a AsmFlags,
    file: &'a Arc<Path>,
}
impl<'a> DirectiveRunner<'a> {
    pub(super) fn new(codegen: &'a mut CodeGen, flags: &'a AsmFlags, file: &'a Arc<Path>) -> Self {
        Self { codegen, flags, file }
    }

    /// A pass 1 context at the current location.
    fn ctx(&mut self) -> EvalContext<'_> {
        EvalContext::new(self.codegen, Pass::One, self.flags.int_width).in_file(self.file)
    }

    /// Evaluates a nonnegative count, which has to be known in pass 1.
    fn count(&mut self, e: &Expr) -> Result<u64, AsmErr> {
        let value = self.ctx().eval_int(e)?;
        if value.is_negative() {
            return Err(AsmErr::new(AsmErrKind::NegativeCount(value.to_string()), e.span.clone()));
        }
        value.to_u64().ok_or_else(|| AsmErr::new(AsmErrKind::SectionTooLarge, e.span.clone()))
    }

    /// Evaluates a fill byte.
    fn fill_byte(&mut self, e: &Expr) -> Result<u8, AsmErr> {
        let value = self.ctx().eval_int(e)?;
        let bytes = self.flags.endian.int_bytes(&value, 1).map_err(|k| AsmErr::new(k, e.span.clone()))?;
        Ok(bytes[0])
    }

    fn check_progbits(&self, d: &Directive) -> Result<(), AsmErr> {
        match self.codegen.section(self.codegen.current()).is_nobits() {
            true => Err(AsmErr::new(AsmErrKind::NobitsData, d.span.clone())),
            false => Ok(()),
        }
    }

    fn emit(&mut self, bytes: &[u8], d: &Directive) -> Result<(), AsmErr> {
        self.codegen.emit(bytes).map_err(|k| AsmErr::new(k, d.span.clone()))
    }

    /// Reserves space for a value which can only be computed in pass 2.
    fn reserve(&mut self, e: &Expr, kind: DataKind) {
        let item = LateInit::Data { file: Arc::clone(self.file), expr: e.clone(), kind };
        self.codegen.queue_late_init(self.codegen.current(), item, kind.size());
    }

    /// Runs a directive in the preprocess phase.
    ///
    /// This only does anything for [preprocessed directives](DirectiveKind::is_preprocessed).
    pub(super) fn preprocess(&mut self, d: &Directive) -> Result<(), AsmErr> {
        match d.kind {
            DirectiveKind::Assign(kind) => {
                let [target, value] = args(d, 2, 2)? else { return Ok(()) };
                if target.as_ident().is_none() {
                    return Err(AsmErr::new(AsmErrKind::ExpectedName, target.span.clone()));
                }
                self.ctx().eval_assign(target, value, kind)?;
                Ok(())
            },
            DirectiveKind::Syntax => Err(AsmErr::new(AsmErrKind::SyntaxDirective(d.name.clone()), d.span.clone())),
            _ => Ok(()),
        }
    }

    /// Runs a directive in the allocate phase.
    pub(super) fn allocate(&mut self, d: &Directive) -> Result<(), AsmErr> {
        match d.kind {
            DirectiveKind::SectionShorthand(s) => {
                args(d, 0, 0)?;
                let name = s.section_name();
                let (kind, flags) = SectionFlags::defaults_for(name);
                self.codegen.get_or_create_section_and_set_current(name, kind, flags);
                Ok(())
            },
            DirectiveKind::Section => self.section(d),
            DirectiveKind::Emit(width) => {
                self.check_progbits(d)?;
                for arg in args(d, 1, usize::MAX)? {
                    let result = self.ctx().eval_int(arg);
                    match result {
                        Ok(value) => {
                            let bytes = self.flags.endian.int_bytes(&value, width).map_err(|k| AsmErr::new(k, arg.span.clone()))?;
                            self.emit(&bytes, d)?;
                        },
                        Err(e) if e.is_unresolved() => self.reserve(arg, DataKind::Int(width)),
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            },
            DirectiveKind::Ascii { zero } => {
                self.check_progbits(d)?;
                for arg in args(d, 1, usize::MAX)? {
                    let mut bytes = self.ctx().eval_str(arg)?.into_bytes();
                    if zero {
                        bytes.push(0);
                    }
                    self.emit(&bytes, d)?;
                }
                Ok(())
            },
            DirectiveKind::EmitFloat { double } => {
                self.check_progbits(d)?;
                let endian = self.flags.endian;
                for arg in args(d, 1, usize::MAX)? {
                    let result = match double {
                        false => self.ctx().eval_float::<f32>(arg).map(|v| endian.f32_bytes(v)),
                        true  => self.ctx().eval_float::<f64>(arg).map(|v| endian.f64_bytes(v)),
                    };
                    match result {
                        Ok(bytes) => self.emit(&bytes, d)?,
                        Err(e) if e.is_unresolved() => self.reserve(arg, DataKind::Float { double }),
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(())
            },
            DirectiveKind::Bind(kind) => {
                let binding = match kind {
                    BindKind::Global => Binding::Global,
                    BindKind::Local => Binding::Local,
                    BindKind::Weak => Binding::Weak,
                };
                for arg in args(d, 1, usize::MAX)? {
                    let name = name_arg(arg)?;
                    self.codegen.declare_binding(&name, binding);
                }
                Ok(())
            },
            DirectiveKind::Common { local } => self.common(d, local),
            DirectiveKind::Type => {
                let [name, ty] = args(d, 2, 2)? else { return Ok(()) };
                let name = name_arg(name)?;
                let ty_name = name_arg(ty)?;
                let ty = SymbolType::parse(&ty_name)
                    .ok_or_else(|| AsmErr::new(AsmErrKind::InvalidSymbolType(ty_name), ty.span.clone()))?;
                self.codegen.set_symbol_type(&name, ty);
                Ok(())
            },
            DirectiveKind::Size => {
                let [name, size] = args(d, 2, 2)? else { return Ok(()) };
                let name = name_arg(name)?;
                let result = self.ctx().relative().eval_int(size);
                match result {
                    Ok(value) => self.codegen.set_symbol_size(&name, self.codegen.current(), value),
                    Err(e) if e.is_unresolved() => {
                        let (section, offset) = (self.codegen.current(), self.codegen.offset());
                        self.codegen.defer_size(DeferredSize { name, expr: size.clone(), file: Arc::clone(self.file), section, offset });
                    },
                    Err(e) => return Err(e.into()),
                }
                Ok(())
            },
            DirectiveKind::Align { pow2 } => self.align(d, pow2),
            DirectiveKind::Fill => {
                self.check_progbits(d)?;
                let args = args(d, 1, 3)?;
                let repeat = self.count(&args[0])?;
                // Values are at most 8 bytes.
                let size = match args.get(1) {
                    Some(e) => self.count(e)?.min(8),
                    None => 1,
                };
                let value = match args.get(2) {
                    Some(e) => self.ctx().eval_int(e)?,
                    None => BigInt::from(0),
                };

                let span = args.get(2).map_or(d.span.clone(), |e| e.span.clone());
                let unit = self.flags.endian.int_bytes(&value, size as u8).map_err(|k| AsmErr::new(k, span))?;
                let repeat = usize::try_from(repeat).map_err(|_| AsmErr::new(AsmErrKind::SectionTooLarge, d.span.clone()))?;
                self.emit(&unit.repeat(repeat), d)
            },
            DirectiveKind::Skip => {
                let args = args(d, 1, 2)?;
                let n = self.count(&args[0])?;
                let fill = match args.get(1) {
                    Some(e) => Some(self.fill_byte(e)?),
                    None => None,
                };
                self.codegen.pad(n, fill).map_err(|k| AsmErr::new(k, d.span.clone()))
            },
            DirectiveKind::Zero => {
                let [n] = args(d, 1, 1)? else { return Ok(()) };
                let n = self.count(n)?;
                self.codegen.pad(n, None).map_err(|k| AsmErr::new(k, d.span.clone()))
            },
            // Handled by the linker and the preprocess phase.
            DirectiveKind::Include | DirectiveKind::Assign(_) | DirectiveKind::Syntax => Ok(()),
            DirectiveKind::Metadata => Ok(()),
            DirectiveKind::Unsupported => Err(AsmErr::new(AsmErrKind::UnsupportedDirective(d.name.clone()), d.span.clone())),
            DirectiveKind::Unknown => Err(AsmErr::new(AsmErrKind::UnknownDirective(d.name.clone()), d.span.clone())),
        }
    }

    /// `.section name[, "flags"[, @type]]`
    fn section(&mut self, d: &Directive) -> Result<(), AsmErr> {
        let args = args(d, 0, 3)?;
        let name = match args.first() {
            Some(e) => name_arg(e)?,
            None => self.flags.default_section.clone(),
        };

        let (mut kind, mut flags) = SectionFlags::defaults_for(&name);
        if let Some(e) = args.get(1) {
            let s = e.as_plain_str().ok_or_else(|| AsmErr::new(AsmErrKind::ExpectedString, e.span.clone()))?;
            flags = SectionFlags::parse(&s).ok_or_else(|| AsmErr::new(AsmErrKind::InvalidSectionFlags(s), e.span.clone()))?;
        }
        if let Some(e) = args.get(2) {
            let ty = name_arg(e)?;
            kind = match ty.trim_start_matches('@') {
                "progbits" => SectionKind::Progbits,
                "nobits" => SectionKind::Nobits,
                _ => return Err(AsmErr::new(AsmErrKind::InvalidSectionType(ty), e.span.clone())),
            };
        }

        self.codegen.get_or_create_section_and_set_current(&name, kind, flags);
        Ok(())
    }

    /// `.align n[, fill[, max]]`, `.balign`, `.p2align`
    fn align(&mut self, d: &Directive, pow2: bool) -> Result<(), AsmErr> {
        let args = args(d, 1, 3)?;
        let n = self.count(&args[0])?;
        let boundary = match pow2 {
            true => (n < 64).then(|| 1u64 << n),
            false => Some(n).filter(|n| n.is_power_of_two()),
        };
        let boundary = boundary.ok_or_else(|| AsmErr::new(AsmErrKind::InvalidAlignment(n.to_string()), args[0].span.clone()))?;

        let fill = match args.get(1) {
            Some(e) => Some(self.fill_byte(e)?),
            None => None,
        };
        let max_skip = match args.get(2) {
            Some(e) => Some(self.count(e)?),
            None => None,
        };
        self.codegen.align(boundary, fill, max_skip).map_err(|k| AsmErr::new(k, d.span.clone()))?;
        Ok(())
    }

    /// `.comm name, size[, align]`, `.lcomm name, size[, align]`
    ///
    /// The symbol is placed in `.bss`, without changing the current section.
    fn common(&mut self, d: &Directive, local: bool) -> Result<(), AsmErr> {
        let args = args(d, 2, 3)?;
        let name = name_arg(&args[0])?;
        let size = self.count(&args[1])?;
        let align = match args.get(2) {
            Some(e) => {
                let n = self.count(e)?;
                match n.is_power_of_two() {
                    true => Some(n),
                    false => return Err(AsmErr::new(AsmErrKind::InvalidAlignment(n.to_string()), e.span.clone())),
                }
            },
            None => None,
        };

        let (kind, flags) = SectionFlags::defaults_for(".bss");
        let bss = self.codegen.get_or_create_section(".bss", kind, flags);
        let prev = self.codegen.current();
        self.codegen.set_current(bss);
        let result = self.place_common(&name, size, align);
        if result.is_ok() {
            let binding = if local { Binding::Local } else { Binding::Global };
            self.codegen.declare_binding(&name, binding);
            self.codegen.set_symbol_type(&name, SymbolType::Object);
            self.codegen.set_symbol_size(&name, bss, BigInt::from(size));
        }
        self.codegen.set_current(prev);
        result.map_err(|k| AsmErr::new(k, d.span.clone()))
    }

    fn place_common(&mut self, name: &str, size: u64, align: Option<u64>) -> Result<(), AsmErrKind> {
        if let Some(align) = align {
            self.codegen.align(align, None, None)?;
        }
        self.codegen.define_label(name)?;
        self.codegen.pad(size, None)
    }
}
