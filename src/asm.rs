//! Assembling linked source into sections and symbols.
//!
//! The assembler walks the statements of a program in six phases ([`Phase`]):
//! 1. **Link**: the entry file and everything it includes are parsed and linked ([`crate::link`]),
//! 2. **Preprocess**: `.set`, `.equ`, and `.equiv` define absolute symbols,
//! 3. **Allocate** (pass 1): labels are placed, and every instruction and directive
//!    takes up its space in its section. Anything which cannot be computed yet is
//!    reserved and queued for later ([`section::Reservation`]),
//! 4. **Resolve addresses**: a [`Layout`] assigns every section an address,
//! 5. **Generate** (pass 2): every reservation is filled in, now that addresses are known,
//! 6. **Output**: an [`ObjWriter`] serializes the sections.
//!
//! A phase which reports an error diagnostic stops the pipeline after it completes.
//! Problems with individual statements never stop a phase early.
//!
//! The assembler module notably consists of:
//! - [`Assembler`]: holds the collaborators of a run and starts [`Pipeline`]s,
//! - [`CodeGen`]: the sections and symbols produced by a run,
//! - [`EvalContext`]: the bridge between the evaluator and the assembler's state,
//! - [`InstructionEncoder`], [`Layout`], and [`ObjWriter`]: the target-specific parts.

pub mod section;
pub mod symbol;
pub mod layout;
pub mod encoder;
pub mod context;
pub mod codegen;
pub mod encoding;
mod directive;

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use num_bigint::BigInt;

pub use codegen::CodeGen;
pub use context::{AssignPolicy, EvalContext, Pass};
pub use encoder::{EncodeErr, EncodeErrKind, InstructionEncoder};
pub use encoding::{FlatBinary, ObjWriter, TextFormat, WriteErr};
pub use layout::{Layout, LayoutErr, Placement, ScriptLayout, SequentialLayout};
use directive::DirectiveRunner;
use section::{DataKind, LateInit, Reservation, SectionId};
use crate::ast::{ExprKind, Instruction};
use crate::err::{Diagnostic, ErrSpan, NodeRef, Severity};
use crate::eval::int::{fits_in_bytes, to_le_bytes};
use crate::eval::{EvalErr, EvalErrKind};
use crate::link::{LinkErr, LinkedProgram, Linker, SourceProvider};

/// Kinds of errors that can occur while assembling statements.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmErrKind {
    /// A label or symbol was defined twice.
    Redefinition(String),
    /// Data was written into a NOBITS section.
    NobitsData,
    /// An instruction was placed in a NOBITS section.
    NobitsCode,
    /// A directive has the wrong number of arguments.
    ArgCount {
        /// The directive.
        directive: String,
        /// How many arguments are accepted.
        expected: String,
        /// How many arguments were given.
        found: usize,
    },
    /// An argument should have been a name.
    ExpectedName,
    /// An argument should have been a plain string literal.
    ExpectedString,
    /// An alignment is not a power of two.
    InvalidAlignment(String),
    /// A count (e.g., of `.skip`) is negative.
    NegativeCount(String),
    /// A value does not fit in the width it is stored in.
    DoesNotFit {
        /// The value.
        value: String,
        /// The width in bytes.
        width: u8,
    },
    /// The flags string of `.section` has an unknown flag.
    InvalidSectionFlags(String),
    /// The type of `.section` is not `@progbits` or `@nobits`.
    InvalidSectionType(String),
    /// The type of `.type` is not `@function`, `@object`, or `@notype`.
    InvalidSymbolType(String),
    /// Macros and conditional assembly are not supported (warning).
    UnsupportedDirective(String),
    /// Syntax-switching directives have no effect (warning).
    SyntaxDirective(String),
    /// The directive does not exist.
    UnknownDirective(String),
    /// A bare expression which is not an assignment has no effect (warning).
    UnusedExpression,
    /// Pass 2 produced a different number of bytes than pass 1 reserved.
    SizeMismatch {
        /// The bytes reserved.
        reserved: u64,
        /// The bytes produced.
        found: u64,
    },
    /// A section cannot grow to the requested size.
    SectionTooLarge,
    /// An expression could not be evaluated.
    Eval(EvalErrKind),
    /// An instruction could not be encoded.
    Encode(EncodeErrKind),
}
impl AsmErrKind {
    /// How serious this error is.
    pub fn severity(&self) -> Severity {
        match self {
            | AsmErrKind::UnsupportedDirective(_)
            | AsmErrKind::SyntaxDirective(_)
            | AsmErrKind::UnusedExpression
            => Severity::Warning,
            _ => Severity::Error,
        }
    }
}
impl std::fmt::Display for AsmErrKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Redefinition(name)        => write!(f, "symbol {name} is already defined"),
            Self::NobitsData                => f.write_str("cannot emit data into NOBITS section"),
            Self::NobitsCode                => f.write_str("cannot place instructions in NOBITS section"),
            Self::ArgCount { directive, expected, found } => write!(f, "{directive} expects {expected} argument(s), found {found}"),
            Self::ExpectedName              => f.write_str("expected a name"),
            Self::ExpectedString            => f.write_str("expected a string literal"),
            Self::InvalidAlignment(n)       => write!(f, "alignment {n} is not a power of two"),
            Self::NegativeCount(n)          => write!(f, "count cannot be negative (got {n})"),
            Self::DoesNotFit { value, width } => write!(f, "value {value} does not fit in {width} byte(s)"),
            Self::InvalidSectionFlags(s)    => write!(f, "invalid section flags {s:?}"),
            Self::InvalidSectionType(s)     => write!(f, "invalid section type {s}"),
            Self::InvalidSymbolType(s)      => write!(f, "invalid symbol type {s}"),
            Self::UnsupportedDirective(d)   => write!(f, "{d} is not supported and was ignored"),
            Self::SyntaxDirective(d)        => write!(f, "{d} has no effect"),
            Self::UnknownDirective(d)       => write!(f, "unknown directive {d}"),
            Self::UnusedExpression          => f.write_str("expression has no effect"),
            Self::SizeMismatch { reserved, found } => write!(f, "encoded {found} bytes into a {reserved}-byte reservation"),
            Self::SectionTooLarge           => f.write_str("section is too large"),
            Self::Eval(e)                   => e.fmt(f),
            Self::Encode(e)                 => e.fmt(f),
        }
    }
}

/// Error from assembling a statement.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsmErr {
    /// The value with a span.
    pub kind: AsmErrKind,
    /// The span in the source associated with this value.
    pub span: ErrSpan
}
impl AsmErr {
    /// Creates a new [`AsmErr`].
    pub fn new<E: Into<ErrSpan>>(kind: AsmErrKind, span: E) -> Self {
        AsmErr { kind, span: span.into() }
    }
}
impl From<EvalErr> for AsmErr {
    fn from(value: EvalErr) -> Self {
        AsmErr::new(AsmErrKind::Eval(value.kind), value.span)
    }
}
impl From<EncodeErr> for AsmErr {
    fn from(value: EncodeErr) -> Self {
        AsmErr::new(AsmErrKind::Encode(value.kind), value.span)
    }
}
impl std::fmt::Display for AsmErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.kind.fmt(f)
    }
}
impl std::error::Error for AsmErr {}
impl crate::err::Error for AsmErr {
    fn span(&self) -> Option<ErrSpan> {
        Some(self.span.clone())
    }

    fn help(&self) -> Option<Cow<str>> {
        match &self.kind {
            AsmErrKind::Redefinition(_)        => Some("only .set can redefine a symbol, and never a label".into()),
            AsmErrKind::NobitsData             => Some("NOBITS sections only hold zeroes; try .skip or .zero, or move this into .data".into()),
            AsmErrKind::NobitsCode             => Some("try switching to .text first".into()),
            AsmErrKind::ExpectedString         => Some("this argument has to be a string literal without interpolation".into()),
            AsmErrKind::InvalidSectionFlags(_) => Some("section flags are a combination of a, w, and x".into()),
            AsmErrKind::InvalidSectionType(_)  => Some("section types are @progbits and @nobits".into()),
            AsmErrKind::InvalidSymbolType(_)   => Some("symbol types are @function, @object, and @notype".into()),
            AsmErrKind::UnsupportedDirective(_) => Some("macros and conditional assembly are not supported".into()),
            AsmErrKind::SizeMismatch { .. }    => Some("the instruction encoder has to produce exactly as many bytes as it estimated".into()),
            AsmErrKind::Eval(EvalErrKind::Unresolved(_)) => Some("this value has to be known before addresses are assigned".into()),
            _ => None,
        }
    }
}

/// Errors which abort assembling entirely.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum AsmFatal {
    /// Linking failed.
    Link(LinkErr),
    /// An internal invariant did not hold.
    Internal(String),
}
impl std::fmt::Display for AsmFatal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AsmFatal::Link(e) => e.fmt(f),
            AsmFatal::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}
impl std::error::Error for AsmFatal {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AsmFatal::Link(e) => Some(e),
            AsmFatal::Internal(_) => None,
        }
    }
}
impl crate::err::Error for AsmFatal {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            AsmFatal::Link(e) => crate::err::Error::help(e),
            AsmFatal::Internal(_) => Some("this is a bug in the assembler".into()),
        }
    }
}

/// The byte order values are written in.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Endian {
    #[default]
    #[allow(missing_docs)]
    Little,
    #[allow(missing_docs)]
    Big,
}
impl Endian {
    /// Converts an integer into exactly `width` bytes.
    ///
    /// The value has to fit in `width` bytes as a signed or unsigned integer.
    pub fn int_bytes(self, value: &BigInt, width: u8) -> Result<Vec<u8>, AsmErrKind> {
        let len = usize::from(width);
        if !fits_in_bytes(value, len) {
            return Err(AsmErrKind::DoesNotFit { value: value.to_string(), width });
        }
        let mut bytes = to_le_bytes(value, len);
        if self == Endian::Big {
            bytes.reverse();
        }
        Ok(bytes)
    }

    /// Converts an `f32` into bytes.
    pub fn f32_bytes(self, value: f32) -> Vec<u8> {
        match self {
            Endian::Little => value.to_le_bytes().to_vec(),
            Endian::Big => value.to_be_bytes().to_vec(),
        }
    }

    /// Converts an `f64` into bytes.
    pub fn f64_bytes(self, value: f64) -> Vec<u8> {
        match self {
            Endian::Little => value.to_le_bytes().to_vec(),
            Endian::Big => value.to_be_bytes().to_vec(),
        }
    }
}

/// Configuration flags for the assembler.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct AsmFlags {
    /// The bit width integer expressions are evaluated in.
    ///
    /// By default, this is 64.
    pub int_width: u32,

    /// The byte order of data and of values passed to the instruction encoder.
    ///
    /// By default, this is [`Endian::Little`].
    pub endian: Endian,

    /// The section `.section` selects when it has no arguments.
    ///
    /// By default, this is `.text`.
    pub default_section: String,
}
impl Default for AsmFlags {
    fn default() -> Self {
        Self {
            int_width: 64,
            endian: Endian::Little,
            default_section: ".text".to_string(),
        }
    }
}

/// The phases of the assembler, in the order they run.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub enum Phase {
    /// Parse and link every file.
    Link,
    /// Define absolute symbols.
    Preprocess,
    /// Pass 1: place labels, size every statement.
    Allocate,
    /// Assign sections addresses.
    ResolveAddresses,
    /// Pass 2: fill in every reservation.
    Generate,
    /// Serialize.
    Output,
}
impl Phase {
    /// The phase after this one.
    pub fn next(self) -> Option<Phase> {
        match self {
            Phase::Link => Some(Phase::Preprocess),
            Phase::Preprocess => Some(Phase::Allocate),
            Phase::Allocate => Some(Phase::ResolveAddresses),
            Phase::ResolveAddresses => Some(Phase::Generate),
            Phase::Generate => Some(Phase::Output),
            Phase::Output => None,
        }
    }
}
impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Link => f.write_str("link"),
            Phase::Preprocess => f.write_str("preprocess"),
            Phase::Allocate => f.write_str("allocate"),
            Phase::ResolveAddresses => f.write_str("resolve addresses"),
            Phase::Generate => f.write_str("generate"),
            Phase::Output => f.write_str("output"),
        }
    }
}

/// Collects diagnostics during a run.
#[derive(Debug, Default)]
struct Sink {
    diagnostics: Vec<Diagnostic>,
    failed: bool,
}
impl Sink {
    fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    fn report(&mut self, err: &AsmErr, file: &Arc<Path>, node: NodeRef) {
        let node = match err.kind {
            AsmErrKind::Eval(_) => NodeRef::Expr,
            _ => node,
        };
        self.diagnostics.push(Diagnostic::from_err(err, err.kind.severity(), Some(file), node));
    }

    fn detached<E: crate::err::Error>(&mut self, err: &E) {
        self.diagnostics.push(Diagnostic::from_err(err, Severity::Error, None, NodeRef::Detached));
    }
}

/// The assembler: the collaborators used to assemble a program.
///
/// # Example
/// ```
/// use sectasm::asm::{Assembler, EncodeErr, EncodeErrKind, EvalContext, InstructionEncoder};
/// use sectasm::ast::Instruction;
/// use sectasm::link::MemProvider;
///
/// /// A target whose only instruction is `nop`.
/// struct Nop;
/// impl InstructionEncoder for Nop {
///     fn estimate_size(&self, instr: &Instruction, _: &mut EvalContext<'_>) -> Result<u64, EncodeErr> {
///         match instr.mnemonic.as_str() {
///             "nop" => Ok(1),
///             m => Err(EncodeErr::new(EncodeErrKind::UnknownMnemonic(m.to_string()), instr.span.clone())),
///         }
///     }
///     fn encode(&self, _: &Instruction, _: &mut EvalContext<'_>) -> Result<Vec<u8>, EncodeErr> {
///         Ok(vec![0x90])
///     }
/// }
///
/// let provider = MemProvider::default().with_file("main.s", ".text\nnop\nnop\n.byte 1\n");
/// let outcome = Assembler::new(provider, Nop).assemble("main.s").unwrap();
/// assert_eq!(outcome.output, Some(vec![0x90, 0x90, 0x01]));
/// ```
pub struct Assembler {
    provider: Arc<dyn SourceProvider>,
    encoder: Box<dyn InstructionEncoder>,
    layout: Box<dyn Layout>,
    writer: Box<dyn ObjWriter>,
    cancel: Option<Arc<AtomicBool>>,
    /// Configuration flags.
    pub flags: AsmFlags,
}
impl Assembler {
    /// Creates an assembler which places sections with [`SequentialLayout`]
    /// and writes a [`FlatBinary`].
    pub fn new(provider: impl SourceProvider + 'static, encoder: impl InstructionEncoder + 'static) -> Self {
        Self {
            provider: Arc::new(provider),
            encoder: Box::new(encoder),
            layout: Box::new(SequentialLayout::default()),
            writer: Box::new(FlatBinary::default()),
            cancel: None,
            flags: AsmFlags::default(),
        }
    }

    /// Sets the section layout.
    pub fn with_layout(mut self, layout: impl Layout + 'static) -> Self {
        self.layout = Box::new(layout);
        self
    }

    /// Sets the output serializer.
    pub fn with_writer(mut self, writer: impl ObjWriter + 'static) -> Self {
        self.writer = Box::new(writer);
        self
    }

    /// Sets the configuration flags.
    pub fn with_flags(mut self, flags: AsmFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets a flag which cancels linking when set.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Creates a pipeline which assembles the given entry file, one phase at a time.
    pub fn pipeline(&self, entry: impl AsRef<Path>) -> Pipeline<'_> {
        Pipeline {
            asm: self,
            entry: entry.as_ref().to_path_buf(),
            next: Some(Phase::Link),
            program: None,
            codegen: CodeGen::new(),
            sink: Sink::default(),
            output: None,
        }
    }

    /// Assembles the given entry file, running every phase.
    ///
    /// This only fails if a fatal error occurs.
    /// Any other error is reported in the diagnostics of the outcome.
    pub fn assemble(&self, entry: impl AsRef<Path>) -> Result<AsmOutcome, AsmFatal> {
        self.pipeline(entry).run()
    }
}

/// The result of assembling a program.
#[derive(Debug)]
pub struct AsmOutcome {
    /// The serialized output, if every phase succeeded.
    pub output: Option<Vec<u8>>,
    /// The final sections and symbols.
    pub codegen: CodeGen,
    /// Every diagnostic raised, in the order raised.
    pub diagnostics: Vec<Diagnostic>,
}
impl AsmOutcome {
    /// Whether the run produced output.
    pub fn is_ok(&self) -> bool {
        self.output.is_some()
    }

    /// The error diagnostics.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }
}

/// A run of the assembler which can be stepped through phase by phase.
pub struct Pipeline<'a> {
    asm: &'a Assembler,
    entry: PathBuf,
    next: Option<Phase>,
    program: Option<LinkedProgram>,
    codegen: CodeGen,
    sink: Sink,
    output: Option<Vec<u8>>,
}
impl<'a> Pipeline<'a> {
    /// The code generator state.
    pub fn codegen(&self) -> &CodeGen {
        &self.codegen
    }

    /// The diagnostics raised so far.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.sink.diagnostics
    }

    /// The linked program (once [`Phase::Link`] has run).
    pub fn program(&self) -> Option<&LinkedProgram> {
        self.program.as_ref()
    }

    /// Whether a phase has failed.
    pub fn failed(&self) -> bool {
        self.sink.failed
    }

    /// The phase which runs on the next [`Pipeline::step`].
    ///
    /// This is `None` if the pipeline is done or has failed.
    pub fn next_phase(&self) -> Option<Phase> {
        self.next.filter(|_| !self.sink.failed)
    }

    /// Runs the next phase, returning which phase ran.
    ///
    /// This returns `None` if every phase has run, or if a phase failed.
    pub fn step(&mut self) -> Result<Option<Phase>, AsmFatal> {
        let Some(phase) = self.next_phase() else { return Ok(None) };
        let _span = tracing::debug_span!("phase", %phase).entered();

        let errors = self.sink.error_count();
        match phase {
            Phase::Link => self.link()?,
            Phase::Preprocess => self.preprocess()?,
            Phase::Allocate => self.allocate()?,
            Phase::ResolveAddresses => self.resolve_addresses(),
            Phase::Generate => self.generate(),
            Phase::Output => self.write_output(),
        }
        if self.sink.error_count() > errors {
            tracing::debug!(errors = self.sink.error_count() - errors, "phase failed");
            self.sink.failed = true;
        }

        self.next = phase.next();
        Ok(Some(phase))
    }

    /// Runs every remaining phase.
    pub fn run(mut self) -> Result<AsmOutcome, AsmFatal> {
        while self.step()?.is_some() {}
        Ok(self.finish())
    }

    /// Ends the run.
    pub fn finish(self) -> AsmOutcome {
        let output = match self.sink.failed {
            true => None,
            false => self.output,
        };
        AsmOutcome { output, codegen: self.codegen, diagnostics: self.sink.diagnostics }
    }

    fn link(&mut self) -> Result<(), AsmFatal> {
        let mut linker = Linker::from_shared(Arc::clone(&self.asm.provider));
        if let Some(cancel) = &self.asm.cancel {
            linker = linker.with_cancel_flag(Arc::clone(cancel));
        }

        let program = linker.link(&self.entry).map_err(AsmFatal::Link)?;
        self.sink.diagnostics.extend(program.all_diagnostics().cloned());
        self.program = Some(program);
        Ok(())
    }

    fn preprocess(&mut self) -> Result<(), AsmFatal> {
        let program = self.program.as_ref().ok_or_else(unlinked)?;
        for s in program.statements() {
            let Some(d) = &s.stmt.directive else { continue };
            if !d.kind.is_preprocessed() { continue; }

            let mut runner = DirectiveRunner::new(&mut self.codegen, &self.asm.flags, &s.file.path);
            if let Err(e) = runner.preprocess(d) {
                self.sink.report(&e, &s.file.path, NodeRef::Directive);
            }
        }

        tracing::debug!(symbols = self.codegen.symbols().len(), "defined absolute symbols");
        Ok(())
    }

    fn allocate(&mut self) -> Result<(), AsmFatal> {
        let program = self.program.as_ref().ok_or_else(unlinked)?;
        let flags = &self.asm.flags;
        for s in program.statements() {
            let file = &s.file.path;
            if let Some(label) = &s.stmt.label {
                if let Err(kind) = self.codegen.define_label(&label.name) {
                    self.sink.report(&AsmErr::new(kind, label.span.clone()), file, NodeRef::Label);
                }
            }
            if let Some(instr) = &s.stmt.instr {
                if let Err(e) = allocate_instruction(&mut self.codegen, &*self.asm.encoder, flags, file, instr) {
                    self.sink.report(&e, file, NodeRef::Instruction);
                }
            }
            if let Some(d) = &s.stmt.directive {
                if !d.kind.is_preprocessed() {
                    let mut runner = DirectiveRunner::new(&mut self.codegen, flags, file);
                    if let Err(e) = runner.allocate(d) {
                        self.sink.report(&e, file, NodeRef::Directive);
                    }
                }
            }
            if let Some(expr) = &s.stmt.expr {
                let result = match expr.kind {
                    ExprKind::Assign { .. } => EvalContext::new(&mut self.codegen, Pass::One, flags.int_width)
                        .in_file(file)
                        .with_policy(AssignPolicy::Define(crate::ast::directive::AssignKind::Set))
                        .eval_int(expr)
                        .map(|_| ())
                        .map_err(AsmErr::from),
                    _ => Err(AsmErr::new(AsmErrKind::UnusedExpression, expr.span.clone())),
                };
                if let Err(e) = result {
                    self.sink.report(&e, file, NodeRef::Expr);
                }
            }
        }

        tracing::debug!(
            symbols = self.codegen.symbols().len(),
            sections = self.codegen.sections().len(),
            reservations = self.codegen.reservation_count(),
            "allocated program"
        );
        Ok(())
    }

    fn resolve_addresses(&mut self) {
        if let Err(e) = self.codegen.order_sections_and_resolve_addresses(&*self.asm.layout) {
            self.sink.detached(&e);
        }
    }

    fn generate(&mut self) {
        let flags = &self.asm.flags;
        let order = self.codegen.section_order().to_vec();
        for id in order {
            let reservations = std::mem::take(&mut self.codegen.section_mut(id).reservations);
            if self.codegen.section(id).is_nobits() {
                tracing::trace!(section = %self.codegen.section(id).name, discarded = reservations.len(), "skipping NOBITS section");
                continue;
            }

            let mut pending = vec![];
            for r in reservations {
                if let Err(e) = fill_reservation(&mut self.codegen, &*self.asm.encoder, flags, id, &r) {
                    let node = match r.item {
                        LateInit::Instruction { .. } => NodeRef::Instruction,
                        LateInit::Data { .. } => NodeRef::Expr,
                    };
                    self.sink.report(&e, r.item.file(), node);
                    pending.push(r);
                }
            }
            if !pending.is_empty() {
                tracing::debug!(section = %self.codegen.section(id).name, pending = pending.len(), "section has unfilled reservations");
            }
            self.codegen.section_mut(id).reservations = pending;
        }

        for d in self.codegen.take_deferred_sizes() {
            let result = EvalContext::new(&mut self.codegen, Pass::Two, flags.int_width)
                .at(d.section, d.offset)
                .in_file(&d.file)
                .eval_int(&d.expr);
            match result {
                Ok(size) => self.codegen.set_symbol_size(&d.name, d.section, size),
                Err(e) => self.sink.report(&AsmErr::from(e), &d.file, NodeRef::Expr),
            }
        }
    }

    fn write_output(&mut self) {
        match self.asm.writer.serialize(&self.codegen) {
            Ok(bytes) => {
                tracing::debug!(bytes = bytes.len(), "wrote output");
                self.output = Some(bytes);
            },
            Err(e) => self.sink.detached(&e),
        }
    }
}

fn unlinked() -> AsmFatal {
    AsmFatal::Internal("program was not linked".into())
}

/// Sizes an instruction and reserves its space in the current section.
fn allocate_instruction(
    codegen: &mut CodeGen,
    encoder: &dyn InstructionEncoder,
    flags: &AsmFlags,
    file: &Arc<Path>,
    instr: &Instruction
) -> Result<(), AsmErr> {
    let section = codegen.current();
    if codegen.section(section).is_nobits() {
        return Err(AsmErr::new(AsmErrKind::NobitsCode, instr.span.clone()));
    }

    let size = {
        let mut ctx = EvalContext::new(codegen, Pass::One, flags.int_width).in_file(file);
        encoder.estimate_size(instr, &mut ctx)?
    };
    codegen.queue_late_init(section, LateInit::Instruction { file: Arc::clone(file), instr: instr.clone() }, size);
    Ok(())
}

/// Computes the bytes of a reservation and writes them into its range.
fn fill_reservation(
    codegen: &mut CodeGen,
    encoder: &dyn InstructionEncoder,
    flags: &AsmFlags,
    section: SectionId,
    r: &Reservation
) -> Result<(), AsmErr> {
    let bytes = {
        let mut ctx = EvalContext::new(codegen, Pass::Two, flags.int_width)
            .at(section, r.offset)
            .in_file(r.item.file());

        match &r.item {
            LateInit::Instruction { instr, .. } => encoder.encode(instr, &mut ctx)?,
            LateInit::Data { expr, kind: DataKind::Int(width), .. } => {
                let value = ctx.eval_int(expr)?;
                flags.endian.int_bytes(&value, *width).map_err(|k| AsmErr::new(k, expr.span.clone()))?
            },
            LateInit::Data { expr, kind: DataKind::Float { double: false }, .. } => flags.endian.f32_bytes(ctx.eval_float(expr)?),
            LateInit::Data { expr, kind: DataKind::Float { double: true }, .. } => flags.endian.f64_bytes(ctx.eval_float(expr)?),
        }
    };

    let mismatch = || AsmErr::new(AsmErrKind::SizeMismatch { reserved: r.size, found: bytes.len() as u64 }, r.item.span());
    if bytes.len() as u64 != r.size {
        return Err(mismatch());
    }
    let range = r.offset as usize .. (r.offset + r.size) as usize;
    let slot = codegen.section_mut(section).content.get_mut(range).ok_or_else(mismatch)?;
    slot.copy_from_slice(&bytes);
    Ok(())
}
