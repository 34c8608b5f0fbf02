//! The closed set of directives the assembler recognizes.

/// Which kind of section a section-control shorthand selects.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SectionShorthand {
    /// `.text`
    Text,
    /// `.data`
    Data,
    /// `.bss`
    Bss,
    /// `.rodata`
    Rodata,
}
impl SectionShorthand {
    /// The name of the section this shorthand selects.
    pub fn section_name(self) -> &'static str {
        match self {
            SectionShorthand::Text => ".text",
            SectionShorthand::Data => ".data",
            SectionShorthand::Bss => ".bss",
            SectionShorthand::Rodata => ".rodata",
        }
    }
}

/// The assignment directives.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum AssignKind {
    /// `.set`: defines or redefines an absolute symbol.
    Set,
    /// `.equ`: defines an absolute symbol (only once).
    Equ,
    /// `.equiv`: like `.equ`.
    Equiv,
}
impl AssignKind {
    /// Whether this form may redefine an existing symbol.
    pub fn allows_redefinition(self) -> bool {
        matches!(self, AssignKind::Set)
    }
}

/// The binding-management directives.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum BindKind {
    /// `.globl`, `.global`
    Global,
    /// `.local`
    Local,
    /// `.weak`
    Weak,
}

/// A recognized directive.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DirectiveKind {
    /// `.text`, `.data`, `.bss`, `.rodata`
    SectionShorthand(SectionShorthand),
    /// `.section name[, "flags"[, @type]]`
    Section,
    /// Integer data of the given width in bytes:
    /// `.byte` (1), `.short`/`.half`/`.hword`/`.2byte` (2),
    /// `.word`/`.long`/`.int`/`.4byte` (4), `.quad`/`.dword`/`.8byte` (8).
    Emit(u8),
    /// `.ascii` (`zero: false`), `.asciz`/`.string` (`zero: true`).
    Ascii {
        /// Whether each string is followed by a NUL byte.
        zero: bool,
    },
    /// `.float`/`.single` (`double: false`), `.double` (`double: true`).
    EmitFloat {
        /// Whether the values are 64-bit floats.
        double: bool,
    },
    /// `.set`, `.equ`, `.equiv`
    Assign(AssignKind),
    /// `.globl`, `.global`, `.local`, `.weak`
    Bind(BindKind),
    /// `.comm` (`local: false`), `.lcomm` (`local: true`).
    Common {
        /// Whether the symbol is local.
        local: bool,
    },
    /// `.type`
    Type,
    /// `.size`
    Size,
    /// `.align`, `.balign` (`pow2: false`), `.p2align` (`pow2: true`).
    Align {
        /// Whether the argument is a power of two rather than a byte count.
        pow2: bool,
    },
    /// `.fill repeat[, size[, value]]`
    Fill,
    /// `.skip`, `.space`
    Skip,
    /// `.zero`
    Zero,
    /// `.include "path"`
    Include,
    /// `.intel_syntax`, `.att_syntax`, `.option`
    Syntax,
    /// `.file`, `.ident` (ignored silently)
    Metadata,
    /// Macro and conditional-assembly directives (recognized, never executed).
    Unsupported,
    /// Anything else.
    Unknown,
}
impl DirectiveKind {
    /// Looks up the directive with the given name (including its leading `.`).
    ///
    /// Names are matched case-insensitively.
    ///
    /// # Example
    /// ```
    /// use sectasm::ast::directive::{DirectiveKind, AssignKind};
    ///
    /// assert_eq!(DirectiveKind::from_name(".half"), DirectiveKind::Emit(2));
    /// assert_eq!(DirectiveKind::from_name(".EQU"), DirectiveKind::Assign(AssignKind::Equ));
    /// assert_eq!(DirectiveKind::from_name(".macro"), DirectiveKind::Unsupported);
    /// assert_eq!(DirectiveKind::from_name(".nonsense"), DirectiveKind::Unknown);
    /// ```
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            ".text"   => DirectiveKind::SectionShorthand(SectionShorthand::Text),
            ".data"   => DirectiveKind::SectionShorthand(SectionShorthand::Data),
            ".bss"    => DirectiveKind::SectionShorthand(SectionShorthand::Bss),
            ".rodata" => DirectiveKind::SectionShorthand(SectionShorthand::Rodata),
            ".section" => DirectiveKind::Section,

            ".byte" => DirectiveKind::Emit(1),
            ".short" | ".half" | ".hword" | ".2byte" => DirectiveKind::Emit(2),
            ".word" | ".long" | ".int" | ".4byte" => DirectiveKind::Emit(4),
            ".quad" | ".dword" | ".8byte" => DirectiveKind::Emit(8),
            ".ascii" => DirectiveKind::Ascii { zero: false },
            ".asciz" | ".string" => DirectiveKind::Ascii { zero: true },
            ".float" | ".single" => DirectiveKind::EmitFloat { double: false },
            ".double" => DirectiveKind::EmitFloat { double: true },

            ".set"   => DirectiveKind::Assign(AssignKind::Set),
            ".equ"   => DirectiveKind::Assign(AssignKind::Equ),
            ".equiv" => DirectiveKind::Assign(AssignKind::Equiv),

            ".globl" | ".global" => DirectiveKind::Bind(BindKind::Global),
            ".local" => DirectiveKind::Bind(BindKind::Local),
            ".weak"  => DirectiveKind::Bind(BindKind::Weak),
            ".comm"  => DirectiveKind::Common { local: false },
            ".lcomm" => DirectiveKind::Common { local: true },
            ".type"  => DirectiveKind::Type,
            ".size"  => DirectiveKind::Size,

            ".align" | ".balign" => DirectiveKind::Align { pow2: false },
            ".p2align" => DirectiveKind::Align { pow2: true },
            ".fill"  => DirectiveKind::Fill,
            ".skip" | ".space" => DirectiveKind::Skip,
            ".zero"  => DirectiveKind::Zero,

            ".include" => DirectiveKind::Include,
            ".intel_syntax" | ".att_syntax" | ".option" => DirectiveKind::Syntax,
            ".file" | ".ident" => DirectiveKind::Metadata,

            | ".macro" | ".endm" | ".exitm" | ".purgem"
            | ".if" | ".ifdef" | ".ifndef" | ".ifeq" | ".ifne" | ".else" | ".elseif" | ".endif"
            | ".rept" | ".irp" | ".irpc" | ".endr"
            => DirectiveKind::Unsupported,

            _ => DirectiveKind::Unknown,
        }
    }

    /// Whether this directive only affects symbols and is run in the preprocess phase.
    pub fn is_preprocessed(self) -> bool {
        matches!(self, DirectiveKind::Assign(_) | DirectiveKind::Syntax)
    }

    /// Whether this directive writes bytes into the current section.
    pub fn is_emissive(self) -> bool {
        matches!(self,
            DirectiveKind::Emit(_)
            | DirectiveKind::Ascii { .. }
            | DirectiveKind::EmitFloat { .. }
            | DirectiveKind::Fill
        )
    }
}
