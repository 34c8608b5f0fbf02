//! Sections and late-init reservations.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use num_bigint::BigInt;

use crate::ast::{Expr, Instruction};

/// Index of a section in a [`CodeGen`](super::CodeGen).
///
/// The section at index 0 is always the NULL section.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct SectionId(pub usize);
impl SectionId {
    /// The NULL section.
    pub const NULL: SectionId = SectionId(0);
}

/// The kind of a section.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum SectionKind {
    /// The NULL section (section 0), which holds anything
    /// declared before the first section directive.
    Null,
    /// A section with contents.
    Progbits,
    /// A section which only has a size (e.g., `.bss`).
    Nobits,
}
impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SectionKind::Null => f.write_str("NULL"),
            SectionKind::Progbits => f.write_str("PROGBITS"),
            SectionKind::Nobits => f.write_str("NOBITS"),
        }
    }
}

/// Section attribute flags.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct SectionFlags(u8);
impl SectionFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// The section occupies memory at run time (`a`).
    pub const ALLOC: Self = Self(0b001);
    /// The section is writable (`w`).
    pub const WRITE: Self = Self(0b010);
    /// The section is executable (`x`).
    pub const EXEC: Self = Self(0b100);

    /// Whether all of the flags in `other` are set.
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parses a flag string (e.g., `"awx"`).
    ///
    /// This returns `None` if there is an unknown flag character.
    pub fn parse(s: &str) -> Option<Self> {
        s.chars().try_fold(Self::NONE, |acc, c| match c {
            'a' => Some(acc | Self::ALLOC),
            'w' => Some(acc | Self::WRITE),
            'x' => Some(acc | Self::EXEC),
            _ => None,
        })
    }

    /// The default kind and flags of well-known section names.
    pub fn defaults_for(name: &str) -> (SectionKind, SectionFlags) {
        let prefix = |p: &str| name == p || name.starts_with(&format!("{p}."));
        if prefix(".text") {
            (SectionKind::Progbits, Self::ALLOC | Self::EXEC)
        } else if prefix(".data") {
            (SectionKind::Progbits, Self::ALLOC | Self::WRITE)
        } else if prefix(".bss") {
            (SectionKind::Nobits, Self::ALLOC | Self::WRITE)
        } else if prefix(".rodata") {
            (SectionKind::Progbits, Self::ALLOC)
        } else {
            (SectionKind::Progbits, Self::NONE)
        }
    }
}
impl std::ops::BitOr for SectionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
impl std::fmt::Display for SectionFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (flag, c) in [(Self::ALLOC, 'a'), (Self::WRITE, 'w'), (Self::EXEC, 'x')] {
            if self.contains(flag) {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}

/// What kind of value a data reservation holds.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DataKind {
    /// An integer of the given width in bytes.
    Int(u8),
    /// A float (`f64` if `double`, otherwise `f32`).
    Float {
        /// Whether this is an `f64`.
        double: bool,
    },
}
impl DataKind {
    /// The number of bytes this value occupies.
    pub fn size(self) -> u64 {
        match self {
            DataKind::Int(w) => u64::from(w),
            DataKind::Float { double: false } => 4,
            DataKind::Float { double: true } => 8,
        }
    }
}

/// Work deferred until addresses are known.
#[derive(Debug, PartialEq, Clone)]
pub enum LateInit {
    /// An instruction, encoded in pass 2.
    Instruction {
        /// The file the instruction is from.
        file: Arc<Path>,
        /// The instruction.
        instr: Instruction,
    },
    /// A data value which could not be computed in pass 1.
    Data {
        /// The file the value is from.
        file: Arc<Path>,
        /// The value.
        expr: Expr,
        /// How the value is stored.
        kind: DataKind,
    },
}
impl LateInit {
    /// The file this item is from.
    pub fn file(&self) -> &Arc<Path> {
        match self {
            LateInit::Instruction { file, .. } => file,
            LateInit::Data { file, .. } => file,
        }
    }

    /// The source span of this item.
    pub fn span(&self) -> Range<usize> {
        match self {
            LateInit::Instruction { instr, .. } => instr.span.clone(),
            LateInit::Data { expr, .. } => expr.span.clone(),
        }
    }
}

/// A range of section content which is filled in pass 2.
#[derive(Debug, PartialEq, Clone)]
pub struct Reservation {
    /// The deferred work.
    pub item: LateInit,
    /// The offset of the range in its section.
    pub offset: u64,
    /// The size of the range.
    pub size: u64,
}
impl Reservation {
    /// The reserved byte range.
    pub fn range(&self) -> Range<u64> {
        self.offset .. self.offset + self.size
    }
}

/// A section of the output.
#[derive(Debug, PartialEq, Clone)]
pub struct Section {
    /// The name of the section.
    pub name: String,
    /// The kind of section.
    pub kind: SectionKind,
    /// The attribute flags of the section.
    pub flags: SectionFlags,
    /// The address of the section, assigned once sections are laid out.
    pub address: Option<BigInt>,
    /// The bytes of the section (empty for NOBITS sections).
    pub content: Vec<u8>,
    /// The size of a NOBITS section.
    pub nobits_size: u64,
    /// The largest alignment requested in this section.
    pub alignment: u64,
    /// Ranges of content still to be filled in.
    pub reservations: Vec<Reservation>,
}
impl Section {
    /// Creates a new, empty section.
    pub fn new(name: impl Into<String>, kind: SectionKind, flags: SectionFlags) -> Self {
        Self {
            name: name.into(),
            kind,
            flags,
            address: None,
            content: vec![],
            nobits_size: 0,
            alignment: 1,
            reservations: vec![],
        }
    }

    /// The size of the section, which is also the offset where the next byte goes.
    pub fn size(&self) -> u64 {
        match self.kind {
            SectionKind::Nobits => self.nobits_size,
            _ => self.content.len() as u64,
        }
    }

    /// Whether this section is NOBITS.
    pub fn is_nobits(&self) -> bool {
        self.kind == SectionKind::Nobits
    }

    /// The address range of the section (if it has been placed).
    pub fn address_range(&self) -> Option<Range<BigInt>> {
        let start = self.address.clone()?;
        let end = &start + self.size();
        Some(start..end)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::{Section, SectionFlags, SectionKind};

    #[test]
    fn test_flags() {
        assert_eq!(SectionFlags::parse("ax"), Some(SectionFlags::ALLOC | SectionFlags::EXEC));
        assert_eq!(SectionFlags::parse(""), Some(SectionFlags::NONE));
        assert_eq!(SectionFlags::parse("aq"), None);
        assert_eq!((SectionFlags::WRITE | SectionFlags::ALLOC).to_string(), "aw");

        assert_eq!(SectionFlags::defaults_for(".bss").0, SectionKind::Nobits);
        assert_eq!(SectionFlags::defaults_for(".text.startup").1, SectionFlags::ALLOC | SectionFlags::EXEC);
        assert_eq!(SectionFlags::defaults_for(".textual").0, SectionKind::Progbits);
        assert_eq!(SectionFlags::defaults_for(".textual").1, SectionFlags::NONE);
    }

    #[test]
    fn test_size() {
        let mut s = Section::new(".bss", SectionKind::Nobits, SectionFlags::ALLOC);
        s.nobits_size = 12;
        assert_eq!(s.size(), 12);
        assert_eq!(s.address_range(), None);

        s.address = Some(BigInt::from(0x100));
        assert_eq!(s.address_range(), Some(BigInt::from(0x100)..BigInt::from(0x10C)));
    }
}
