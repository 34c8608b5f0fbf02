//! Serializers which turn assembled sections into output bytes.
//!
//! The [`ObjWriter`] trait describes an implementation of serializing a [`CodeGen`].
//! This module provides two implementations of the trait:
//! - [`FlatBinary`]: A memory image of every allocated section
//! - [`TextFormat`]: A human-readable listing of sections, contents, and symbols

use std::borrow::Cow;

use num_bigint::BigInt;
use num_traits::ToPrimitive;

use super::codegen::CodeGen;
use super::section::{Section, SectionFlags, SectionKind};
use super::symbol::SymbolValue;

/// Serializes the result of assembling.
pub trait ObjWriter {
    /// Serializes the sections and symbols of a code generator.
    ///
    /// This is only called once every section has an address and every reservation is filled.
    fn serialize(&self, codegen: &CodeGen) -> Result<Vec<u8>, WriteErr>;
}

/// Errors from serializing.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum WriteErr {
    /// A section still has unfilled reservations.
    Pending {
        /// The section.
        section: String,
        /// The number of unfilled reservations.
        count: usize,
    },
    /// A section has no address.
    Unplaced(String),
    /// A section's address cannot be represented in the output.
    InvalidAddress(String),
    /// The output would not fit in memory.
    ImageTooLarge,
    /// Formatting failed.
    Format,
}
impl std::fmt::Display for WriteErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteErr::Pending { section, count } => write!(f, "section {section} has {count} unfilled reservation(s)"),
            WriteErr::Unplaced(name) => write!(f, "section {name} has no address"),
            WriteErr::InvalidAddress(addr) => write!(f, "address {addr} cannot be written"),
            WriteErr::ImageTooLarge => f.write_str("output image is too large"),
            WriteErr::Format => f.write_str("could not format output"),
        }
    }
}
impl std::error::Error for WriteErr {}
impl crate::err::Error for WriteErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            WriteErr::InvalidAddress(_) => Some("flat images only hold sections at nonnegative 64-bit addresses".into()),
            WriteErr::ImageTooLarge => Some("sections which are far apart produce a large image; try placing them closer".into()),
            _ => None,
        }
    }
}

fn check_filled(s: &Section) -> Result<(), WriteErr> {
    match s.reservations.len() {
        0 => Ok(()),
        count => Err(WriteErr::Pending { section: s.name.clone(), count }),
    }
}

// FLAT!
/// A memory image of every allocated PROGBITS section.
///
/// The image starts at the lowest section address.
/// Gaps between sections are set to `fill`.
/// NOBITS sections and sections without the `a` flag are left out.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct FlatBinary {
    /// The value of bytes between sections.
    pub fill: u8,
}
impl ObjWriter for FlatBinary {
    fn serialize(&self, codegen: &CodeGen) -> Result<Vec<u8>, WriteErr> {
        let mut parts = vec![];
        for s in codegen.sections() {
            if s.kind != SectionKind::Progbits || !s.flags.contains(SectionFlags::ALLOC) || s.content.is_empty() {
                continue;
            }
            check_filled(s)?;

            let addr = s.address.as_ref().ok_or_else(|| WriteErr::Unplaced(s.name.clone()))?;
            let addr = addr.to_u64().ok_or_else(|| WriteErr::InvalidAddress(addr.to_string()))?;
            parts.push((addr, s.content.as_slice()));
        }
        parts.sort_by_key(|&(addr, _)| addr);

        let Some(&(base, _)) = parts.first() else { return Ok(vec![]) };
        let end = parts.iter()
            .map(|&(addr, content)| BigInt::from(addr) + content.len())
            .max()
            .unwrap_or_else(|| BigInt::from(base));
        let len = (end - base).to_usize().ok_or(WriteErr::ImageTooLarge)?;

        let mut image = vec![self.fill; len];
        for (addr, content) in parts {
            let start = (addr - base) as usize;
            image[start..start + content.len()].copy_from_slice(content);
        }
        Ok(image)
    }
}

// TEXT!
/// A human-readable listing of sections, their contents, and symbols.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub struct TextFormat;

const TFMT_MAGIC: &str = "SECTASM LISTING";
const TFMT_UNINIT: &str = "??";
const TFMT_ROW: usize = 16;
const TABLE_DIV: &str = " | ";

fn hex_addr(addr: Option<&BigInt>, offset: u64) -> String {
    match addr {
        Some(a) => format!("{:08X}", a + offset),
        None => format!("+{offset:07X}"),
    }
}

impl ObjWriter for TextFormat {
    fn serialize(&self, codegen: &CodeGen) -> Result<Vec<u8>, WriteErr> {
        // Text format specification.
        //
        // ```text
        // SECTASM LISTING
        //
        // .SECTIONS
        // INDEX | NAME | KIND | FLAGS | ADDR | SIZE | ALIGN
        // 1 | .text | PROGBITS | ax | 00001000 | 7 | 1
        // ...
        //
        // .CONTENT .text
        // 00001000 | E9 01 00 00 00 90 90
        // ...
        //
        // .SYMBOLS
        // VALUE | SIZE | TYPE | BIND | SECTION | NAME
        // 00001000 | 0 | FUNC | GLOBAL | .text | main
        // ...
        // ```
        //
        // The NULL section is listed only if it holds anything.
        // Bytes of unfilled reservations are printed as ??.
        fn _ser(cg: &CodeGen) -> Result<String, std::fmt::Error> {
            use std::fmt::Write;
            let mut buf = String::new();

            let listed: Vec<_> = cg.sections().iter()
                .enumerate()
                .filter(|(i, s)| *i != 0 || s.size() > 0)
                .collect();

            writeln!(buf, "{TFMT_MAGIC}")?;
            writeln!(buf)?;

            writeln!(buf, ".SECTIONS")?;
            writeln!(buf, "INDEX{0}NAME{0}KIND{0}FLAGS{0}ADDR{0}SIZE{0}ALIGN", TABLE_DIV)?;
            for &(i, s) in &listed {
                let addr = s.address.as_ref().map_or_else(|| "????????".to_string(), |a| format!("{a:08X}"));
                writeln!(buf, "{i}{0}{1}{0}{2}{0}{3}{0}{addr}{0}{4}{0}{5}", TABLE_DIV, s.name, s.kind, s.flags, s.size(), s.alignment)?;
            }
            writeln!(buf)?;

            for &(_, s) in &listed {
                if s.content.is_empty() { continue; }

                writeln!(buf, ".CONTENT {}", s.name)?;
                for (row, chunk) in s.content.chunks(TFMT_ROW).enumerate() {
                    let start = (row * TFMT_ROW) as u64;
                    write!(buf, "{}{TABLE_DIV}", hex_addr(s.address.as_ref(), start))?;

                    for (i, byte) in chunk.iter().enumerate() {
                        let offset = start + i as u64;
                        if i != 0 { buf.push(' '); }
                        match s.reservations.iter().any(|r| r.range().contains(&offset)) {
                            true  => write!(buf, "{TFMT_UNINIT}")?,
                            false => write!(buf, "{byte:02X}")?,
                        }
                    }
                    writeln!(buf)?;
                }
                writeln!(buf)?;
            }

            writeln!(buf, ".SYMBOLS")?;
            if !cg.symbols().is_empty() {
                writeln!(buf, "VALUE{0}SIZE{0}TYPE{0}BIND{0}SECTION{0}NAME", TABLE_DIV)?;
                for sym in cg.symbols().iter() {
                    let value = match (sym.defined, cg.symbol_value(sym)) {
                        (true, Some(v)) => format!("{v:08X}"),
                        _ => "UNDEF".to_string(),
                    };
                    let size = sym.size.clone().unwrap_or_default();
                    let section = match sym.value {
                        SymbolValue::Abs(_) => "ABS",
                        SymbolValue::Label(_) => cg.section(sym.section).name.as_str(),
                    };
                    writeln!(buf, "{value}{0}{size}{0}{1}{0}{2}{0}{section}{0}{3}", TABLE_DIV, sym.ty, sym.binding, sym.name)?;
                }
            }

            Ok(buf)
        }

        for s in codegen.sections() {
            if s.address.is_none() {
                return Err(WriteErr::Unplaced(s.name.clone()));
            }
        }
        _ser(codegen)
            .map(String::into_bytes)
            .map_err(|_| WriteErr::Format)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::{FlatBinary, ObjWriter, TextFormat, WriteErr};
    use crate::asm::codegen::CodeGen;
    use crate::asm::layout::SequentialLayout;
    use crate::asm::section::{DataKind, LateInit, SectionFlags, SectionKind};
    use crate::ast::directive::AssignKind;
    use crate::eval::tests::expr;

    fn section(cg: &mut CodeGen, name: &str, bytes: &[u8]) {
        let (kind, flags) = SectionFlags::defaults_for(name);
        cg.get_or_create_section_and_set_current(name, kind, flags);
        match kind {
            SectionKind::Nobits => cg.pad(bytes.len() as u64, None).unwrap(),
            _ => cg.emit(bytes).unwrap(),
        }
    }

    fn place(cg: &mut CodeGen, base: u32) {
        cg.order_sections_and_resolve_addresses(&SequentialLayout { base: BigInt::from(base), align: 1 }).unwrap();
    }

    #[test]
    fn test_flat_binary() {
        let mut cg = CodeGen::new();
        section(&mut cg, ".text", &[1, 2]);
        section(&mut cg, ".bss", &[0; 4]);
        section(&mut cg, ".comment", b"unallocated");
        section(&mut cg, ".data", &[]);
        cg.align(8, None, None).unwrap();
        cg.emit(&[3]).unwrap();
        place(&mut cg, 0x100);

        let image = FlatBinary { fill: 0xFF }.serialize(&cg).unwrap();
        // .text at 0x100, .data at 0x118
        let mut expected = vec![1, 2];
        expected.extend([0xFF; 0x118 - 0x102]);
        expected.push(3);
        assert_eq!(image, expected);
        assert_eq!(FlatBinary::default().serialize(&CodeGen::new()), Ok(vec![]));
    }

    #[test]
    fn test_flat_binary_errors() {
        let mut cg = CodeGen::new();
        section(&mut cg, ".text", &[1]);
        assert_eq!(FlatBinary::default().serialize(&cg), Err(WriteErr::Unplaced(".text".into())));

        let text = cg.current();
        let late = LateInit::Data { file: std::path::Path::new("t.s").into(), expr: expr("x"), kind: DataKind::Int(2) };
        cg.queue_late_init(text, late, 2);
        place(&mut cg, 0);
        assert_eq!(FlatBinary::default().serialize(&cg), Err(WriteErr::Pending { section: ".text".into(), count: 1 }));
    }

    #[test]
    fn test_text_format() {
        let mut cg = CodeGen::new();
        let text = cg.get_or_create_section_and_set_current(".text", SectionKind::Progbits, SectionFlags::ALLOC | SectionFlags::EXEC);
        cg.define_label("start").unwrap();
        cg.emit(&[0x90, 0x90]).unwrap();
        let late = LateInit::Data { file: std::path::Path::new("t.s").into(), expr: expr("later"), kind: DataKind::Int(2) };
        cg.queue_late_init(text, late, 2);
        cg.assign_symbol("k", BigInt::from(5), AssignKind::Set).unwrap();
        place(&mut cg, 0x100);

        let listing = String::from_utf8(TextFormat.serialize(&cg).unwrap()).unwrap();
        let expected = "\
SECTASM LISTING

.SECTIONS
INDEX | NAME | KIND | FLAGS | ADDR | SIZE | ALIGN
1 | .text | PROGBITS | ax | 00000100 | 4 | 1

.CONTENT .text
00000100 | 90 90 ?? ??

.SYMBOLS
VALUE | SIZE | TYPE | BIND | SECTION | NAME
00000100 | 0 | NOTYPE | LOCAL | .text | start
00000005 | 0 | NOTYPE | LOCAL | ABS | k
";
        assert_eq!(listing, expected);
    }
}
