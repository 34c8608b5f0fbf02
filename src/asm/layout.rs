//! Section layout strategies.
//!
//! A [`Layout`] assigns every section an address. This module provides:
//! - [`SequentialLayout`]: places sections one after another, in creation order,
//! - [`ScriptLayout`]: places sections in a given order, optionally at fixed addresses.

use std::borrow::Cow;

use num_bigint::BigInt;
use num_traits::Zero;

use super::section::Section;

/// Assigns addresses to sections.
pub trait Layout {
    /// Sets the `address` of every section.
    fn place(&self, sections: &mut [Section]) -> Result<(), LayoutErr>;
}

/// Errors from laying out sections.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum LayoutErr {
    /// Two sections occupy some of the same addresses.
    Overlap {
        /// The section placed at the lower address.
        first: String,
        /// The other section.
        second: String,
    },
    /// A layout did not assign an address to this section.
    Unplaced(String),
    /// An alignment is not a power of two.
    InvalidAlignment(u64),
}
impl std::fmt::Display for LayoutErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayoutErr::Overlap { first, second } => write!(f, "sections {first} and {second} overlap"),
            LayoutErr::Unplaced(name) => write!(f, "section {name} was not given an address"),
            LayoutErr::InvalidAlignment(n) => write!(f, "layout alignment {n} is not a power of two"),
        }
    }
}
impl std::error::Error for LayoutErr {}
impl crate::err::Error for LayoutErr {
    fn help(&self) -> Option<Cow<str>> {
        match self {
            LayoutErr::Overlap { .. } => Some("move the start address of one of these sections".into()),
            _ => None,
        }
    }
}

fn align_up(n: &BigInt, align: u64) -> BigInt {
    let align = BigInt::from(align.max(1));
    let rem = n % &align;
    match rem.is_zero() {
        true => n.clone(),
        false => n + (align - rem),
    }
}

/// Checks that no two non-empty sections overlap.
pub fn check_overlaps(sections: &[Section]) -> Result<(), LayoutErr> {
    let mut ranges: Vec<_> = sections.iter()
        .filter(|s| s.size() > 0)
        .map(|s| s.address_range().map(|r| (r, &s.name)).ok_or_else(|| LayoutErr::Unplaced(s.name.clone())))
        .collect::<Result<_, _>>()?;
    ranges.sort_by(|(a, _), (b, _)| a.start.cmp(&b.start));

    for w in ranges.windows(2) {
        let [(r0, n0), (r1, n1)] = w else { continue };
        if r1.start < r0.end {
            return Err(LayoutErr::Overlap { first: n0.to_string(), second: n1.to_string() });
        }
    }
    Ok(())
}

/// Places every section right after the previous one, starting from `base`.
///
/// Each section starts at a multiple of both its own alignment and `align`.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct SequentialLayout {
    /// The address of the first section.
    pub base: BigInt,
    /// The minimum alignment of every section.
    pub align: u64,
}
impl Default for SequentialLayout {
    fn default() -> Self {
        Self { base: BigInt::from(0), align: 1 }
    }
}
impl Layout for SequentialLayout {
    fn place(&self, sections: &mut [Section]) -> Result<(), LayoutErr> {
        if !self.align.is_power_of_two() {
            return Err(LayoutErr::InvalidAlignment(self.align));
        }

        let mut cursor = self.base.clone();
        for s in sections {
            let start = align_up(&cursor, s.alignment.max(self.align));
            cursor = &start + s.size();
            s.address = Some(start);
        }
        Ok(())
    }
}

/// Where a section goes, in a [`ScriptLayout`].
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Placement {
    /// The section name.
    pub section: String,
    /// A fixed address for the section.
    ///
    /// If `None`, the section is placed after the previous one.
    pub address: Option<BigInt>,
}
impl Placement {
    /// A section placed after the previous one.
    pub fn after(section: impl Into<String>) -> Self {
        Self { section: section.into(), address: None }
    }

    /// A section placed at a fixed address.
    pub fn at(section: impl Into<String>, address: impl Into<BigInt>) -> Self {
        Self { section: section.into(), address: Some(address.into()) }
    }
}

/// Places sections by a list of placements (like a linker script).
///
/// Placements for sections which do not exist are skipped.
/// Sections without a placement are placed after the last placed section, in creation order.
/// Overlapping sections are an error.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Default)]
pub struct ScriptLayout {
    /// The placements, in order.
    pub placements: Vec<Placement>,
}
impl Layout for ScriptLayout {
    fn place(&self, sections: &mut [Section]) -> Result<(), LayoutErr> {
        fn place_at(s: &mut Section, fixed: Option<&BigInt>, cursor: &mut BigInt) {
            let start = match fixed {
                Some(addr) => addr.clone(),
                None => align_up(cursor, s.alignment),
            };
            *cursor = &start + s.size();
            s.address = Some(start);
        }

        let mut placed = vec![false; sections.len()];
        let mut cursor = BigInt::from(0);
        for p in &self.placements {
            let Some(i) = sections.iter().position(|s| s.name == p.section) else { continue };
            place_at(&mut sections[i], p.address.as_ref(), &mut cursor);
            placed[i] = true;
        }
        for (i, s) in sections.iter_mut().enumerate() {
            if !placed[i] {
                place_at(s, None, &mut cursor);
            }
        }

        check_overlaps(sections)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;

    use super::{Layout, LayoutErr, Placement, ScriptLayout, SequentialLayout};
    use crate::asm::section::{Section, SectionFlags, SectionKind};

    fn section(name: &str, size: usize, alignment: u64) -> Section {
        let mut s = Section::new(name, SectionKind::Progbits, SectionFlags::ALLOC);
        s.content = vec![0; size];
        s.alignment = alignment;
        s
    }

    fn addresses(sections: &[Section]) -> Vec<Option<BigInt>> {
        sections.iter().map(|s| s.address.clone()).collect()
    }

    #[test]
    fn test_sequential() {
        let mut sections = vec![section("", 0, 1), section(".text", 5, 1), section(".data", 3, 8), section(".x", 1, 1)];
        let layout = SequentialLayout { base: BigInt::from(0x1000), align: 2 };
        layout.place(&mut sections).unwrap();

        let expected = [0x1000, 0x1000, 0x1008, 0x100C].map(|n| Some(BigInt::from(n)));
        assert_eq!(addresses(&sections), expected);

        let bad = SequentialLayout { base: BigInt::from(0), align: 3 };
        assert_eq!(bad.place(&mut sections), Err(LayoutErr::InvalidAlignment(3)));
    }

    #[test]
    fn test_script() {
        let mut sections = vec![section("", 0, 1), section(".text", 4, 1), section(".data", 2, 4), section(".rodata", 2, 1)];
        let layout = ScriptLayout {
            placements: vec![
                Placement::at(".data", 0x2000),
                Placement::after(".rodata"),
                Placement::at(".text", 0x100),
                Placement::after(".missing"),
            ],
        };
        layout.place(&mut sections).unwrap();

        let expected = [0x104, 0x100, 0x2000, 0x2002].map(|n| Some(BigInt::from(n)));
        assert_eq!(addresses(&sections), expected);
    }

    #[test]
    fn test_script_overlap() {
        let mut sections = vec![section(".text", 0x10, 1), section(".data", 4, 1)];
        let layout = ScriptLayout {
            placements: vec![Placement::at(".text", 0x100), Placement::at(".data", 0x108)],
        };
        assert_eq!(
            layout.place(&mut sections),
            Err(LayoutErr::Overlap { first: ".text".into(), second: ".data".into() })
        );
    }
}
