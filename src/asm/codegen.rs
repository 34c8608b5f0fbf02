//! The code generator: sections, symbols, and late-init reservations.

use std::path::Path;
use std::sync::Arc;

use num_bigint::BigInt;

use super::layout::{Layout, LayoutErr};
use super::section::{LateInit, Reservation, Section, SectionFlags, SectionId, SectionKind};
use super::symbol::{Binding, Symbol, SymbolTable, SymbolType, SymbolValue};
use super::AsmErrKind;
use crate::ast::directive::AssignKind;
use crate::ast::Expr;

/// A `.size` whose value could not be computed in pass 1.
#[derive(Debug, PartialEq, Clone)]
pub struct DeferredSize {
    /// The symbol.
    pub name: String,
    /// The size expression.
    pub expr: Expr,
    /// The file of the `.size` directive.
    pub file: Arc<Path>,
    /// The section the directive was in.
    pub section: SectionId,
    /// The offset the directive was at.
    pub offset: u64,
}

/// Holds everything the assembler produces: sections with their content,
/// the symbol table, and the work deferred until addresses are known.
#[derive(Debug, PartialEq, Clone)]
pub struct CodeGen {
    sections: Vec<Section>,
    symbols: SymbolTable,
    current: SectionId,
    order: Vec<SectionId>,
    deferred_sizes: Vec<DeferredSize>,
}
impl Default for CodeGen {
    fn default() -> Self {
        Self::new()
    }
}
impl CodeGen {
    /// Creates a code generator with only the NULL section, which is also the current section.
    pub fn new() -> Self {
        Self {
            sections: vec![Section::new("", SectionKind::Null, SectionFlags::NONE)],
            symbols: SymbolTable::new(),
            current: SectionId::NULL,
            order: vec![],
            deferred_sizes: vec![],
        }
    }

    /// All sections, by [`SectionId`].
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Gets a section.
    pub fn section(&self, id: SectionId) -> &Section {
        &self.sections[id.0]
    }

    /// Gets a section (mutably).
    pub fn section_mut(&mut self, id: SectionId) -> &mut Section {
        &mut self.sections[id.0]
    }

    /// Finds a section by name.
    pub fn find_section(&self, name: &str) -> Option<SectionId> {
        self.sections.iter()
            .position(|s| s.kind != SectionKind::Null && s.name == name)
            .map(SectionId)
    }

    /// The section content is currently written to.
    pub fn current(&self) -> SectionId {
        self.current
    }

    /// Sets the section content is written to.
    pub fn set_current(&mut self, id: SectionId) {
        if self.current != id {
            tracing::trace!(section = %self.sections[id.0].name, "switching section");
        }
        self.current = id;
    }

    /// The symbol table.
    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// The section order decided by the layout (by address).
    ///
    /// This is empty until [`CodeGen::order_sections_and_resolve_addresses`] is called.
    pub fn section_order(&self) -> &[SectionId] {
        &self.order
    }

    /// Gets the section with the given name, creating it if it does not exist.
    ///
    /// The kind and flags only apply to newly created sections.
    /// This does not change the current section.
    pub fn get_or_create_section(&mut self, name: &str, kind: SectionKind, flags: SectionFlags) -> SectionId {
        if let Some(id) = self.find_section(name) {
            return id;
        }
        tracing::trace!(section = name, %kind, %flags, "creating section");
        self.sections.push(Section::new(name, kind, flags));
        SectionId(self.sections.len() - 1)
    }

    /// Gets or creates a section (see [`CodeGen::get_or_create_section`]) and makes it the current section.
    pub fn get_or_create_section_and_set_current(&mut self, name: &str, kind: SectionKind, flags: SectionFlags) -> SectionId {
        let id = self.get_or_create_section(name, kind, flags);
        self.set_current(id);
        id
    }

    /// The offset in the current section where the next byte goes.
    pub fn offset(&self) -> u64 {
        self.section(self.current).size()
    }

    /// Writes bytes into the current section.
    pub fn emit(&mut self, bytes: &[u8]) -> Result<(), AsmErrKind> {
        let section = self.section_mut(self.current);
        if section.is_nobits() {
            return Err(AsmErrKind::NobitsData);
        }
        section.content.extend_from_slice(bytes);
        Ok(())
    }

    /// Extends the current section by `n` bytes.
    ///
    /// If `fill` is given, the bytes are set to that value (zero otherwise).
    /// NOBITS sections only hold zeroes, so they reject a nonzero fill value.
    pub fn pad(&mut self, n: u64, fill: Option<u8>) -> Result<(), AsmErrKind> {
        let section = self.section_mut(self.current);
        match (section.is_nobits(), fill) {
            (true, Some(f)) if f != 0 => return Err(AsmErrKind::NobitsData),
            (true, _) => section.nobits_size += n,
            (false, fill) => {
                let len = usize::try_from(section.size() + n).map_err(|_| AsmErrKind::SectionTooLarge)?;
                section.content.resize(len, fill.unwrap_or(0));
            },
        }
        Ok(())
    }

    /// Pads the current section to a multiple of `boundary` (a power of two).
    ///
    /// If the padding would be larger than `max_skip`, nothing is padded.
    /// This returns the number of bytes padded.
    pub fn align(&mut self, boundary: u64, fill: Option<u8>, max_skip: Option<u64>) -> Result<u64, AsmErrKind> {
        let offset = self.offset();
        let padding = (boundary - offset % boundary) % boundary;
        if max_skip.is_some_and(|m| padding > m) {
            return Ok(0);
        }

        let section = self.section_mut(self.current);
        section.alignment = section.alignment.max(boundary);
        self.pad(padding, fill)?;
        Ok(padding)
    }

    /// Reserves `estimated_size` bytes at the end of a section, to be filled in by `item` in pass 2.
    ///
    /// The reservation starts at the section's current size. Its bytes are zero until filled.
    pub fn queue_late_init(&mut self, section: SectionId, item: LateInit, estimated_size: u64) {
        let s = self.section_mut(section);
        let offset = s.size();
        tracing::trace!(section = %s.name, offset, size = estimated_size, "reserving");

        match s.is_nobits() {
            true => s.nobits_size += estimated_size,
            false => {
                let len = s.content.len() + estimated_size as usize;
                s.content.resize(len, 0);
            },
        }
        s.reservations.push(Reservation { item, offset, size: estimated_size });
    }

    /// The number of reservations which are not filled yet.
    pub fn reservation_count(&self) -> usize {
        self.sections.iter().map(|s| s.reservations.len()).sum()
    }

    /// Assigns every section an address through `layout` and orders the sections by address.
    ///
    /// After this, the address of every label is known.
    pub fn order_sections_and_resolve_addresses(&mut self, layout: &dyn Layout) -> Result<(), LayoutErr> {
        layout.place(&mut self.sections)?;

        let mut order = Vec::with_capacity(self.sections.len());
        for (i, s) in self.sections.iter().enumerate() {
            if s.address.is_none() {
                return Err(LayoutErr::Unplaced(s.name.clone()));
            }
            order.push(SectionId(i));
        }
        order.sort_by(|a, b| self.sections[a.0].address.cmp(&self.sections[b.0].address).then(a.cmp(b)));
        self.order = order;

        tracing::debug!(sections = self.sections.len(), "resolved section addresses");
        Ok(())
    }

    /// The value of a symbol (its address, for labels).
    ///
    /// This returns `None` for labels in sections which have not been placed.
    pub fn symbol_value(&self, sym: &Symbol) -> Option<BigInt> {
        match &sym.value {
            SymbolValue::Abs(v) => Some(v.clone()),
            SymbolValue::Label(offset) => self.section(sym.section).address.as_ref().map(|a| a + offset),
        }
    }

    /// Defines a label at the current offset of the current section.
    ///
    /// Each section can define a name once, and absolute names cannot become labels.
    /// A placeholder for the name becomes this label.
    pub fn define_label(&mut self, name: &str) -> Result<(), AsmErrKind> {
        let (section, offset) = (self.current, self.offset());
        if let Some(from) = self.symbols.placeholder(name).map(|s| s.section) {
            if self.symbols.get_in(name, section).is_none() {
                self.symbols.move_to(name, from, section);
            }
        }

        let absolute = self.symbols.get_in(name, SectionId::NULL)
            .is_some_and(|s| s.defined && matches!(s.value, SymbolValue::Abs(_)));
        match self.symbols.get_in_mut(name, section) {
            Some(sym) if !sym.defined => {
                sym.value = SymbolValue::Label(offset);
                sym.defined = true;
                Ok(())
            },
            Some(_) => Err(AsmErrKind::Redefinition(name.to_string())),
            None if absolute => Err(AsmErrKind::Redefinition(name.to_string())),
            None => {
                let _ = self.symbols.insert(Symbol::new(name, section, SymbolValue::Label(offset)));
                Ok(())
            },
        }
    }

    /// Defines (or redefines) an absolute symbol.
    ///
    /// Absolute symbols live in the NULL section, and a name which is a label in any section cannot be assigned.
    /// Only [`AssignKind::Set`] can redefine a name, and only an absolute symbol.
    pub fn assign_symbol(&mut self, name: &str, value: BigInt, kind: AssignKind) -> Result<(), AsmErrKind> {
        let taken = self.symbols.resolve(name, SectionId::NULL).is_some_and(|s| s.defined);
        match self.symbols.get_in_mut(name, SectionId::NULL) {
            Some(sym) if !sym.defined => {
                sym.value = SymbolValue::Abs(value);
                sym.defined = true;
                Ok(())
            },
            Some(sym) if kind.allows_redefinition() && matches!(sym.value, SymbolValue::Abs(_)) => {
                sym.value = SymbolValue::Abs(value);
                Ok(())
            },
            None if !taken => {
                let _ = self.symbols.insert(Symbol::new(name, SectionId::NULL, SymbolValue::Abs(value)));
                Ok(())
            },
            _ => Err(AsmErrKind::Redefinition(name.to_string())),
        }
    }

    /// Sets the binding of a symbol (which may not be defined yet), as seen from the current section.
    pub fn declare_binding(&mut self, name: &str, binding: Binding) {
        self.symbols.declare(name, self.current).binding = binding;
    }

    /// Sets the type of a symbol (which may not be defined yet), as seen from the current section.
    pub fn set_symbol_type(&mut self, name: &str, ty: SymbolType) {
        self.symbols.declare(name, self.current).ty = ty;
    }

    /// Sets the size of a symbol (which may not be defined yet), as seen from `section`.
    pub fn set_symbol_size(&mut self, name: &str, section: SectionId, size: BigInt) {
        self.symbols.declare(name, section).size = Some(size);
    }

    /// Queues a `.size` to be computed once addresses are known.
    pub fn defer_size(&mut self, deferred: DeferredSize) {
        self.deferred_sizes.push(deferred);
    }

    /// Takes all deferred `.size` directives.
    pub fn take_deferred_sizes(&mut self) -> Vec<DeferredSize> {
        std::mem::take(&mut self.deferred_sizes)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigInt;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::CodeGen;
    use crate::asm::layout::SequentialLayout;
    use crate::asm::section::{DataKind, LateInit, SectionFlags, SectionId, SectionKind};
    use crate::asm::symbol::{Binding, SymbolType, SymbolValue};
    use crate::asm::AsmErrKind;
    use crate::ast::directive::AssignKind;
    use crate::eval::tests::expr;

    fn late(n: u8) -> LateInit {
        LateInit::Data { file: std::path::Path::new("t.s").into(), expr: expr(&n.to_string()), kind: DataKind::Int(1) }
    }

    #[test]
    fn test_sections() {
        let mut cg = CodeGen::new();
        assert_eq!(cg.current(), SectionId::NULL);

        let text = cg.get_or_create_section(".text", SectionKind::Progbits, SectionFlags::ALLOC);
        assert_eq!(cg.current(), SectionId::NULL);
        assert_eq!(cg.get_or_create_section(".text", SectionKind::Nobits, SectionFlags::NONE), text);
        assert_eq!(cg.section(text).kind, SectionKind::Progbits);

        let bss = cg.get_or_create_section_and_set_current(".bss", SectionKind::Nobits, SectionFlags::ALLOC);
        assert_eq!(cg.current(), bss);
        assert_eq!(cg.emit(&[1]), Err(AsmErrKind::NobitsData));
        assert_eq!(cg.pad(4, Some(1)), Err(AsmErrKind::NobitsData));
        cg.pad(4, None).unwrap();
        cg.pad(2, Some(0)).unwrap();
        assert_eq!(cg.section(bss).size(), 6);
        assert!(cg.section(bss).content.is_empty());
    }

    #[test]
    fn test_align() {
        let mut cg = CodeGen::new();
        cg.get_or_create_section_and_set_current(".data", SectionKind::Progbits, SectionFlags::ALLOC);
        cg.emit(&[1, 2, 3]).unwrap();

        assert_eq!(cg.align(4, Some(0xFF), None), Ok(1));
        assert_eq!(cg.align(4, None, None), Ok(0));
        assert_eq!(cg.align(16, None, Some(4)), Ok(0));
        assert_eq!(cg.align(8, None, Some(4)), Ok(4));
        assert_eq!(cg.section(cg.current()).content, [1, 2, 3, 0xFF, 0, 0, 0, 0]);
        assert_eq!(cg.section(cg.current()).alignment, 8);
    }

    #[test]
    fn test_reservation_offsets() {
        // Reservations never move, no matter what is written after them.
        let mut rng = StdRng::seed_from_u64(0x5EC7);
        let mut cg = CodeGen::new();
        let id = cg.get_or_create_section_and_set_current(".text", SectionKind::Progbits, SectionFlags::ALLOC);

        let mut expected = vec![];
        for _ in 0..200 {
            match rng.gen_range(0..3) {
                0 => {
                    let size = rng.gen_range(0..8);
                    expected.push((cg.offset(), size));
                    cg.queue_late_init(id, late(0), size);
                },
                1 => cg.emit(&vec![0xAA; rng.gen_range(0..5)]).unwrap(),
                _ => { cg.align(1 << rng.gen_range(0..4), None, None).unwrap(); },
            }
        }

        let found: Vec<_> = cg.section(id).reservations.iter().map(|r| (r.offset, r.size)).collect();
        assert_eq!(found, expected);
        assert_eq!(cg.reservation_count(), expected.len());
        for (offset, size) in expected {
            let range = offset as usize .. (offset + size) as usize;
            assert!(cg.section(id).content[range].iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn test_symbols() {
        let mut cg = CodeGen::new();
        cg.declare_binding("start", Binding::Global);
        assert!(!cg.symbols().get("start").unwrap().defined);

        let text = cg.get_or_create_section_and_set_current(".text", SectionKind::Progbits, SectionFlags::ALLOC);
        cg.emit(&[0; 6]).unwrap();
        cg.define_label("start").unwrap();
        let sym = cg.symbols().get_in("start", text).unwrap();
        assert_eq!((sym.value.clone(), sym.binding, sym.defined), (SymbolValue::Label(6), Binding::Global, true));
        assert_eq!(cg.define_label("start"), Err(AsmErrKind::Redefinition("start".into())));

        cg.assign_symbol("k", BigInt::from(1), AssignKind::Set).unwrap();
        cg.assign_symbol("k", BigInt::from(2), AssignKind::Set).unwrap();
        assert_eq!(cg.symbols().get("k").unwrap().value, SymbolValue::Abs(BigInt::from(2)));
        assert!(cg.assign_symbol("k", BigInt::from(3), AssignKind::Equ).is_err());
        assert!(cg.assign_symbol("start", BigInt::from(3), AssignKind::Set).is_err());

        cg.order_sections_and_resolve_addresses(&SequentialLayout { base: BigInt::from(0x40), align: 1 }).unwrap();
        let sym = cg.symbols().get("start").unwrap();
        assert_eq!(cg.symbol_value(sym), Some(BigInt::from(0x46)));
    }

    #[test]
    fn test_symbols_per_section() {
        let mut cg = CodeGen::new();
        let text = cg.get_or_create_section_and_set_current(".text", SectionKind::Progbits, SectionFlags::ALLOC);
        cg.emit(&[0; 2]).unwrap();
        cg.define_label("x").unwrap();
        cg.set_symbol_type("x", SymbolType::Func);

        let data = cg.get_or_create_section_and_set_current(".data", SectionKind::Progbits, SectionFlags::ALLOC);
        cg.define_label("x").unwrap();
        assert_eq!(cg.define_label("x"), Err(AsmErrKind::Redefinition("x".into())));
        cg.set_symbol_size("x", data, BigInt::from(4));

        let (in_text, in_data) = (cg.symbols().get_in("x", text).unwrap(), cg.symbols().get_in("x", data).unwrap());
        assert_eq!((in_text.value.clone(), in_text.size.clone()), (SymbolValue::Label(2), None));
        assert_eq!((in_data.value.clone(), in_data.size.clone()), (SymbolValue::Label(0), Some(BigInt::from(4))));
        assert_eq!(in_data.ty, SymbolType::NoType);

        // A label in any section keeps its name from being assigned.
        assert!(cg.assign_symbol("x", BigInt::from(1), AssignKind::Equ).is_err());
        assert!(cg.assign_symbol("x", BigInt::from(1), AssignKind::Set).is_err());
        assert_eq!(cg.symbols().len(), 2);

        cg.assign_symbol("k", BigInt::from(1), AssignKind::Equ).unwrap();
        assert_eq!(cg.define_label("k"), Err(AsmErrKind::Redefinition("k".into())));
    }
}
