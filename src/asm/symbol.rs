//! The symbol table.

use std::collections::HashMap;

use num_bigint::BigInt;

use super::section::SectionId;

/// The value of a symbol.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum SymbolValue {
    /// An absolute value (from `.set`, `.equ`, `.equiv`, or `name = expr`).
    Abs(BigInt),
    /// A location: an offset into the symbol's section.
    Label(u64),
}

/// The visibility of a symbol.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum Binding {
    #[default]
    #[allow(missing_docs)]
    Local,
    #[allow(missing_docs)]
    Global,
    #[allow(missing_docs)]
    Weak,
}
impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Binding::Local => f.write_str("LOCAL"),
            Binding::Global => f.write_str("GLOBAL"),
            Binding::Weak => f.write_str("WEAK"),
        }
    }
}

/// The type of a symbol (from `.type`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
pub enum SymbolType {
    #[default]
    #[allow(missing_docs)]
    NoType,
    #[allow(missing_docs)]
    Func,
    #[allow(missing_docs)]
    Object,
}
impl SymbolType {
    /// Parses a `.type` argument (`@function`, `@object`, `@notype`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim_start_matches('@') {
            "function" => Some(SymbolType::Func),
            "object" => Some(SymbolType::Object),
            "notype" => Some(SymbolType::NoType),
            _ => None,
        }
    }
}
impl std::fmt::Display for SymbolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolType::NoType => f.write_str("NOTYPE"),
            SymbolType::Func => f.write_str("FUNC"),
            SymbolType::Object => f.write_str("OBJECT"),
        }
    }
}

/// A symbol.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Symbol {
    /// The name.
    pub name: String,
    /// The section this symbol is defined in.
    pub section: SectionId,
    /// The visibility.
    pub binding: Binding,
    /// The value.
    pub value: SymbolValue,
    /// The type.
    pub ty: SymbolType,
    /// The size (from `.size`).
    pub size: Option<BigInt>,
    /// Whether this symbol has been defined.
    ///
    /// Symbols which are only declared (e.g., through `.globl` before their label)
    /// are placeholders which get replaced by their definition.
    pub defined: bool,
}
impl Symbol {
    /// Creates a local, untyped symbol.
    pub fn new(name: impl Into<String>, section: SectionId, value: SymbolValue) -> Self {
        Self {
            name: name.into(),
            section,
            binding: Binding::Local,
            value,
            ty: SymbolType::NoType,
            size: None,
            defined: true,
        }
    }

    /// Creates a placeholder for a symbol which is not defined yet.
    pub fn declared(name: impl Into<String>) -> Self {
        Self { defined: false, ..Self::new(name, SectionId::NULL, SymbolValue::Abs(BigInt::from(0))) }
    }
}

/// All symbols of a program.
///
/// Symbols are identified by `(name, section)`, so each section can define the same name once.
/// Absolute symbols and placeholders live in the NULL section.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    by_key: HashMap<(String, SectionId), usize>,
    by_name: HashMap<String, Vec<usize>>,
}
impl SymbolTable {
    /// Creates an empty symbol table.
    pub fn new() -> Self {
        Self::default()
    }

    fn named(&self, name: &str) -> impl Iterator<Item = (usize, &Symbol)> + '_ {
        self.by_name.get(name)
            .into_iter()
            .flatten()
            .map(|&i| (i, &self.symbols[i]))
    }

    /// Looks up the first symbol created with a given name.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.named(name).next().map(|(_, s)| s)
    }

    /// Looks up a symbol by its identity.
    pub fn get_in(&self, name: &str, section: SectionId) -> Option<&Symbol> {
        self.by_key.get(&(name.to_string(), section)).map(|&i| &self.symbols[i])
    }

    /// Looks up a symbol by its identity (mutably).
    ///
    /// The section of the symbol should not be modified through this (see [`SymbolTable::move_to`]).
    pub fn get_in_mut(&mut self, name: &str, section: SectionId) -> Option<&mut Symbol> {
        self.by_key.get(&(name.to_string(), section)).map(|&i| &mut self.symbols[i])
    }

    fn resolve_index(&self, name: &str, section: SectionId) -> Option<usize> {
        let (mut first, mut first_defined) = (None, None);
        for (i, sym) in self.named(name) {
            if sym.defined && sym.section == section {
                return Some(i);
            }
            if sym.defined {
                first_defined.get_or_insert(i);
            }
            first.get_or_insert(i);
        }
        first_defined.or(first)
    }

    /// Finds the symbol a name refers to when it is used in `section`.
    ///
    /// A definition in `section` wins, then the first definition in any other section.
    /// If the name is not defined anywhere, this is its placeholder (if any).
    pub fn resolve(&self, name: &str, section: SectionId) -> Option<&Symbol> {
        self.resolve_index(name, section).map(|i| &self.symbols[i])
    }

    /// Finds the placeholder for a name, if the name has been declared but not defined.
    pub fn placeholder(&self, name: &str) -> Option<&Symbol> {
        self.named(name).map(|(_, s)| s).find(|s| !s.defined)
    }

    /// Adds a new symbol.
    ///
    /// If a symbol with the same name exists in the same section, the symbol is handed back.
    pub fn insert(&mut self, symbol: Symbol) -> Result<(), Symbol> {
        let key = (symbol.name.clone(), symbol.section);
        if self.by_key.contains_key(&key) {
            return Err(symbol);
        }
        let index = self.symbols.len();
        self.by_key.insert(key, index);
        self.by_name.entry(symbol.name.clone()).or_default().push(index);
        self.symbols.push(symbol);
        Ok(())
    }

    /// Gets the symbol a name refers to from `section` (see [`SymbolTable::resolve`]),
    /// adding a placeholder for it (see [`Symbol::declared`]) if the name is unknown.
    pub fn declare(&mut self, name: &str, section: SectionId) -> &mut Symbol {
        let index = match self.resolve_index(name, section) {
            Some(i) => i,
            None => {
                let i = self.symbols.len();
                let _ = self.insert(Symbol::declared(name));
                i
            },
        };
        &mut self.symbols[index]
    }

    /// Moves a symbol into another section.
    ///
    /// Nothing happens if there is no such symbol, or if the target section already has one of that name.
    pub fn move_to(&mut self, name: &str, from: SectionId, to: SectionId) {
        if self.by_key.contains_key(&(name.to_string(), to)) {
            return;
        }
        let Some(index) = self.by_key.remove(&(name.to_string(), from)) else { return };
        self.symbols[index].section = to;
        self.by_key.insert((name.to_string(), to), index);
    }

    /// Iterates over all symbols in the order they were created.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    /// The number of symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether there are no symbols.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
