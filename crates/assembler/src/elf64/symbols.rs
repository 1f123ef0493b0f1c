//! The symbol registry.
//!
//! Symbols are declared as the program mentions them, acquire at most one
//! definition site, and are finally classified into the three partitions the
//! symbol table is laid out from: defined locals, defined globals,
//! unresolved globals. Within a partition, first-declaration order is
//! preserved; the linker sees that order as symbol table indices.

use std::io;

use anvil_object::{
    elf64::{SectionIndex, StringTable, Symbol, SymbolBinding, SymbolType},
    ByteBuffer, Number, Write as _,
};
use anvil_parser::{Binding, DefinitionSite, Program};

use super::{
    encode::TextImage,
    layout::{DataImage, SHNDX_BSS, SHNDX_DATA, SHNDX_TEXT},
    Error,
};

/// Number of reserved symbol table entries: the null symbol and the three
/// section symbols.
pub(crate) const RESERVED_SYMBOLS: usize = 4;

/// Symbol table index of the `.data` section symbol, the target of
/// relocations against anonymous data.
pub(crate) const SYMBOL_INDEX_DATA_SECTION: u32 = 2;

/// An opaque handle to a registered symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SymbolId(usize);

/// A registered symbol.
#[derive(Debug)]
pub(crate) struct SymbolRecord {
    /// The symbol name.
    pub name: String,
    /// The strongest binding seen so far.
    pub binding: Binding,
    /// The definition site, if any. A symbol with no site is unresolved.
    pub site: Option<Site>,
}

/// Where a symbol is defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Site {
    /// At this byte offset in the instruction stream.
    Text(u64),
    /// At this byte offset in the data stream.
    Data(u64),
}

/// All symbols of one assembly, keyed by name.
#[derive(Debug, Default)]
pub(crate) struct SymbolRegistry {
    records: Vec<SymbolRecord>,
}

impl SymbolRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Declare a symbol. Declaring the same name again merges: the stronger
    /// binding wins (global over local).
    pub(crate) fn declare(&mut self, name: &str, binding: Binding) -> SymbolId {
        match self.position(name) {
            Some(id) => {
                if binding == Binding::Global {
                    self.records[id.0].binding = Binding::Global;
                }

                id
            }

            None => {
                self.records.push(SymbolRecord { name: name.to_owned(), binding, site: None });

                SymbolId(self.records.len() - 1)
            }
        }
    }

    /// Attach a definition in the instruction stream.
    pub(crate) fn define_in_text(&mut self, name: &str, address: u64) -> Result<SymbolId, Error> {
        self.define(name, Site::Text(address))
    }

    /// Attach a definition in the data stream.
    pub(crate) fn define_in_data(&mut self, name: &str, offset: u64) -> Result<SymbolId, Error> {
        self.define(name, Site::Data(offset))
    }

    fn define(&mut self, name: &str, site: Site) -> Result<SymbolId, Error> {
        let id = self.declare(name, Binding::Local);
        let record = &mut self.records[id.0];

        if record.site.is_some() {
            return Err(Error::DuplicateSymbol { name: name.to_owned() });
        }

        record.site = Some(site);

        Ok(id)
    }

    /// Look a symbol up by name.
    pub(crate) fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.position(name)
    }

    /// Fetch a registered symbol.
    pub(crate) fn record(&self, id: SymbolId) -> &SymbolRecord {
        &self.records[id.0]
    }

    /// Partition the symbols into defined locals, defined globals, and
    /// unresolved symbols, preserving declaration order within each
    /// partition.
    pub(crate) fn classify(&self) -> Partitions {
        let mut partitions = Partitions::default();

        for (index, record) in self.records.iter().enumerate() {
            let id = SymbolId(index);

            match (&record.site, record.binding) {
                (Some(_), Binding::Local) => partitions.locals.push(id),
                (Some(_), Binding::Global) => partitions.globals.push(id),
                (None, _) => partitions.unresolved.push(id),
            }
        }

        partitions
    }

    fn position(&self, name: &str) -> Option<SymbolId> {
        self.records.iter().position(|record| record.name == name).map(SymbolId)
    }
}

/// The three partitions of the symbol table, in layout order.
#[derive(Debug, Default)]
pub(crate) struct Partitions {
    pub locals: Vec<SymbolId>,
    pub globals: Vec<SymbolId>,
    pub unresolved: Vec<SymbolId>,
}

impl Partitions {
    /// The symbol table index a symbol will be laid out at.
    pub(crate) fn symbol_index(&self, id: SymbolId) -> Option<u32> {
        let position = |ids: &[SymbolId]| ids.iter().position(|candidate| *candidate == id);

        let index = if let Some(index) = position(&self.locals) {
            RESERVED_SYMBOLS + index
        } else if let Some(index) = position(&self.globals) {
            RESERVED_SYMBOLS + self.locals.len() + index
        } else if let Some(index) = position(&self.unresolved) {
            RESERVED_SYMBOLS + self.locals.len() + self.globals.len() + index
        } else {
            return None;
        };

        Some(index.try_into().expect("Failed to cast the symbol index from `usize` to `u32`"))
    }

    /// Symbols laid out, in order: locals, then globals, then unresolved.
    pub(crate) fn in_layout_order(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.locals
            .iter()
            .chain(self.globals.iter())
            .chain(self.unresolved.iter())
            .copied()
    }
}

/// Declare and define every symbol of the program.
///
/// Definition sites recorded by the parser are indices of operations or data
/// items; they resolve to addresses here, now that both streams are laid
/// out. A label at the very end of a stream defines its symbol at the
/// stream's size.
pub(crate) fn register_program_symbols(
    program: &Program,
    text: &TextImage,
    data: &DataImage,
    registry: &mut SymbolRegistry,
) -> Result<(), Error> {
    for declaration in &program.symbols {
        registry.declare(&declaration.name, declaration.binding);

        for site in &declaration.sites {
            match site {
                DefinitionSite::Operation(index) => {
                    let address =
                        text.addresses.get(*index).copied().unwrap_or(text.body.size() as u64);
                    registry.define_in_text(&declaration.name, address)?;
                }

                DefinitionSite::DataItem(index) => {
                    let offset =
                        data.offsets.get(*index).copied().unwrap_or(data.body.size() as u64);
                    registry.define_in_data(&declaration.name, offset)?;
                }
            }
        }
    }

    Ok(())
}

/// Lay the symbol table and its string table out.
///
/// The table starts with the four reserved entries, then the user symbols in
/// partition order. Every user symbol's name is interned into the string
/// table as its entry is emitted.
pub(crate) fn build_symbol_table<N: Number>(
    registry: &SymbolRegistry,
    partitions: &Partitions,
) -> io::Result<(ByteBuffer, StringTable)> {
    let mut body = ByteBuffer::new();
    let mut names = StringTable::new();

    // The null symbol.
    Symbol {
        name_offset: 0,
        binding: SymbolBinding::Local,
        r#type: SymbolType::NoType,
        section_index: SectionIndex::Undefined,
        value: 0,
        size: 0,
    }
    .write::<N, _>(&mut body)?;

    // The section symbols, in section index order.
    for section_index in [SHNDX_TEXT, SHNDX_DATA, SHNDX_BSS] {
        Symbol {
            name_offset: 0,
            binding: SymbolBinding::Local,
            r#type: SymbolType::Section,
            section_index: SectionIndex::Ok(section_index),
            value: 0,
            size: 0,
        }
        .write::<N, _>(&mut body)?;
    }

    for id in partitions.in_layout_order() {
        let record = registry.record(id);

        let (section_index, value) = match record.site {
            Some(Site::Text(address)) => (SectionIndex::Ok(SHNDX_TEXT), address),
            Some(Site::Data(offset)) => (SectionIndex::Ok(SHNDX_DATA), offset),
            None => (SectionIndex::Undefined, 0),
        };

        let binding = match record.binding {
            Binding::Local => SymbolBinding::Local,
            Binding::Global => SymbolBinding::Global,
        };

        Symbol {
            name_offset: names.intern(&record.name),
            binding,
            r#type: SymbolType::NoType,
            section_index,
            value,
            size: 0,
        }
        .write::<N, _>(&mut body)?;
    }

    Ok((body, names))
}
