//! Section layout.
//!
//! The produced object always carries the same eight sections, at fixed
//! indices; relocations and symbol entries point at these indices, and so
//! does the linker. Bodies are laid out after the file header with a running
//! cursor, each aligned to its section's alignment.

use anvil_object::{
    elf64::{
        align_up, FileHeader, Rela, SectionFlag, SectionFlags, SectionHeader, SectionIndex,
        SectionType, StringTable, Symbol,
    },
    ByteBuffer,
};
use anvil_parser::DataItem;

use super::symbols::RESERVED_SYMBOLS;

/// The fixed section indices of the produced object.
pub(crate) const SHNDX_TEXT: u16 = 1;
pub(crate) const SHNDX_RELA_TEXT: u16 = 2;
pub(crate) const SHNDX_DATA: u16 = 3;
pub(crate) const SHNDX_BSS: u16 = 4;
pub(crate) const SHNDX_SYMTAB: u16 = 5;
pub(crate) const SHNDX_STRTAB: u16 = 6;
pub(crate) const SHNDX_SHSTRTAB: u16 = 7;

/// The data stream under construction.
#[derive(Debug, Default)]
pub(crate) struct DataImage {
    /// The laid-out bytes.
    pub body: ByteBuffer,
    /// Byte offset of each data item, in item order.
    pub offsets: Vec<u64>,
}

/// Lay the data items out, back to back, recording their offsets.
///
/// Values are stored little-endian, truncated to the directive's width; the
/// parser has already checked that they fit.
pub(crate) fn lay_out_data(items: &[DataItem]) -> DataImage {
    let mut image =
        DataImage { body: ByteBuffer::new(), offsets: Vec::with_capacity(items.len()) };

    for item in items {
        image.offsets.push(image.body.size() as u64);

        let bytes = item.value.to_le_bytes();
        image.body.append(&bytes[..item.width.size()]);
    }

    image
}

/// Every section of the object, laid out: headers with final offsets,
/// bodies, and the offset of the section header table.
#[derive(Debug)]
pub(crate) struct SectionLayout {
    /// Section headers, in section index order.
    pub headers: Vec<SectionHeader>,
    /// Section bodies, parallel to `headers`. `None` for sections with no
    /// bytes in the file image.
    pub bodies: Vec<Option<ByteBuffer>>,
    /// Offset of the section header table.
    pub section_header_offset: u64,
}

/// Assemble the fixed section table from the finished bodies.
///
/// `local_symbols` is the number of *user* local symbols; the symbol table's
/// `sh_info` must be the index of its first non-local entry.
pub(crate) fn build_sections(
    text: ByteBuffer,
    rela_text: ByteBuffer,
    data: ByteBuffer,
    symtab: ByteBuffer,
    strtab: StringTable,
    local_symbols: usize,
) -> SectionLayout {
    let mut builder = SectionBuilder::new();

    // The undefined section.
    builder.push(
        "",
        SectionType::Null,
        SectionFlags::EMPTY,
        0,
        SectionIndex::Undefined,
        0,
        0,
        None,
    );

    builder.push(
        ".text",
        SectionType::ProgramData,
        SectionFlag::Allocable | SectionFlag::Executable,
        1,
        SectionIndex::Undefined,
        0,
        0,
        Some(text),
    );

    // `sh_link` is the associated symbol table; `sh_info` is the section the
    // relocations apply to.
    builder.push(
        ".rela.text",
        SectionType::RelocationWithAddends,
        SectionFlag::InfoLink.into(),
        8,
        SectionIndex::Ok(SHNDX_SYMTAB),
        u32::from(SHNDX_TEXT),
        u64::from(Rela::SIZE),
        Some(rela_text),
    );

    builder.push(
        ".data",
        SectionType::ProgramData,
        SectionFlag::Writable | SectionFlag::Allocable,
        1,
        SectionIndex::Undefined,
        0,
        0,
        Some(data),
    );

    builder.push(
        ".bss",
        SectionType::NoBits,
        SectionFlag::Writable | SectionFlag::Allocable,
        1,
        SectionIndex::Undefined,
        0,
        0,
        None,
    );

    // `sh_link` is the associated string table; `sh_info` is one greater
    // than the index of the last local symbol.
    let first_non_local = (RESERVED_SYMBOLS + local_symbols) as u32;
    builder.push(
        ".symtab",
        SectionType::SymbolTable,
        SectionFlags::EMPTY,
        8,
        SectionIndex::Ok(SHNDX_STRTAB),
        first_non_local,
        u64::from(Symbol::SIZE),
        Some(symtab),
    );

    builder.push(
        ".strtab",
        SectionType::StringTable,
        SectionFlags::EMPTY,
        1,
        SectionIndex::Undefined,
        0,
        0,
        Some(ByteBuffer::from(strtab.into_bytes())),
    );

    builder.push(
        ".shstrtab",
        SectionType::StringTable,
        SectionFlags::EMPTY,
        1,
        SectionIndex::Undefined,
        0,
        0,
        // The body is attached by `finish`, once its own name is interned.
        None,
    );

    builder.finish()
}

struct SectionBuilder {
    headers: Vec<SectionHeader>,
    bodies: Vec<Option<ByteBuffer>>,
    names: StringTable,
}

impl SectionBuilder {
    fn new() -> Self {
        Self { headers: Vec::with_capacity(8), bodies: Vec::with_capacity(8), names: StringTable::new() }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        name: &str,
        r#type: SectionType,
        flags: SectionFlags,
        alignment: u64,
        link: SectionIndex,
        information: u32,
        entity_size: u64,
        body: Option<ByteBuffer>,
    ) {
        // The leading NUL of the name table already spells the empty name.
        let name_offset = if name.is_empty() { 0 } else { self.names.intern(name) };
        let size = body.as_ref().map_or(0, |body| body.size() as u64);

        self.headers.push(SectionHeader {
            name_offset,
            r#type,
            flags,
            virtual_address: 0,
            offset: 0,
            size,
            link,
            information,
            alignment,
            entity_size,
        });
        self.bodies.push(body);
    }

    fn finish(mut self) -> SectionLayout {
        // The section-name table is the last section; its size is only known
        // once every name, its own included, has been interned.
        let names = self.names.into_bytes();
        let last = self.headers.len() - 1;
        self.headers[last].size = names.len() as u64;
        self.bodies[last] = Some(ByteBuffer::from(names));

        // Lay the bodies out after the file header.
        let mut cursor = u64::from(FileHeader::SIZE);

        for header in &mut self.headers {
            if header.size > 0 && header.r#type != SectionType::NoBits {
                cursor = align_up(cursor, header.alignment.max(1));
                header.offset = cursor;
                cursor += header.size;
            }
        }

        let section_header_offset = align_up(cursor, 8);

        SectionLayout {
            headers: self.headers,
            bodies: self.bodies,
            section_header_offset,
        }
    }
}
