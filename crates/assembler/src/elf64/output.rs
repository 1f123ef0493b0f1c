//! Object file emission.
//!
//! The whole file is produced in memory: the file header, then each
//! non-empty section body at its laid-out offset (zero-padded up to it),
//! then padding up to the section header table, then the headers in section
//! index order.

use std::io;

use anvil_object::{
    elf64::{self, FileHeader, FileType, Machine, OsAbi, SectionType, Version},
    Endianness, Number, Write as _,
};

use super::layout::{SectionLayout, SHNDX_SHSTRTAB};

/// Emit the laid-out sections as a complete object file image.
pub(crate) fn write_object<N: Number>(layout: &SectionLayout) -> io::Result<Vec<u8>> {
    let mut object = Vec::with_capacity(
        layout.section_header_offset as usize
            + layout.headers.len() * usize::from(elf64::SectionHeader::SIZE),
    );

    let endianness = match N::endianness() {
        Endianness::Little => elf64::Endianness::Little,
        Endianness::Big => elf64::Endianness::Big,
    };

    let file_header = FileHeader {
        endianness,
        version: Version::Current,
        os_abi: OsAbi::SystemV,
        r#type: FileType::RelocatableFile,
        machine: Machine::X86_64,
        processor_flags: 0,
        section_header_offset: layout.section_header_offset,
        number_of_sections: layout.headers.len() as u16,
        section_names_index: SHNDX_SHSTRTAB,
    };
    file_header.write::<N, _>(&mut object)?;

    // Section bodies, each padded up to its offset.
    for (header, body) in layout.headers.iter().zip(&layout.bodies) {
        let Some(body) = body else { continue };

        if header.size > 0 && header.r#type != SectionType::NoBits {
            pad_to(&mut object, header.offset);
            object.extend_from_slice(body.bytes());
        }
    }

    // The section header table.
    pad_to(&mut object, layout.section_header_offset);

    for header in &layout.headers {
        header.write::<N, _>(&mut object)?;
    }

    Ok(object)
}

/// Zero-pad `object` up to `offset`. Layout guarantees offsets never move
/// backwards.
fn pad_to(object: &mut Vec<u8>, offset: u64) {
    object.resize(offset as usize, 0x00);
}
