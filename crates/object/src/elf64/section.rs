use std::io;

use enumflags2::{bitflags, BitFlags};

use crate::{Number, Write};

/// Section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionHeader {
    /// An offset to a string in the `.shstrtab` section that represents the
    /// name of this section.
    pub name_offset: u32,
    /// Type of the section.
    pub r#type: SectionType,
    /// Flags.
    pub flags: SectionFlags,
    /// Virtual address of the section in memory, for sections that are
    /// loaded. Always zero in a relocatable object.
    pub virtual_address: u64,
    /// Offset of the section body in the file image.
    pub offset: u64,
    /// Size in bytes of the section body. May be 0.
    pub size: u64,
    /// Contains the section index of an associated section. This field is
    /// used for several purposes, depending on the type of section.
    pub link: SectionIndex,
    /// Contains extra information about the section. This field is used for
    /// several purposes, depending on the type of section.
    pub information: u32,
    /// Contains the required alignment of the section.
    pub alignment: u64,
    /// Contains the size, in bytes, of each entry, for sections that contain
    /// fixed-sized entries, zero otherwise.
    pub entity_size: u64,
}

impl SectionHeader {
    /// Size of `Self` in the Elf format.
    pub const SIZE: u16 = 64;
}

impl Write for SectionHeader {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u32(self.name_offset))?;
        self.r#type.write::<N, _>(buffer)?;
        self.flags.write::<N, _>(buffer)?;
        buffer.write_all(&N::write_u64(self.virtual_address))?;
        buffer.write_all(&N::write_u64(self.offset))?;
        buffer.write_all(&N::write_u64(self.size))?;
        <SectionIndex as Write<u32>>::write::<N, _>(&self.link, buffer)?;
        buffer.write_all(&N::write_u32(self.information))?;
        buffer.write_all(&N::write_u64(self.alignment))?;
        buffer.write_all(&N::write_u64(self.entity_size))
    }
}

/// Section type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SectionType {
    /// Mark an unused section header.
    Null = 0x00,
    /// The section contains information defined by the program.
    ProgramData = 0x01,
    /// The section contains a linker symbol table.
    SymbolTable = 0x02,
    /// The section contains a string table.
    StringTable = 0x03,
    /// The section contains “Rela” type relocation entries, with addends
    /// (hence the “a” in “Rela”, i.e. “RELocations with Addends”).
    RelocationWithAddends = 0x04,
    /// The section contains uninitialized space; does not occupy any space
    /// in the file. It represents program space with no data (BSS, Block
    /// Started by Symbol).
    NoBits = 0x08,
}

impl Write for SectionType {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u32(*self as u32))
    }
}

/// Section flag.
#[bitflags]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u64)]
pub enum SectionFlag {
    /// The section contains writable data.
    Writable = 0x01,
    /// The section is allocated in memory image of program.
    Allocable = 0x02,
    /// The section contains executable instructions.
    Executable = 0x04,
    /// `sh_info` contains a section header table index.
    InfoLink = 0x40,
}

/// Section flags.
pub type SectionFlags = BitFlags<SectionFlag>;

impl Write for SectionFlags {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u64(self.bits()))
    }
}

/// Section index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionIndex {
    /// A valid section index.
    Ok(u16),
    /// An undefined or meaningless section reference.
    Undefined,
}

impl SectionIndex {
    fn as_u16(&self) -> u16 {
        match self {
            Self::Ok(index) => *index,
            Self::Undefined => 0x0000,
        }
    }
}

impl Write<u16> for SectionIndex {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u16(self.as_u16()))
    }
}

impl Write<u32> for SectionIndex {
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write,
    {
        buffer.write_all(&N::write_u32(self.as_u16().into()))
    }
}
