//! The Elf64 assembling driver.
//!
//! Stage ordering is a hard invariant, enforced here: encode every
//! operation, lay the data out, register symbols (addresses are final at
//! that point), resolve fixups, classify symbols, lay the symbol and
//! relocation tables out, lay the sections out, write. No stage observes a
//! later stage's outputs.

mod encode;
mod layout;
mod output;
mod relocate;
mod symbols;

use std::{fs, io, path::PathBuf};

use anvil_object::LittleEndian;
use anvil_parser::{Mnemonic, Program};
use miette::Diagnostic;
use thiserror::Error;

use crate::Configuration;

/// Errors of the Elf64 driver.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// The source text could not be parsed.
    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] anvil_parser::Error),

    /// Operand widths or kinds do not match.
    #[error("line {line}: the operands of `{mnemonic}` do not agree")]
    #[diagnostic(
        code(E008),
        help(
            "Operand widths must match where the instruction set requires \
            it; both operands of a register-to-register `mov` for instance."
        )
    )]
    OperandMismatch {
        /// Source line of the offending instruction.
        line: usize,
        /// Its mnemonic.
        mnemonic: Mnemonic,
    },

    /// A recognised operand combination with no implementation here.
    #[error("line {line}: no encoding for this `{mnemonic}` operand combination")]
    #[diagnostic(
        code(E009),
        help("`anvil --explain E009` lists the implemented instruction forms.")
    )]
    UnsupportedEncoding {
        /// Source line of the offending instruction.
        line: usize,
        /// Its mnemonic.
        mnemonic: Mnemonic,
    },

    /// A symbol is defined more than once.
    #[error("the symbol `{name}` is defined more than once")]
    #[diagnostic(
        code(E010),
        help("A symbol may be declared several times but defined only once.")
    )]
    DuplicateSymbol {
        /// The offending symbol name.
        name: String,
    },

    /// A PC-relative displacement does not fit in 32 bits.
    #[error(
        "the symbol `{name}` is out of range for the reference at offset {site:#x}"
    )]
    #[diagnostic(
        code(E011),
        help("PC-relative displacements are limited to ±2 GiB.")
    )]
    RelocationOutOfRange {
        /// The referenced symbol name.
        name: String,
        /// The offset of the reference in `.text`.
        site: u64,
    },

    /// The source file could not be read.
    #[error("I was not able to read the source file `{0}`.")]
    #[diagnostic(code(E012), help("Does the file exist, and is it readable?"))]
    ReadInput(PathBuf, #[source] io::Error),

    /// The object file could not be written.
    #[error("I was not able to write the object file `{0}`.")]
    #[diagnostic(code(E012), help("Is the destination writable?"))]
    WriteOutput(PathBuf, #[source] io::Error),

    /// The object file image could not be laid out in memory.
    #[error("I was not able to lay the object file out in memory.")]
    #[diagnostic(code(E012), help("This is likely a bug worth reporting."))]
    Emit(#[from] io::Error),
}

/// Assemble `configuration.input_file` into `configuration.output_file`.
pub(crate) fn assemble(configuration: Configuration) -> Result<(), Error> {
    let source = fs::read_to_string(&configuration.input_file)
        .map_err(|error| Error::ReadInput(configuration.input_file.clone(), error))?;

    let program = anvil_parser::parse(&source)?;
    let object = assemble_program(&program)?;

    if let Err(error) = fs::write(&configuration.output_file, &object) {
        // Never leave a truncated object behind.
        let _ = fs::remove_file(&configuration.output_file);

        return Err(Error::WriteOutput(configuration.output_file, error));
    }

    Ok(())
}

/// Assemble a parsed program into a complete object file image.
///
/// This is the in-memory core of the assembler; the driver wraps it with
/// file input and output.
pub fn assemble_program(program: &Program) -> Result<Vec<u8>, Error> {
    // Encode every operation; addresses become final here.
    let mut text = encode::encode_operations(&program.operations)?;

    // Lay the data out; offsets become final here.
    let data = layout::lay_out_data(&program.data);

    // Register the program's symbols against the finished streams.
    let mut registry = symbols::SymbolRegistry::new();
    symbols::register_program_symbols(program, &text, &data, &mut registry)?;

    // Resolve fixups: patch what is local, keep the rest for the linker.
    let pending = relocate::resolve_fixups(&mut text, &mut registry)?;

    // Partition the symbols; symbol table indices are stable from here on.
    let partitions = registry.classify();

    let (symtab, strtab) = symbols::build_symbol_table::<LittleEndian>(&registry, &partitions)?;
    let rela_text =
        relocate::build_relocation_table::<LittleEndian>(&pending, &registry, &partitions)?;

    let layout = layout::build_sections(
        text.body,
        rela_text,
        data.body,
        symtab,
        strtab,
        partitions.locals.len(),
    );

    Ok(output::write_object::<LittleEndian>(&layout)?)
}
