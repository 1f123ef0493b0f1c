//! Instruction encoding.
//!
//! Every mnemonic is encoded by a handler registered in [`ENCODERS`]; adding
//! an instruction means adding a row and a handler, nothing else branches on
//! the mnemonic. Handlers append the fully-encoded instruction bytes to the
//! instruction stream and, for PC-relative references, record a
//! [`LabelFixup`] at the placeholder they emitted.
//!
//! Immediates and displacements inside an instruction are little-endian by
//! definition of the instruction set, independently of the object-file byte
//! order, hence the direct `to_le_bytes` calls.

use anvil_object::ByteBuffer;
use anvil_parser::{Mnemonic, Operand, Operation, Width};

use super::Error;

/// The REX prefix byte.
const fn rex(w: bool, reg: u8, index: u8, rm: u8) -> u8 {
    0b0100_0000
        | ((w as u8) << 3)
        | (((reg >> 3) & 1) << 2)
        | (((index >> 3) & 1) << 1)
        | ((rm >> 3) & 1)
}

/// The ModR/M byte.
const fn modrm(mode: u8, reg: u8, rm: u8) -> u8 {
    ((mode & 0b11) << 6) | ((reg & 0b111) << 3) | (rm & 0b111)
}

/// Register-direct addressing, for the `mode` field of ModR/M.
const MODE_REGISTER: u8 = 0b11;

/// The instruction stream under construction.
#[derive(Debug, Default)]
pub(crate) struct TextImage {
    /// The encoded bytes.
    pub body: ByteBuffer,
    /// Byte offset of each encoded operation, in operation order. Set
    /// exactly once, just before the operation is encoded.
    pub addresses: Vec<u64>,
    /// Placeholders awaiting resolution.
    pub fixups: Vec<LabelFixup>,
}

/// A reference emitted into the instruction stream that awaits its final
/// value.
///
/// The fixup refers to its target by name, never by identity: resolution
/// goes through the symbol registry once every address is final.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LabelFixup {
    /// Offset, in the instruction stream, of the 4 placeholder bytes.
    pub site: u64,
    /// Name of the referenced symbol.
    pub symbol: String,
    /// Addend of the reference. `-4` for PC-relative references, since the
    /// displacement is measured from the instruction following the
    /// placeholder.
    pub addend: i64,
}

type Encode = fn(&Operation, &mut TextImage) -> Result<(), Error>;

/// The mnemonic table: one `(mnemonic, handler)` row per instruction.
const ENCODERS: &[(Mnemonic, Encode)] = &[
    (Mnemonic::Call, call),
    (Mnemonic::Mov, mov),
    (Mnemonic::Nop, nop),
    (Mnemonic::Ret, ret),
];

/// Encode every operation, in order, recording addresses and fixups.
pub(crate) fn encode_operations(operations: &[Operation]) -> Result<TextImage, Error> {
    let mut image = TextImage {
        body: ByteBuffer::new(),
        addresses: Vec::with_capacity(operations.len()),
        fixups: Vec::new(),
    };

    for operation in operations {
        image.addresses.push(image.body.size() as u64);

        let (_, encode) = ENCODERS
            .iter()
            .find(|(mnemonic, _)| *mnemonic == operation.mnemonic)
            .ok_or_else(|| unsupported(operation))?;

        encode(operation, &mut image)?;
    }

    Ok(image)
}

fn call(operation: &Operation, image: &mut TextImage) -> Result<(), Error> {
    match operation.operands.as_slice() {
        [Operand::Symbol(name)] => {
            image.body.append(&[0xe8]);

            // The placeholder starts right after the opcode.
            image.fixups.push(LabelFixup {
                site: image.body.size() as u64,
                symbol: name.clone(),
                addend: -4,
            });
            image.body.append(&[0x00; 4]);

            Ok(())
        }

        // `call reg` and `call mem` exist in the instruction set but have no
        // encoder here.
        [Operand::Register(_)] | [Operand::Memory { .. }] => Err(unsupported(operation)),

        _ => Err(mismatch(operation)),
    }
}

fn mov(operation: &Operation, image: &mut TextImage) -> Result<(), Error> {
    match operation.operands.as_slice() {
        [Operand::Register(destination), Operand::Register(source)] => {
            if destination.width != source.width {
                return Err(mismatch(operation));
            }

            if destination.width != Width::Qword {
                return Err(unsupported(operation));
            }

            image.body.append(&[
                rex(true, source.kind.encoding(), 0, destination.kind.encoding()),
                0x89,
                modrm(MODE_REGISTER, source.kind.encoding(), destination.kind.encoding()),
            ]);

            Ok(())
        }

        [Operand::Register(destination), Operand::Immediate { value, .. }] => {
            if destination.width != Width::Qword {
                return Err(unsupported(operation));
            }

            // The only immediate form carried here is `imm32`, sign-extended
            // to 64 bits.
            let immediate = i32::try_from(*value).map_err(|_| unsupported(operation))?;

            image.body.append(&[
                rex(true, 0, 0, destination.kind.encoding()),
                0xc7,
                modrm(MODE_REGISTER, 0, destination.kind.encoding()),
            ]);
            image.body.append(&immediate.to_le_bytes());

            Ok(())
        }

        [_, _] => Err(unsupported(operation)),

        _ => Err(mismatch(operation)),
    }
}

fn nop(operation: &Operation, image: &mut TextImage) -> Result<(), Error> {
    if !operation.operands.is_empty() {
        return Err(mismatch(operation));
    }

    image.body.append(&[0x90]);

    Ok(())
}

fn ret(operation: &Operation, image: &mut TextImage) -> Result<(), Error> {
    if !operation.operands.is_empty() {
        return Err(mismatch(operation));
    }

    image.body.append(&[0xc3]);

    Ok(())
}

fn mismatch(operation: &Operation) -> Error {
    Error::OperandMismatch { line: operation.line, mnemonic: operation.mnemonic }
}

fn unsupported(operation: &Operation) -> Error {
    Error::UnsupportedEncoding { line: operation.line, mnemonic: operation.mnemonic }
}
