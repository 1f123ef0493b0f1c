//! Fixup resolution.
//!
//! Once every operation has its final address, each recorded fixup is either
//! patched in place (the target is defined in this object) or turned into a
//! relocation entry for the linker to finalise. This pass must run before
//! the symbol table is laid out, so that the symbol indices the relocation
//! entries point at are stable.

use std::{io, mem};

use anvil_object::{
    elf64::{Rela, RelocationType},
    ByteBuffer, Number, Write as _,
};
use anvil_parser::Binding;

use super::{
    encode::TextImage,
    symbols::{Partitions, Site, SymbolRegistry, SYMBOL_INDEX_DATA_SECTION},
    Error,
};

/// What a relocation entry will point at.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum RelocationTarget {
    /// A symbol, by name; always unresolved at this point.
    Symbol(String),
    /// The `.data` section symbol, for references to anonymous data content.
    DataSection,
}

/// A relocation awaiting its symbol table index.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct PendingRelocation {
    /// Offset of the storage unit in the instruction stream.
    pub site: u64,
    /// What the relocation points at.
    pub target: RelocationTarget,
    /// The addend, as recorded by the fixup.
    pub addend: i64,
}

/// Resolve every fixup of the instruction stream.
///
/// Targets defined in the instruction stream are patched with their final
/// PC-relative displacement and produce no relocation. Targets defined in
/// the data stream are patched with the data offset as an initial value, and
/// a relocation against the `.data` section symbol carries the rest.
/// Undefined targets are declared unresolved and produce a relocation
/// against their own symbol.
pub(crate) fn resolve_fixups(
    text: &mut TextImage,
    registry: &mut SymbolRegistry,
) -> Result<Vec<PendingRelocation>, Error> {
    let fixups = mem::take(&mut text.fixups);
    let mut pending = Vec::new();

    for fixup in fixups {
        let target_site =
            registry.lookup(&fixup.symbol).and_then(|id| registry.record(id).site);

        match target_site {
            Some(Site::Text(address)) => {
                let displacement = address as i64 - (fixup.site as i64 + 4);
                let displacement =
                    i32::try_from(displacement).map_err(|_| Error::RelocationOutOfRange {
                        name: fixup.symbol.clone(),
                        site: fixup.site,
                    })?;

                text.body.patch(fixup.site as usize, &displacement.to_le_bytes());
            }

            Some(Site::Data(offset)) => {
                // Initial value only; the linker computes the final address
                // through the section symbol.
                let initial = offset as u32;
                text.body.patch(fixup.site as usize, &initial.to_le_bytes());

                pending.push(PendingRelocation {
                    site: fixup.site,
                    target: RelocationTarget::DataSection,
                    addend: fixup.addend,
                });
            }

            None => {
                // Referenced but never defined: the symbol surfaces as an
                // unresolved global.
                registry.declare(&fixup.symbol, Binding::Global);

                pending.push(PendingRelocation {
                    site: fixup.site,
                    target: RelocationTarget::Symbol(fixup.symbol),
                    addend: fixup.addend,
                });
            }
        }
    }

    Ok(pending)
}

/// Lay the relocation table out, now that symbol indices are stable.
pub(crate) fn build_relocation_table<N: Number>(
    pending: &[PendingRelocation],
    registry: &SymbolRegistry,
    partitions: &Partitions,
) -> io::Result<ByteBuffer> {
    let mut body = ByteBuffer::new();

    for relocation in pending {
        let symbol = match &relocation.target {
            RelocationTarget::DataSection => SYMBOL_INDEX_DATA_SECTION,

            RelocationTarget::Symbol(name) => {
                let id = registry
                    .lookup(name)
                    .expect("Unresolved relocation targets are declared during fixup resolution");

                partitions
                    .symbol_index(id)
                    .expect("Every registered symbol belongs to a partition")
            }
        };

        Rela {
            offset: relocation.site,
            symbol,
            r#type: RelocationType::Pc32,
            addend: relocation.addend,
        }
        .write::<N, _>(&mut body)?;
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use anvil_object::LittleEndian;

    use super::super::encode::LabelFixup;
    use super::*;

    fn text_with_call_at(site: u64, total: usize, symbol: &str) -> TextImage {
        let mut text = TextImage::default();
        text.body.append(&vec![0; total]);
        text.fixups.push(LabelFixup { site, symbol: symbol.to_owned(), addend: -4 });

        text
    }

    #[test]
    fn test_backward_reference_is_patched() {
        // A 1-byte operation at 0, then a call whose placeholder sits at 2.
        let mut text = text_with_call_at(2, 6, "f");
        let mut registry = SymbolRegistry::new();
        registry.define_in_text("f", 0).unwrap();

        let pending = resolve_fixups(&mut text, &mut registry).unwrap();

        assert!(pending.is_empty());
        // rel32 = 0 - (2 + 4) = -6.
        assert_eq!(&text.body.bytes()[2..6], (-6i32).to_le_bytes());
    }

    #[test]
    fn test_forward_reference_is_patched() {
        // A call at 0 (placeholder at 1), then the target at 6.
        let mut text = text_with_call_at(1, 6, "f");
        let mut registry = SymbolRegistry::new();
        registry.define_in_text("f", 6).unwrap();

        resolve_fixups(&mut text, &mut registry).unwrap();

        // rel32 = 6 - (1 + 4) = 1.
        assert_eq!(&text.body.bytes()[1..5], 1i32.to_le_bytes());
    }

    #[test]
    fn test_undefined_reference_becomes_a_relocation() {
        let mut text = text_with_call_at(1, 6, "printf");
        let mut registry = SymbolRegistry::new();

        let pending = resolve_fixups(&mut text, &mut registry).unwrap();

        assert_eq!(
            pending,
            [PendingRelocation {
                site: 1,
                target: RelocationTarget::Symbol("printf".to_owned()),
                addend: -4,
            }]
        );
        // The placeholder stays zero.
        assert_eq!(&text.body.bytes()[1..5], &[0; 4]);
        // The symbol now exists, unresolved.
        let id = registry.lookup("printf").unwrap();
        assert_eq!(registry.record(id).site, None);
        assert_eq!(registry.record(id).binding, Binding::Global);
    }

    #[test]
    fn test_data_reference_patches_and_relocates() {
        let mut text = text_with_call_at(1, 6, "answer");
        let mut registry = SymbolRegistry::new();
        registry.define_in_data("answer", 8).unwrap();

        let pending = resolve_fixups(&mut text, &mut registry).unwrap();

        assert_eq!(
            pending,
            [PendingRelocation { site: 1, target: RelocationTarget::DataSection, addend: -4 }]
        );
        assert_eq!(&text.body.bytes()[1..5], 8u32.to_le_bytes());
    }

    #[test]
    fn test_relocation_table_bytes() {
        let mut registry = SymbolRegistry::new();
        registry.define_in_text("main", 0).unwrap();
        registry.declare("printf", Binding::Global);

        let partitions = registry.classify();
        let pending = [PendingRelocation {
            site: 1,
            target: RelocationTarget::Symbol("printf".to_owned()),
            addend: -4,
        }];

        let body =
            build_relocation_table::<LittleEndian>(&pending, &registry, &partitions).unwrap();

        #[rustfmt::skip]
        let expected: &[u8] = &[
            // Offset.
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            // Info: PC-relative 32-bit against symbol 5
            // (4 reserved + `main`).
            0x02, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00,
            // Addend.
            0xfc, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        ];

        assert_eq!(body.bytes(), expected);
    }
}
