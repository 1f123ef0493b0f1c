//! End-to-end tests: assemble source text in memory and inspect the
//! produced object file byte by byte.

use anvil_assembler::elf64::{assemble_program, Error};

fn assemble(source: &str) -> Vec<u8> {
    let program = anvil_parser::parse(source).unwrap();

    assemble_program(&program).unwrap()
}

fn u16_at(object: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes(object[offset..offset + 2].try_into().unwrap())
}

fn u32_at(object: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(object[offset..offset + 4].try_into().unwrap())
}

fn u64_at(object: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(object[offset..offset + 8].try_into().unwrap())
}

/// A section header, decoded back from the produced bytes.
#[derive(Debug)]
struct Section {
    name_offset: u32,
    r#type: u32,
    flags: u64,
    offset: u64,
    size: u64,
    link: u32,
    information: u32,
    alignment: u64,
    entity_size: u64,
}

fn sections(object: &[u8]) -> Vec<Section> {
    let section_header_offset = u64_at(object, 40) as usize;
    let count = u16_at(object, 60) as usize;

    (0..count)
        .map(|index| {
            let at = section_header_offset + index * 64;

            Section {
                name_offset: u32_at(object, at),
                r#type: u32_at(object, at + 4),
                flags: u64_at(object, at + 8),
                offset: u64_at(object, at + 24),
                size: u64_at(object, at + 32),
                link: u32_at(object, at + 40),
                information: u32_at(object, at + 44),
                alignment: u64_at(object, at + 48),
                entity_size: u64_at(object, at + 56),
            }
        })
        .collect()
}

fn body<'o>(object: &'o [u8], section: &Section) -> &'o [u8] {
    &object[section.offset as usize..][..section.size as usize]
}

/// A symbol table entry, decoded back from the produced bytes, with its name
/// resolved from `.strtab`.
#[derive(Debug, PartialEq, Eq)]
struct Symbol {
    name: String,
    info: u8,
    section_index: u16,
    value: u64,
}

fn symbols(object: &[u8]) -> Vec<Symbol> {
    let sections = sections(object);
    let symtab = body(object, &sections[5]);
    let strtab = body(object, &sections[6]);

    symtab
        .chunks_exact(24)
        .map(|entry| {
            let name_offset = u32::from_le_bytes(entry[0..4].try_into().unwrap()) as usize;
            let name_end = name_offset
                + strtab[name_offset..]
                    .iter()
                    .position(|byte| *byte == 0x00)
                    .expect("Symbol names are NUL-terminated");

            Symbol {
                name: String::from_utf8(strtab[name_offset..name_end].to_vec()).unwrap(),
                info: entry[4],
                section_index: u16::from_le_bytes(entry[6..8].try_into().unwrap()),
                value: u64::from_le_bytes(entry[8..16].try_into().unwrap()),
            }
        })
        .collect()
}

#[test]
fn test_file_identification() {
    let object = assemble(".intel_syntax noprefix\n.globl main\nmain:\n ret\n");

    // Magic.
    assert_eq!(&object[0..4], &[0x7f, b'E', b'L', b'F']);
    // 64-bit.
    assert_eq!(object[4], 0x02);
    // Little-endian.
    assert_eq!(object[5], 0x01);
    // Current version.
    assert_eq!(object[6], 0x01);
    // Relocatable.
    assert_eq!(u16_at(&object, 16), 0x01);
    // x86-64.
    assert_eq!(u16_at(&object, 18), 0x3e);
    // Current version, again.
    assert_eq!(u32_at(&object, 20), 0x01);
}

#[test]
fn test_empty_program() {
    let object = assemble(".intel_syntax noprefix\n.globl main\nmain:\n ret\n");

    let sections = sections(&object);

    assert_eq!(sections.len(), 8);
    assert_eq!(body(&object, &sections[1]), &[0xc3]);

    let symbols = symbols(&object);

    // The four reserved entries plus `main`.
    assert_eq!(symbols.len(), 5);
    assert_eq!(
        symbols[4],
        Symbol { name: "main".to_owned(), info: 0x10, section_index: 1, value: 0 }
    );
}

#[test]
fn test_mov_immediate_and_return() {
    let object = assemble("main:\n mov rax, 42\n ret\n");

    let sections = sections(&object);

    assert_eq!(
        body(&object, &sections[1]),
        &[0x48, 0xc7, 0xc0, 0x2a, 0x00, 0x00, 0x00, 0xc3]
    );
}

#[test]
fn test_mov_register_and_return() {
    let object = assemble("main:\n mov rax, rdi\n ret\n");

    let sections = sections(&object);

    assert_eq!(body(&object, &sections[1]), &[0x48, 0x89, 0xf8, 0xc3]);
}

#[test]
fn test_local_call_is_patched_without_relocation() {
    let object = assemble("f:\n ret\nmain:\n call f\n ret\n");

    let sections = sections(&object);
    let text = body(&object, &sections[1]);

    // `f` at 0, `call` at 1 with its displacement at 2:
    // rel32 = 0 - (2 + 4) = -6.
    assert_eq!(text[0], 0xc3);
    assert_eq!(text[1], 0xe8);
    assert_eq!(&text[2..6], (-6i32).to_le_bytes());
    assert_eq!(text[6], 0xc3);

    // No relocation was produced.
    assert_eq!(sections[2].size, 0);
}

#[test]
fn test_external_call_produces_a_relocation() {
    let object = assemble("main:\n call printf\n ret\n");

    let sections = sections(&object);
    let text = body(&object, &sections[1]);

    // The placeholder stays zero.
    assert_eq!(text, &[0xe8, 0x00, 0x00, 0x00, 0x00, 0xc3]);

    // Exactly one relocation entry.
    let rela = body(&object, &sections[2]);
    assert_eq!(rela.len(), 24);

    // `r_offset` is the placeholder site.
    assert_eq!(u64::from_le_bytes(rela[0..8].try_into().unwrap()), 1);
    // `r_info` names `printf` (index 5: 4 reserved entries + `main`) with a
    // PC-relative 32-bit type.
    assert_eq!(u64::from_le_bytes(rela[8..16].try_into().unwrap()), 0x0000_0005_0000_0002);
    // `r_addend` is -4.
    assert_eq!(i64::from_le_bytes(rela[16..24].try_into().unwrap()), -4);

    // `printf` is an unresolved global.
    let symbols = symbols(&object);
    assert_eq!(
        symbols[5],
        Symbol { name: "printf".to_owned(), info: 0x10, section_index: 0, value: 0 }
    );
}

#[test]
fn test_symbol_ordering_and_first_non_local_index() {
    // `a` and `b` are global, `c` stays local.
    let object =
        assemble(".globl a\n.globl b\nc:\n ret\na:\n ret\nb:\n ret\n");

    let symbols = symbols(&object);
    let names: Vec<&str> = symbols.iter().map(|symbol| symbol.name.as_str()).collect();

    assert_eq!(names, ["", "", "", "", "c", "a", "b"]);

    // Locals first; `sh_info` of `.symtab` is the index of the first
    // non-local symbol.
    let sections = sections(&object);
    assert_eq!(sections[5].information, 5);

    // `c` is local, `a` and `b` are global.
    assert_eq!(symbols[4].info, 0x00);
    assert_eq!(symbols[5].info, 0x10);
    assert_eq!(symbols[6].info, 0x10);

    // Addresses follow the instruction stream: one `ret` each.
    assert_eq!(symbols[4].value, 0);
    assert_eq!(symbols[5].value, 1);
    assert_eq!(symbols[6].value, 2);
}

#[test]
fn test_section_metadata() {
    let object = assemble("main:\n call printf\n ret\n");

    let sections = sections(&object);

    // Types: null, progbits, rela, progbits, nobits, symtab, strtab,
    // strtab.
    let types: Vec<u32> = sections.iter().map(|section| section.r#type).collect();
    assert_eq!(types, [0, 1, 4, 1, 8, 2, 3, 3]);

    // `.text` is alloc + execinstr.
    assert_eq!(sections[1].flags, 0x06);
    // `.rela.text` links the symbol table and applies to `.text`.
    assert_eq!(sections[2].flags, 0x40);
    assert_eq!(sections[2].link, 5);
    assert_eq!(sections[2].information, 1);
    assert_eq!(sections[2].entity_size, 24);
    // `.data` and `.bss` are write + alloc.
    assert_eq!(sections[3].flags, 0x03);
    assert_eq!(sections[4].flags, 0x03);
    // `.symtab` links `.strtab`.
    assert_eq!(sections[5].link, 6);
    assert_eq!(sections[5].entity_size, 24);
}

#[test]
fn test_offsets_respect_alignments() {
    let object = assemble("main:\n call printf\n ret\n");

    for section in sections(&object) {
        if section.size > 0 && section.r#type != 0x08 {
            assert_eq!(section.offset % section.alignment.max(1), 0);
        }
    }

    assert_eq!(u64_at(&object, 40) % 8, 0);
}

#[test]
fn test_string_tables_start_with_nul() {
    let object = assemble(".globl main\nmain:\n ret\n");

    let sections = sections(&object);

    // `.strtab` and `.shstrtab` both start with a NUL byte, and every
    // section name offset points at a NUL-terminated string.
    let strtab = body(&object, &sections[6]);
    let shstrtab = body(&object, &sections[7]);

    assert_eq!(strtab[0], 0x00);
    assert_eq!(shstrtab[0], 0x00);

    let name_at = |offset: u32| {
        let start = offset as usize;
        let end = start
            + shstrtab[start..].iter().position(|byte| *byte == 0x00).expect("NUL-terminated");

        std::str::from_utf8(&shstrtab[start..end]).unwrap().to_owned()
    };

    let names: Vec<String> =
        sections.iter().map(|section| name_at(section.name_offset)).collect();

    assert_eq!(
        names,
        ["", ".text", ".rela.text", ".data", ".bss", ".symtab", ".strtab", ".shstrtab"]
    );
}

#[test]
fn test_data_definitions() {
    let object = assemble(
        ".data\nanswer:\n .quad 42\nsmall:\n .byte 7\n.text\nmain:\n ret\n",
    );

    let sections = sections(&object);

    assert_eq!(
        body(&object, &sections[3]),
        &[0x2a, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x07]
    );

    let symbols = symbols(&object);
    let answer = symbols.iter().find(|symbol| symbol.name == "answer").unwrap();
    let small = symbols.iter().find(|symbol| symbol.name == "small").unwrap();

    assert_eq!(answer.section_index, 3);
    assert_eq!(answer.value, 0);
    assert_eq!(small.section_index, 3);
    assert_eq!(small.value, 8);
}

#[test]
fn test_call_to_data_symbol_relocates_through_the_section_symbol() {
    let object = assemble(".data\nanswer:\n .quad 42\n.text\nmain:\n call answer\n ret\n");

    let sections = sections(&object);

    // The placeholder holds the data offset as initial value.
    let text = body(&object, &sections[1]);
    assert_eq!(&text[1..5], 0u32.to_le_bytes());

    // One relocation against the `.data` section symbol (index 2).
    let rela = body(&object, &sections[2]);
    assert_eq!(rela.len(), 24);
    assert_eq!(u64::from_le_bytes(rela[8..16].try_into().unwrap()), 0x0000_0002_0000_0002);
    assert_eq!(i64::from_le_bytes(rela[16..24].try_into().unwrap()), -4);
}

#[test]
fn test_forward_call_is_patched() {
    let object = assemble("main:\n call f\n ret\nf:\n ret\n");

    let sections = sections(&object);
    let text = body(&object, &sections[1]);

    // `f` at 6, placeholder at 1: rel32 = 6 - (1 + 4) = 1.
    assert_eq!(&text[1..5], 1i32.to_le_bytes());
    assert_eq!(sections[2].size, 0);
}

#[test]
fn test_two_calls_to_the_same_external_symbol() {
    let object = assemble("main:\n call puts\n call puts\n ret\n");

    let sections = sections(&object);

    // Two relocations, one unresolved symbol.
    assert_eq!(sections[2].size, 48);

    let symbols = symbols(&object);
    let unresolved: Vec<&Symbol> =
        symbols.iter().filter(|symbol| symbol.name == "puts").collect();

    assert_eq!(unresolved.len(), 1);
}

#[test]
fn test_duplicate_symbol_is_rejected() {
    let program = anvil_parser::parse("f:\n ret\nf:\n nop\n").unwrap();

    assert!(matches!(
        assemble_program(&program),
        Err(Error::DuplicateSymbol { .. })
    ));
}

#[test]
fn test_symbol_at_end_of_text() {
    let object = assemble("main:\n ret\nend:\n");

    let symbols = symbols(&object);
    let end = symbols.iter().find(|symbol| symbol.name == "end").unwrap();

    // The label points one past the last instruction.
    assert_eq!(end.value, 1);
    assert_eq!(end.section_index, 1);
}
