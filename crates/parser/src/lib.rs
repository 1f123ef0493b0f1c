//! `anvil_parser` turns Intel-syntax assembly source text into the program
//! tree consumed by the assembler.
//!
//! The dialect is the `.intel_syntax noprefix` subset: `.globl` and section
//! directives, labels, a handful of mnemonics, and `.byte`/`.word`/`.long`/
//! `.quad` data definitions. Comments start with `#` and run to the end of
//! the line.
//!
//! Parsing is line-oriented: each line is stripped of its comment and
//! dispatched as a directive, a label (possibly followed by another
//! statement on the same line), or an instruction. The operand grammar is a
//! set of nom parsers in the `syntax` module.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod program;
mod syntax;

use nom::combinator::all_consuming;
pub use program::*;

/// Errors reported while parsing source text.
///
/// Every variant carries the 1-based line number the offending statement was
/// written on.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// The line does not match the statement grammar.
    #[error("line {line}: syntax error near `{near}`")]
    #[diagnostic(
        code(E004),
        help(
            "A statement is a directive, a label (`name:`), or a mnemonic \
            followed by its operands."
        )
    )]
    Syntax {
        /// Source line of the offending statement.
        line: usize,
        /// The text that could not be parsed.
        near: String,
    },

    /// The statement starts with an identifier that names no instruction.
    #[error("line {line}: unknown mnemonic `{name}`")]
    #[diagnostic(
        code(E005),
        help("The supported mnemonics are `call`, `mov`, `nop` and `ret`.")
    )]
    UnknownMnemonic {
        /// Source line of the offending statement.
        line: usize,
        /// The spelling that was not recognised.
        name: String,
    },

    /// The statement starts with a `.` but names no known directive.
    #[error("line {line}: unknown directive `.{name}`")]
    #[diagnostic(
        code(E006),
        help(
            "The supported directives are `.intel_syntax noprefix`, `.globl`, \
            `.text`, `.data`, `.bss`, `.byte`, `.word`, `.long` and `.quad`."
        )
    )]
    UnknownDirective {
        /// Source line of the offending statement.
        line: usize,
        /// The spelling that was not recognised.
        name: String,
    },

    /// The statement is valid but not in the section it appeared in.
    #[error("line {line}: {what} is not allowed in `{section}`")]
    #[diagnostic(
        code(E007),
        help(
            "Instructions belong to `.text`, data definitions to `.data`, \
            and `.bss` accepts no definitions at all."
        )
    )]
    MisplacedStatement {
        /// Source line of the offending statement.
        line: usize,
        /// What the statement was.
        what: &'static str,
        /// The section it appeared in.
        section: &'static str,
    },

    /// A data definition holds a value its width cannot store.
    #[error("line {line}: `{value}` does not fit in {width} bits")]
    #[diagnostic(code(E004), help("Narrow the value or widen the directive."))]
    ValueOutOfRange {
        /// Source line of the offending statement.
        line: usize,
        /// The value that does not fit.
        value: i64,
        /// The width of the directive, in bits.
        width: usize,
    },
}

/// Parse a whole source file into a [`Program`].
pub fn parse(source: &str) -> Result<Program, Error> {
    let mut builder = ProgramBuilder::default();

    for (index, raw_line) in source.lines().enumerate() {
        let line = index + 1;

        // Strip the comment, if any.
        let text = match raw_line.find('#') {
            Some(at) => &raw_line[..at],
            None => raw_line,
        };
        let text = text.trim();

        if text.is_empty() {
            continue;
        }

        builder.statement(text, line)?;
    }

    Ok(builder.finish())
}

/// The section statements are currently being assembled into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CurrentSection {
    Text,
    Data,
    Bss,
}

impl CurrentSection {
    fn name(self) -> &'static str {
        match self {
            Self::Text => ".text",
            Self::Data => ".data",
            Self::Bss => ".bss",
        }
    }
}

#[derive(Debug)]
struct ProgramBuilder {
    program: Program,
    section: CurrentSection,
}

impl Default for ProgramBuilder {
    fn default() -> Self {
        Self { program: Program::default(), section: CurrentSection::Text }
    }
}

impl ProgramBuilder {
    /// Dispatch one comment-stripped, trimmed, non-empty statement.
    fn statement(&mut self, text: &str, line: usize) -> Result<(), Error> {
        if let Some(rest) = text.strip_prefix('.') {
            return self.directive(rest, line);
        }

        if let Ok((rest, name)) = syntax::label(text) {
            self.label(name, line)?;

            let rest = rest.trim_start();

            // A label may be followed by another statement on the same line.
            if rest.is_empty() {
                return Ok(());
            }

            return self.statement(rest, line);
        }

        self.instruction(text, line)
    }

    fn directive(&mut self, text: &str, line: usize) -> Result<(), Error> {
        let (name, arguments) = match text.split_once(char::is_whitespace) {
            Some((name, arguments)) => (name, arguments.trim()),
            None => (text, ""),
        };

        match name {
            // The only syntax this assembler speaks anyway.
            "intel_syntax" => Ok(()),

            "globl" => match all_consuming(syntax::identifier)(arguments) {
                Ok((_, symbol)) => {
                    self.declare(symbol, Binding::Global, None);

                    Ok(())
                }
                Err(_) => Err(Error::Syntax { line, near: arguments.to_owned() }),
            },

            "text" => {
                self.section = CurrentSection::Text;

                Ok(())
            }

            "data" => {
                self.section = CurrentSection::Data;

                Ok(())
            }

            "bss" => {
                self.section = CurrentSection::Bss;

                Ok(())
            }

            "byte" => self.data_item(arguments, Width::Byte, line),
            "word" => self.data_item(arguments, Width::Word, line),
            "long" => self.data_item(arguments, Width::Dword, line),
            "quad" => self.data_item(arguments, Width::Qword, line),

            _ => Err(Error::UnknownDirective { line, name: name.to_owned() }),
        }
    }

    fn data_item(&mut self, arguments: &str, width: Width, line: usize) -> Result<(), Error> {
        if self.section != CurrentSection::Data {
            return Err(Error::MisplacedStatement {
                line,
                what: "a data definition",
                section: self.section.name(),
            });
        }

        let value = match all_consuming(syntax::integer)(arguments) {
            Ok((_, value)) => value,
            Err(_) => return Err(Error::Syntax { line, near: arguments.to_owned() }),
        };

        if !width.holds(value) {
            return Err(Error::ValueOutOfRange { line, value, width: width.size() * 8 });
        }

        self.program.data.push(DataItem { value, width, line });

        Ok(())
    }

    fn label(&mut self, name: &str, line: usize) -> Result<(), Error> {
        let site = match self.section {
            CurrentSection::Text => DefinitionSite::Operation(self.program.operations.len()),
            CurrentSection::Data => DefinitionSite::DataItem(self.program.data.len()),
            CurrentSection::Bss => {
                return Err(Error::MisplacedStatement {
                    line,
                    what: "a label",
                    section: self.section.name(),
                })
            }
        };

        self.declare(name, Binding::Local, Some(site));

        Ok(())
    }

    fn instruction(&mut self, text: &str, line: usize) -> Result<(), Error> {
        if self.section != CurrentSection::Text {
            return Err(Error::MisplacedStatement {
                line,
                what: "an instruction",
                section: self.section.name(),
            });
        }

        let (rest, name) = syntax::identifier(text)
            .map_err(|_| Error::Syntax { line, near: text.to_owned() })?;

        let mnemonic = MNEMONICS
            .iter()
            .find(|(spelling, _)| *spelling == name)
            .map(|(_, mnemonic)| *mnemonic)
            .ok_or_else(|| Error::UnknownMnemonic { line, name: name.to_owned() })?;

        let rest = rest.trim();
        let operands = if rest.is_empty() {
            Vec::new()
        } else {
            match all_consuming(syntax::operands)(rest) {
                Ok((_, operands)) => operands,
                Err(_) => return Err(Error::Syntax { line, near: rest.to_owned() }),
            }
        };

        self.program.operations.push(Operation { mnemonic, operands, line });

        Ok(())
    }

    /// Record a mention of a symbol, merging with an earlier mention of the
    /// same name: the strongest binding wins, and definition sites
    /// accumulate.
    fn declare(&mut self, name: &str, binding: Binding, site: Option<DefinitionSite>) {
        match self.program.symbols.iter_mut().find(|symbol| symbol.name == name) {
            Some(declaration) => {
                if binding == Binding::Global {
                    declaration.binding = Binding::Global;
                }

                declaration.sites.extend(site);
            }

            None => self.program.symbols.push(SymbolDeclaration {
                name: name.to_owned(),
                binding,
                sites: site.into_iter().collect(),
            }),
        }
    }

    fn finish(self) -> Program {
        self.program
    }
}
