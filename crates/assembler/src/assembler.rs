use miette::Diagnostic;
use thiserror::Error;

#[allow(unused)]
use crate::target::{Architecture, BinaryFormat, Triple};
use crate::Configuration;

/// The assembler, configured and ready to run.
#[derive(Debug)]
pub struct Assembler {
    configuration: Configuration,
}

/// Errors of the outer driver.
#[derive(Debug, Diagnostic, Error)]
pub enum Error {
    /// The target asks for an object-file format other than ELF.
    #[error(
        "I understand the `{0}` target triple, but I unfortunately don't \
        support its binary format, `{}`.",
        .0.binary_format
    )]
    #[diagnostic(
        code(E002),
        help("Only ELF output is supported. Maybe try another target with `anvil --target <target>`?")
    )]
    UnsupportedBinaryFormat(Triple),

    /// The target asks for machine code other than x86-64.
    #[error(
        "I understand the `{0}` target triple, but I only emit `x86_64` \
        machine code, not `{}`.",
        .0.architecture
    )]
    #[diagnostic(
        code(E003),
        help("Use an `x86_64-*` target with `anvil --target <target>`.")
    )]
    UnsupportedArchitecture(Triple),

    /// An error from the `elf64` driver.
    #[cfg(feature = "elf64")]
    #[error(transparent)]
    #[diagnostic(transparent)]
    Elf64(#[from] crate::elf64::Error),
}

impl Assembler {
    pub(crate) fn with_configuration(configuration: Configuration) -> Self {
        Self { configuration }
    }

    /// Run the whole assembly: read, parse, encode, resolve, lay out, write.
    pub fn assemble(self) -> Result<(), Error> {
        match self.configuration.target.binary_format {
            #[cfg(feature = "elf64")]
            BinaryFormat::Elf => {
                if self.configuration.target.architecture != Architecture::X86_64 {
                    return Err(Error::UnsupportedArchitecture(self.configuration.target));
                }

                Ok(crate::elf64::assemble(self.configuration)?)
            }

            _ => Err(Error::UnsupportedBinaryFormat(self.configuration.target)),
        }
    }
}
