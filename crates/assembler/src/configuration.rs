use std::path::PathBuf;

use target_lexicon::Triple;

use crate::Assembler;

/// Everything the assembler needs to know before it runs: the target triple,
/// the input source file, and the output object file.
#[derive(Debug)]
pub struct Configuration {
    pub(crate) target: Triple,
    pub(crate) input_file: PathBuf,
    pub(crate) output_file: PathBuf,
}

impl Configuration {
    /// Create a new `Configuration`.
    pub fn new(target: Triple, input_file: PathBuf, output_file: PathBuf) -> Self {
        Self { target, input_file, output_file }
    }

    /// Consume the configuration and get an [`Assembler`].
    pub fn assembler(self) -> Assembler {
        Assembler::with_configuration(self)
    }
}
