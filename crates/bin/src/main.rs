//! `anvil-bin` is the executable of `anvil`.
//!
//! This crate contains all the implementation to make `anvil` an executable
//! that can be used by happy users.

mod error;

use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
    process,
};

use anvil_assembler::{target::Triple, Configuration};
use anvil_errors::Result;
use argh::FromArgs;
use error::Error;

fn default_output_file() -> PathBuf {
    PathBuf::from("a.out")
}

/// The `anvil` command is a small assembler: it reads an Intel-syntax
/// source file and produces a relocatable object file, ready for a standard
/// system linker.
#[derive(Debug, FromArgs)]
struct Anvil {
    /// explain a particular error based on its code (of kind `E...`).
    #[argh(option)]
    explain: Option<String>,

    /// target triple.
    #[argh(option, short = 't', default = "Triple::host()")]
    target: Triple,

    /// input file.
    #[argh(positional)]
    input_file: Option<PathBuf>,

    /// specify the name and location of the output file. If not specified,
    /// `a.out` is used.
    #[argh(option, short = 'o', default = "default_output_file()")]
    output_file: PathBuf,
}

impl Anvil {
    /// Creates a new `Self` type based on [`std::env::args_os`].
    fn new() -> Result<Self, Error> {
        // Collect all arguments.
        let arguments =
            env::args_os().map(OsString::into_string).collect::<Result<Vec<_>, _>>().map_err(
                |argument| Error::InvalidArgumentEncoding(argument.to_string_lossy().to_string()),
            )?;

        // Check whether `argv` is present.
        if arguments.is_empty() {
            return Err(Error::ProgramNameIsMissing);
        }

        // Extract the base command from a path.
        let command = Path::new(&arguments[0])
            .file_name()
            .and_then(|file_name| file_name.to_str())
            .unwrap_or(&arguments[0]);

        // Extract all arguments.
        let arguments =
            arguments.iter().skip(1).map(|argument| argument.as_str()).collect::<Vec<_>>();

        // Parse and build `Self`.
        match Anvil::from_args(&[command], &arguments) {
            Ok(anvil) => Ok(anvil),
            Err(early_exit) => match early_exit.status {
                // The command was parsed successfully and the early exit is due to a flag like
                // `--help` causing early exit with output.
                Ok(()) => {
                    println!("{}", early_exit.output);

                    process::exit(0);
                }

                // The arguments were not successfully parsed.
                Err(()) => Err(Error::CommandLine(early_exit.output.trim().to_string())),
            },
        }
    }
}

fn main() -> Result<()> {
    // Install the error report.
    Error::install_and_configure()?;

    // Build the command-line arguments.
    let anvil = Anvil::new()?;

    // Handle the `--explain` option.
    if let Some(error_code) = anvil.explain {
        println!("{}", Error::explain(&error_code)?);

        return Ok(());
    }

    let input_file = anvil.input_file.ok_or(Error::InputFileIsMissing)?;

    // Configure and create the assembler.
    let assembler = Configuration::new(anvil.target, input_file, anvil.output_file).assembler();

    // Take a deep breath, and here we are!
    assembler.assemble()?;

    Ok(())
}
