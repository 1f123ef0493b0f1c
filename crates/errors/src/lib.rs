//! `anvil_errors` centralises the error-code catalogue of the assembler.
//!
//! Every diagnostic emitted by the other crates carries a code of kind
//! `E...` (declared with `#[diagnostic(code(E...))]` on the error variant).
//! This crate holds the long-form explanation for each code, one Markdown
//! file per code, registered into the `DIAGNOSTICS` table. A code can be
//! looked up with `Error::explain`, which backs `anvil --explain E004`,
//! à la `rustc --explain`.
//!
//! The catalogue is also part of the documentation itself: see
//! [`Diagnostics`], which has one documented variant per error code.

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod error_codes;

#[cfg(doc)]
pub use error_codes::Diagnostics;
#[cfg(feature = "diagnostics")]
pub use error_codes::DIAGNOSTICS;
pub use miette::Result;

/// Error type for this crate.
///
/// The major interest of this type is its `explain` method, which fetches
/// the diagnostic associated with a particular error code.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum Error {
    /// The given error code is invalid.
    #[error("`{0}` is not a valid error code.")]
    #[diagnostic(
        code(E000),
        help(
            "Did you mistype the error code? The pattern is `E[0-9]{{3}}`, \
            i.e. an `E` followed by 3 digits, such as `E000`."
        )
    )]
    InvalidCode(String),
}

impl Error {
    /// Given a specific error code, this method returns the associated
    /// diagnostic, if the code exists.
    ///
    /// ```
    /// # #[cfg(feature = "diagnostics")]
    /// # {
    /// use anvil_errors::Error;
    ///
    /// // Explain a valid error.
    /// assert!(Error::explain("E000").is_ok());
    ///
    /// // Explain an invalid error.
    /// assert!(Error::explain("oops").is_err());
    /// # }
    /// ```
    #[cfg(feature = "diagnostics")]
    pub fn explain(error_code: &str) -> Result<&'static str, Self> {
        DIAGNOSTICS
            .iter()
            .find_map(
                |(current_error_code, diagnostic)| {
                    if *current_error_code == error_code {
                        Some(*diagnostic)
                    } else {
                        None
                    }
                },
            )
            .ok_or(Self::InvalidCode(error_code.to_owned()))
    }
}
