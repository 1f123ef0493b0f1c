//! The `Write` trait.
//!
//! The `Write` trait compiles a Rust value into a binary format.

use std::io;

use crate::Number;

/// Compile `self` down to its on-disk representation.
///
/// The `Repr` parameter disambiguates types that have more than one on-disk
/// width; for example a section index is stored as a `u16` in a symbol and
/// as a `u32` in a section header.
pub trait Write<Repr = ()> {
    /// Write `self` into the `buffer`.
    fn write<N, B>(&self, buffer: &mut B) -> io::Result<()>
    where
        N: Number,
        B: io::Write;
}
