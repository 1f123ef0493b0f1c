//! `anvil_object` describes and emits object file binary formats, like
//! `elf64`.
//!
//! The crate is write-only: it models the on-disk structures of an object
//! file (headers, symbols, relocation records, string tables) as plain Rust
//! values and compiles them down to bytes through the [`Write`] trait,
//! generic over the byte order via [`Number`].

#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::missing_crate_level_docs)]
#![deny(rustdoc::invalid_codeblock_attributes)]
#![deny(rustdoc::invalid_rust_codeblocks)]

mod buffer;
mod endianness;
mod write;

#[cfg(feature = "elf64")]
pub mod elf64;

pub use buffer::*;
pub use endianness::*;
pub use write::*;
