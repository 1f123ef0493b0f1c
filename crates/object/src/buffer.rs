//! A growable byte sink for section bodies.

use std::{cmp, io};

/// Growth quantum for the underlying allocation.
const GROWTH_QUANTUM: usize = 1024;

/// A growable byte buffer with in-place patching.
///
/// Section bodies are accumulated in a `ByteBuffer` so that later stages can
/// come back and [`patch`][ByteBuffer::patch] bytes that were emitted as
/// placeholders, typically PC-relative displacements that are only known
/// once every instruction has an address.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ByteBuffer {
    bytes: Vec<u8>,
}

impl ByteBuffer {
    /// Create a new, empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `bytes` at the end of the buffer, and return the new size.
    ///
    /// The allocation grows geometrically: either it doubles, or it rounds
    /// the required size up to the growth quantum, whichever is larger.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        let required = self.bytes.len() + bytes.len();

        if required > self.bytes.capacity() {
            let target = cmp::max(
                self.bytes.capacity() * 2,
                (required + (GROWTH_QUANTUM - 1)) & !(GROWTH_QUANTUM - 1),
            );
            self.bytes.reserve_exact(target - self.bytes.len());
        }

        self.bytes.extend_from_slice(bytes);

        self.bytes.len()
    }

    /// Overwrite `bytes.len()` bytes at `offset`.
    ///
    /// `patch` never grows the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `offset + bytes.len()` exceeds the current size; patching
    /// bytes that were never emitted is a programming error.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.bytes[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    /// Current size, in bytes.
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// View the accumulated bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume the buffer and get the accumulated bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

impl io::Write for ByteBuffer {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.append(bytes);

        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
