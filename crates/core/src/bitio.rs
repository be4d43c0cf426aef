//! Bit-level helpers for the Hamming codec.
//!
//! The FEC works on individual data bits, so payloads are expanded into bit
//! vectors and control bits are packed back into bytes. Everything here is
//! MSB-first: bit 0 is the most significant bit of byte 0.
//!
//! # Padding Rules
//! - BitWriter: pads the final partial byte with trailing zeros
//! - BitReader: padding bits are indistinguishable from data; the caller
//!   tracks how many bits are meaningful
//!
//! # Example
//! ```
//! use framelink_core::bitio::{BitWriter, BitReader};
//!
//! let mut writer = BitWriter::new();
//! for bit in [true, false, true] {
//!     writer.write_bit(bit);
//! }
//! // 101 -> padded to 10100000
//!
//! let bytes = writer.finish();
//! assert_eq!(bytes, vec![0b1010_0000]);
//!
//! let mut reader = BitReader::new(&bytes);
//! assert!(reader.read_bit().unwrap());
//! assert!(!reader.read_bit().unwrap());
//! ```

use crate::error::{BitIoError, Result};

/// Packs bits MSB-first into a byte buffer.
///
/// # Invariants
/// - `bit_count` is always < 8
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Completed bytes
    bytes: Vec<u8>,
    /// Accumulator for the current partial byte (MSB-aligned)
    current: u8,
    /// Number of bits already placed in `current` (0-7)
    bit_count: u8,
}

impl BitWriter {
    /// Create a new BitWriter with empty output.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a single bit.
    pub fn write_bit(&mut self, bit: bool) {
        if bit {
            self.current |= 0x80 >> self.bit_count;
        }
        self.bit_count += 1;

        if self.bit_count == 8 {
            self.bytes.push(self.current);
            self.current = 0;
            self.bit_count = 0;
        }
    }

    /// Finish writing and return the output bytes, zero padded.
    pub fn finish(mut self) -> Vec<u8> {
        if self.bit_count > 0 {
            self.bytes.push(self.current);
        }
        self.bytes
    }
}

/// Reads bits MSB-first from a byte buffer.
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    /// Source data
    data: &'a [u8],
    /// Current bit position (0 = MSB of first byte)
    position: usize,
}

impl<'a> BitReader<'a> {
    /// Create a new BitReader for the given data.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Read a single bit.
    ///
    /// # Errors
    /// `BitIoError::UnexpectedEof` when the buffer is exhausted.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.position >= self.data.len() * 8 {
            return Err(BitIoError::UnexpectedEof.into());
        }

        let byte = self.data[self.position / 8];
        let bit = (byte >> (7 - self.position % 8)) & 1 == 1;
        self.position += 1;
        Ok(bit)
    }
}

/// Expand bytes into one `bool` per bit, MSB-first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<bool> {
    let mut reader = BitReader::new(bytes);
    std::iter::from_fn(|| reader.read_bit().ok()).collect()
}

/// Read the bit at `index` (MSB-first numbering across the buffer).
pub fn bit_at(bytes: &[u8], index: usize) -> Result<bool> {
    let len = bytes.len() * 8;
    if index >= len {
        return Err(BitIoError::IndexOutOfRange { index, len }.into());
    }
    Ok((bytes[index / 8] >> (7 - index % 8)) & 1 == 1)
}

/// Invert the bit at `index` (MSB-first numbering across the buffer).
pub fn flip_bit(bytes: &mut [u8], index: usize) -> Result<()> {
    let len = bytes.len() * 8;
    if index >= len {
        return Err(BitIoError::IndexOutOfRange { index, len }.into());
    }
    bytes[index / 8] ^= 0x80 >> (index % 8);
    Ok(())
}
