//! Extended Hamming (SECDED) frame check sequence.
//!
//! The FCS protects a frame payload without interleaving: data bits keep
//! their natural order and are numbered 1..=n (MSB of byte 0 is position 1).
//! Control bit `i` is the XOR of every data bit whose position has bit `i`
//! set, so a single flipped data bit at position `p` makes the recomputed
//! control bits differ from the received ones in exactly the bits of `p`
//! (the syndrome). One trailing overall parity bit, taken over all data and
//! control bits, separates single errors (parity mismatch) from double
//! errors (parity match, non-zero syndrome).
//!
//! # FCS Layout
//!
//! ```text
//! [c0 c1 ... c(k-1) P 0 0 ...]   MSB-first, zero padded to whole bytes
//! ```
//!
//! where `k = control_bit_count(payload_len)` and `P` is overall parity.
//!
//! | payload bytes | k | FCS bits | FCS bytes |
//! |---------------|---|----------|-----------|
//! | 0             | 0 | 1        | 1         |
//! | 2             | 5 | 6        | 1         |
//! | 15            | 7 | 8        | 1         |
//! | 16            | 8 | 9        | 2         |
//! | 64            | 10| 11       | 2         |
//!
//! # Limits
//!
//! A flipped control bit `i` produces the same syndrome as a flipped data bit
//! at position `2^i`; the decoder always attributes it to the data bit. Only
//! payload corruption is reliably corrected.

use crate::bitio::{bit_at, bytes_to_bits, flip_bit, BitWriter};
use crate::error::{FecError, Result};

/// Number of overall parity bits appended after the control bits.
pub const OVERALL_PARITY_BITS: usize = 1;

/// Result of running [`correct`] over a received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correction {
    /// FCS matched; payload untouched.
    Clean,

    /// A single-bit error was found and fixed.
    Corrected {
        /// 1-based data bit position that was flipped back
        position: usize,
    },

    /// An error was detected that cannot be repaired; payload untouched.
    Uncorrectable {
        /// Syndrome observed (0 when only the overall parity disagreed)
        syndrome: usize,
    },
}

impl Correction {
    /// Numeric outcome: 0 clean, 1 corrected, 2 uncorrectable.
    pub fn code(&self) -> i8 {
        match self {
            Correction::Clean => 0,
            Correction::Corrected { .. } => 1,
            Correction::Uncorrectable { .. } => 2,
        }
    }

    /// True when the payload can be trusted after correction.
    pub fn is_recovered(&self) -> bool {
        !matches!(self, Correction::Uncorrectable { .. })
    }
}

/// Smallest `k` with `2^k >= payload_len * 8 + 1`.
pub fn control_bit_count(payload_len: usize) -> usize {
    let needed = payload_len * 8 + 1;
    let mut k = 0;
    while (1usize << k) < needed {
        k += 1;
    }
    k
}

/// FCS size in bytes for a payload of `payload_len` bytes.
pub fn fcs_len(payload_len: usize) -> usize {
    (control_bit_count(payload_len) + OVERALL_PARITY_BITS).div_ceil(8)
}

/// Compute the FCS (control bits + overall parity) for `payload`.
pub fn calculate_control_bits(payload: &[u8]) -> Vec<u8> {
    let k = control_bit_count(payload.len());
    let data_bits = bytes_to_bits(payload);
    let groups = parity_groups(&data_bits);

    let mut overall = odd_ones(&data_bits);
    let mut writer = BitWriter::new();
    for i in 0..k {
        let bit = (groups >> i) & 1 == 1;
        writer.write_bit(bit);
        overall ^= bit;
    }
    writer.write_bit(overall);

    writer.finish()
}

/// Recompute the FCS of `payload` and compare it byte-for-byte with `fcs`.
pub fn verify(payload: &[u8], fcs: &[u8]) -> bool {
    calculate_control_bits(payload) == fcs
}

/// Check `payload` against `fcs`, repairing a single-bit error in place.
///
/// # Errors
/// `FecError::EmptyPayload` when there is no data to check.
pub fn correct(payload: &mut [u8], fcs: &[u8]) -> Result<Correction> {
    if payload.is_empty() {
        return Err(FecError::EmptyPayload.into());
    }

    if verify(payload, fcs) {
        return Ok(Correction::Clean);
    }

    // A truncated or oversized FCS cannot be decoded against this payload.
    if fcs.len() != fcs_len(payload.len()) {
        return Ok(Correction::Uncorrectable { syndrome: 0 });
    }

    let k = control_bit_count(payload.len());
    let data_bits = bytes_to_bits(payload);
    let groups = parity_groups(&data_bits);

    let mut syndrome = 0usize;
    let mut received_parity = odd_ones(&data_bits);
    for i in 0..k {
        let received = bit_at(fcs, i)?;
        if received != ((groups >> i) & 1 == 1) {
            syndrome |= 1 << i;
        }
        received_parity ^= received;
    }
    let parity_mismatch = received_parity != bit_at(fcs, k)?;

    let outcome = match (syndrome, parity_mismatch) {
        // Only padding bits differ; data and control bits agree.
        (0, false) => Correction::Clean,
        (s, true) if (1..=data_bits.len()).contains(&s) => {
            flip_bit(payload, s - 1)?;
            Correction::Corrected { position: s }
        }
        (s, _) => Correction::Uncorrectable { syndrome: s },
    };

    Ok(outcome)
}

/// XOR of the 1-based positions of all set data bits.
///
/// Bit `i` of the result is control bit `i`.
fn parity_groups(data_bits: &[bool]) -> usize {
    data_bits
        .iter()
        .enumerate()
        .filter(|(_, &bit)| bit)
        .fold(0, |acc, (index, _)| acc ^ (index + 1))
}

fn odd_ones(bits: &[bool]) -> bool {
    bits.iter().filter(|&&bit| bit).count() % 2 == 1
}
