//! Byte stuffing for serialized frames.
//!
//! The first and last bytes of a serialized frame are its flags and travel
//! verbatim. Every interior byte from the reserved set is replaced by
//! `[ESCAPE, byte ^ MASK]`, so neither flag, the escape byte, nor the jam
//! byte can appear unescaped inside a frame body.
//!
//! | reserved | meaning      | escaped form |
//! |----------|--------------|--------------|
//! | `0x0B`   | start flag   | `7D 5B`      |
//! | `0x0C`   | end flag     | `7D 5C`      |
//! | `0x7D`   | escape       | `7D 2D`      |
//! | `0xFF`   | jam          | `7D AF`      |
//!
//! Masked bytes are never themselves reserved, so unstuffing is a single
//! left-to-right pass.

use crate::error::{FrameError, Result};
use crate::frame::{END_FLAG, START_FLAG};

/// Escape marker.
pub const ESCAPE: u8 = 0x7D;

/// XOR mask applied to escaped bytes.
pub const MASK: u8 = 0x50;

/// Byte value that makes up the jam signal.
pub const JAM_BYTE: u8 = 0xFF;

/// Bytes that must not appear unescaped between the flags.
pub const RESERVED: [u8; 4] = [START_FLAG, END_FLAG, ESCAPE, JAM_BYTE];

/// True if `byte` must be escaped inside a frame body.
pub fn is_reserved(byte: u8) -> bool {
    RESERVED.contains(&byte)
}

/// Escape the interior of a serialized frame.
pub fn stuff(frame: &[u8]) -> Vec<u8> {
    if frame.len() < 2 {
        return frame.to_vec();
    }

    let interior = &frame[1..frame.len() - 1];
    let escapes = interior.iter().filter(|&&b| is_reserved(b)).count();

    let mut out = Vec::with_capacity(frame.len() + escapes);
    out.push(frame[0]);
    for &byte in interior {
        if is_reserved(byte) {
            out.push(ESCAPE);
            out.push(byte ^ MASK);
        } else {
            out.push(byte);
        }
    }
    out.push(frame[frame.len() - 1]);

    out
}

/// Reverse [`stuff`].
///
/// # Errors
/// `FrameError::DanglingEscape` if the last interior byte is an escape.
pub fn unstuff(stuffed: &[u8]) -> Result<Vec<u8>> {
    if stuffed.len() < 2 {
        return Ok(stuffed.to_vec());
    }

    let last = stuffed.len() - 1;
    let mut out = Vec::with_capacity(stuffed.len());
    out.push(stuffed[0]);

    let mut i = 1;
    while i < last {
        if stuffed[i] == ESCAPE {
            if i + 1 >= last {
                return Err(FrameError::DanglingEscape { offset: i }.into());
            }
            out.push(stuffed[i + 1] ^ MASK);
            i += 2;
        } else {
            out.push(stuffed[i]);
            i += 1;
        }
    }
    out.push(stuffed[last]);

    Ok(out)
}
