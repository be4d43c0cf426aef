//! Frame wire format.
//!
//! Each message segment travels as one delimited frame:
//!
//! # Frame Format
//!
//! ```text
//! +--------------------+
//! | start flag (1)     |  0x0B
//! +--------------------+
//! | total (1)          |  frames in the parent message, 1-255
//! +--------------------+
//! | sequence (1)       |  1-based ordinal within total
//! +--------------------+
//! | payload            |  0-64 bytes
//! | (variable)         |
//! +--------------------+
//! | FCS (1 or 2)       |  Hamming control bits + overall parity
//! +--------------------+
//! | end flag (1)       |  0x0C
//! +--------------------+
//! ```
//!
//! The payload length is not transmitted. On receipt the FCS size is
//! inferred from the frame length: more than 20 bytes means a 2-byte FCS.
//! Every payload that gets a 2-byte FCS (16 bytes and up) serializes to at
//! least 22 bytes, and every 1-byte-FCS frame to at most 20, so the rule is
//! unambiguous for frames built by [`Frame::new`].

use std::fmt;

use crate::error::{FrameError, Result};
use crate::hamming::{self, Correction};
use crate::stuffing;

/// Start-of-frame flag.
pub const START_FLAG: u8 = 0x0B;

/// End-of-frame flag.
pub const END_FLAG: u8 = 0x0C;

/// Start flag + total + sequence.
pub const HEADER_SIZE: usize = 3;

/// Header, minimal FCS and end flag.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1 + 1;

/// Largest payload carried by one frame.
pub const MAX_PAYLOAD: usize = 64;

/// Serialized frames longer than this carry a 2-byte FCS.
pub const LONG_FCS_THRESHOLD: usize = 20;

/// One segment of a message, with its FCS.
///
/// The flags are implicit: they are always [`START_FLAG`] and [`END_FLAG`]
/// on the wire and [`Frame::deserialize`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frames in the parent message
    pub total: u8,

    /// 1-based position within the message
    pub sequence: u8,

    /// Segment data
    pub payload: Vec<u8>,

    /// Hamming control block over `payload`
    pub fcs: Vec<u8>,
}

impl Frame {
    /// Build a frame and compute its FCS.
    ///
    /// # Errors
    /// `FrameError::PayloadTooLarge` when `payload` exceeds [`MAX_PAYLOAD`].
    pub fn new(total: u8, sequence: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD,
            }
            .into());
        }

        let fcs = hamming::calculate_control_bits(&payload);
        Ok(Self {
            total,
            sequence,
            payload,
            fcs,
        })
    }

    /// Serialize into the unstuffed wire layout.
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.size());

        bytes.push(START_FLAG);
        bytes.push(self.total);
        bytes.push(self.sequence);
        bytes.extend_from_slice(&self.payload);
        bytes.extend_from_slice(&self.fcs);
        bytes.push(END_FLAG);

        bytes
    }

    /// Parse an unstuffed frame.
    ///
    /// The FCS is not checked here; see [`Frame::correct`].
    ///
    /// # Errors
    /// - `FrameError::TooShort` below [`MIN_FRAME_SIZE`] bytes
    /// - `FrameError::InvalidStartFlag` / `FrameError::InvalidEndFlag`
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        check_structure(bytes)?;

        let fcs_size = if bytes.len() > LONG_FCS_THRESHOLD { 2 } else { 1 };
        let body = &bytes[HEADER_SIZE..bytes.len() - 1];
        let (payload, fcs) = body.split_at(body.len().saturating_sub(fcs_size));

        Ok(Self {
            total: bytes[1],
            sequence: bytes[2],
            payload: payload.to_vec(),
            fcs: fcs.to_vec(),
        })
    }

    /// Serialized size in bytes.
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len() + self.fcs.len() + 1
    }

    /// True when the FCS has the length its payload requires.
    pub fn is_valid(&self) -> bool {
        self.payload.len() <= MAX_PAYLOAD && self.fcs.len() == hamming::fcs_len(self.payload.len())
    }

    /// True for the frame that completes its message.
    pub fn is_last(&self) -> bool {
        self.sequence == self.total
    }

    /// Run Hamming correction over the payload in place.
    ///
    /// # Errors
    /// `FecError::EmptyPayload` for a frame without data.
    pub fn correct(&mut self) -> Result<Correction> {
        hamming::correct(&mut self.payload, &self.fcs)
    }
}

/// Structural check used by the stream scanner: length and both flags.
pub fn is_valid_frame(bytes: &[u8]) -> bool {
    check_structure(bytes).is_ok()
}

fn check_structure(bytes: &[u8]) -> Result<()> {
    if bytes.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort {
            required: MIN_FRAME_SIZE,
            actual: bytes.len(),
        }
        .into());
    }

    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if first != START_FLAG {
        return Err(FrameError::InvalidStartFlag {
            expected: START_FLAG,
            actual: first,
        }
        .into());
    }
    if last != END_FLAG {
        return Err(FrameError::InvalidEndFlag {
            expected: END_FLAG,
            actual: last,
        }
        .into());
    }

    Ok(())
}

/// Number of bytes the FCS occupies once stuffed.
pub fn stuffed_fcs_len(fcs: &[u8]) -> usize {
    fcs.iter()
        .map(|&b| if stuffing::is_reserved(b) { 2 } else { 1 })
        .sum()
}

/// Field-by-field view of a stuffed frame, for the transmit inspector.
///
/// Escaped header bytes are shown as their two-byte wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    pub start: u8,
    pub total: Vec<u8>,
    pub sequence: Vec<u8>,
    pub payload: Vec<u8>,
    pub fcs: Vec<u8>,
    pub end: u8,
}

impl FrameLayout {
    /// Split a stuffed frame into its fields.
    ///
    /// # Arguments
    /// - `stuffed`: one frame as written to the wire
    /// - `stuffed_fcs_len`: FCS size on the wire (see [`stuffed_fcs_len`])
    ///
    /// # Errors
    /// Structural errors as for [`Frame::deserialize`], or `TooShort` when the
    /// header and FCS do not fit.
    pub fn from_stuffed(stuffed: &[u8], stuffed_fcs_len: usize) -> Result<Self> {
        check_structure(stuffed)?;

        let mut cursor = 1;
        let total = take_field(stuffed, &mut cursor);
        let sequence = take_field(stuffed, &mut cursor);

        let fcs_start = stuffed.len() - 1 - stuffed_fcs_len.min(stuffed.len() - 1);
        if cursor > fcs_start {
            return Err(FrameError::TooShort {
                required: cursor + stuffed_fcs_len + 1,
                actual: stuffed.len(),
            }
            .into());
        }

        Ok(Self {
            start: stuffed[0],
            total,
            sequence,
            payload: stuffed[cursor..fcs_start].to_vec(),
            fcs: stuffed[fcs_start..stuffed.len() - 1].to_vec(),
            end: stuffed[stuffed.len() - 1],
        })
    }

    /// Render a stuffed frame as an indented hex dump.
    pub fn describe(stuffed: &[u8], stuffed_fcs_len: usize) -> Result<String> {
        Ok(Self::from_stuffed(stuffed, stuffed_fcs_len)?.to_string())
    }
}

/// One header byte, or two when it was escaped.
fn take_field(stuffed: &[u8], cursor: &mut usize) -> Vec<u8> {
    let width = if stuffed[*cursor] == stuffing::ESCAPE { 2 } else { 1 };
    let end = (*cursor + width).min(stuffed.len() - 1);
    let field = stuffed[*cursor..end].to_vec();
    *cursor = end;
    field
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

impl fmt::Display for FrameLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  start flag:  0x{:02x}", self.start)?;
        writeln!(f, "  total:       {}", hex(&self.total))?;
        writeln!(f, "  sequence:    {}", hex(&self.sequence))?;
        write!(f, "  payload:     ")?;
        for (i, row) in self.payload.chunks(16).enumerate() {
            if i > 0 {
                write!(f, "\n               ")?;
            }
            write!(f, "{}", hex(row))?;
        }
        writeln!(f)?;
        writeln!(f, "  FCS:         {}", hex(&self.fcs))?;
        write!(f, "  end flag:    0x{:02x}", self.end)
    }
}
