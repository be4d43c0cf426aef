//! Error types for the framelink system.
//!
//! Every failure on the link is local and recoverable: operations return
//! structured errors (or typed status values) instead of panicking, and the
//! orchestration layer decides whether to log, count, or skip.

use thiserror::Error;

/// Top-level error type for all operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Bit I/O: expanding or packing FEC bit vectors
/// - Frame: wire layout validation
/// - FEC: Hamming correction preconditions
/// - Segment: message too large to number with one-byte counters
/// - Channel: the duplex byte channel collaborator
/// - Transcode: text to wire-encoding conversion
/// - I/O: spawning worker threads
#[derive(Debug, Error)]
pub enum Error {
    /// Bit I/O operation failed
    #[error("bit I/O error: {0}")]
    BitIo(#[from] BitIoError),

    /// Frame layout error (bad flags, undersized buffer)
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Hamming FEC error
    #[error("FEC error: {0}")]
    Fec(#[from] FecError),

    /// Segmentation error
    #[error("segmentation error: {0}")]
    Segment(#[from] SegmentError),

    /// Duplex channel error
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Text transcoding error
    #[error("transcoding error: {0}")]
    Transcode(#[from] TranscodeError),

    /// OS-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Bit-level I/O errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BitIoError {
    /// Attempted to read past the end of the buffer
    #[error("unexpected end of bit stream")]
    UnexpectedEof,

    /// Bit index outside the buffer
    #[error("bit index {index} out of range for {len} bits")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Frame layout errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer shorter than header + minimal FCS + trailer
    #[error("frame too short: need at least {required} bytes, got {actual}")]
    TooShort { required: usize, actual: usize },

    /// First byte is not the start flag
    #[error("invalid start flag: expected {expected:#04x}, got {actual:#04x}")]
    InvalidStartFlag { expected: u8, actual: u8 },

    /// Last byte is not the end flag
    #[error("invalid end flag: expected {expected:#04x}, got {actual:#04x}")]
    InvalidEndFlag { expected: u8, actual: u8 },

    /// Payload larger than one segment
    #[error("payload of {len} bytes exceeds the {max}-byte frame limit")]
    PayloadTooLarge { len: usize, max: usize },

    /// Escape byte in the last interior position with nothing to unescape
    #[error("dangling escape byte at offset {offset}")]
    DanglingEscape { offset: usize },
}

/// Hamming FEC errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FecError {
    /// Correction requested on an empty payload
    #[error("empty payload: nothing to correct")]
    EmptyPayload,
}

impl FecError {
    /// Numeric outcome code used by the status reporting (`-1`).
    pub fn code(&self) -> i8 {
        match self {
            FecError::EmptyPayload => -1,
        }
    }
}

/// Segmentation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SegmentError {
    /// The message needs more frames than the one-byte `total` field can count
    #[error("message of {len} bytes needs {frames} frames, maximum is {max}")]
    TooManyFrames { len: usize, frames: usize, max: usize },
}

/// Duplex channel errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Operation requires an open channel
    #[error("channel is not open")]
    NotOpen,

    /// The endpoint could not be opened
    #[error("cannot open endpoint {endpoint}: {reason}")]
    OpenFailed { endpoint: String, reason: String },

    /// A raw write did not complete
    #[error("write of {len} bytes failed")]
    WriteFailed { len: usize },

    /// An asynchronous reader is already running
    #[error("asynchronous reading already started")]
    AlreadyReading,

    /// The peer endpoint has gone away
    #[error("peer disconnected")]
    Disconnected,
}

/// Text transcoding errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranscodeError {
    /// A character has no representation in the wire encoding
    #[error("character {ch:?} at index {index} is not representable in {encoding}")]
    Unmappable {
        ch: char,
        index: usize,
        encoding: &'static str,
    },
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::InvalidStartFlag {
            expected: 0x0B,
            actual: 0x42,
        };
        let msg = err.to_string();
        assert!(msg.contains("0x0b"));
        assert!(msg.contains("0x42"));
    }

    #[test]
    fn test_empty_payload_code() {
        assert_eq!(FecError::EmptyPayload.code(), -1);
    }

    #[test]
    fn test_from_conversions() {
        let err: Error = ChannelError::NotOpen.into();
        assert!(matches!(err, Error::Channel(ChannelError::NotOpen)));

        let err: Error = SegmentError::TooManyFrames {
            len: 20_000,
            frames: 313,
            max: 255,
        }
        .into();
        assert!(err.to_string().contains("313"));
    }
}
