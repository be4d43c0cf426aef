//! Message segmentation and in-order reconstruction.
//!
//! A message is cut into [`SEGMENT_SIZE`]-byte chunks, one frame each.
//! `total` and `sequence` are single bytes, so a message may span at most
//! [`MAX_FRAMES`] frames (16 320 bytes). An empty message still produces one
//! frame with an empty payload so the receiver sees a completed message.
//!
//! Frames are sent strictly in order and never retransmitted after a give-up,
//! so reconstruction appends payloads until the frame with
//! `sequence == total` arrives. A frame whose sequence is not the next one
//! expected means frames were lost: the partial message is dropped and
//! frames are skipped until a new message starts at sequence 1.

use crate::error::{Result, SegmentError};
use crate::frame::{Frame, MAX_PAYLOAD};

/// Payload bytes per frame.
pub const SEGMENT_SIZE: usize = MAX_PAYLOAD;

/// Largest frame count representable in the one-byte `total` field.
pub const MAX_FRAMES: usize = u8::MAX as usize;

/// Number of frames needed for `len` message bytes (never 0).
pub fn frame_count(len: usize) -> usize {
    len.div_ceil(SEGMENT_SIZE).max(1)
}

/// Split a message into numbered frames, computing each FCS.
///
/// # Errors
/// `SegmentError::TooManyFrames` when the message needs more than
/// [`MAX_FRAMES`] frames.
pub fn segment(message: &[u8]) -> Result<Vec<Frame>> {
    let frames = frame_count(message.len());
    if frames > MAX_FRAMES {
        return Err(SegmentError::TooManyFrames {
            len: message.len(),
            frames,
            max: MAX_FRAMES,
        }
        .into());
    }

    let total = frames as u8;
    if message.is_empty() {
        return Ok(vec![Frame::new(total, 1, Vec::new())?]);
    }

    message
        .chunks(SEGMENT_SIZE)
        .enumerate()
        .map(|(i, chunk)| Frame::new(total, (i + 1) as u8, chunk.to_vec()))
        .collect()
}

/// Frames missing between the message in progress and a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceGap {
    /// Sequence number that should have come next
    pub expected: u8,

    /// Sequence number that arrived
    pub received: u8,

    /// Frames of the abandoned partial message
    pub dropped_frames: usize,
}

/// What [`MessageAssembler::push`] did with one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembled {
    /// Whole message, when the frame was its last one
    pub message: Option<Vec<u8>>,

    /// Loss detected on arrival of the frame
    pub gap: Option<SequenceGap>,

    /// The frame belonged to a broken message and was not kept
    pub skipped: bool,
}

/// Concatenates payloads until a message completes.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buffer: Vec<u8>,
    frames: usize,
    /// Waiting for a sequence-1 frame after a gap
    resyncing: bool,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one frame's payload.
    ///
    /// A frame out of sequence drops the message in progress. It starts a new
    /// message if its sequence is 1 and is skipped otherwise.
    pub fn push(&mut self, frame: &Frame) -> Assembled {
        let mut assembled = Assembled::default();

        if self.resyncing && frame.sequence != 1 {
            assembled.skipped = true;
            return assembled;
        }
        self.resyncing = false;

        let expected = self.frames + 1;
        if usize::from(frame.sequence) != expected {
            assembled.gap = Some(SequenceGap {
                expected: expected.min(MAX_FRAMES) as u8,
                received: frame.sequence,
                dropped_frames: self.frames,
            });
            self.reset();

            if frame.sequence != 1 {
                self.resyncing = true;
                assembled.skipped = true;
                return assembled;
            }
        }

        self.buffer.extend_from_slice(&frame.payload);
        self.frames += 1;

        if frame.is_last() {
            self.frames = 0;
            assembled.message = Some(std::mem::take(&mut self.buffer));
        }
        assembled
    }

    /// Bytes collected for the message in progress.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames collected for the message in progress.
    pub fn pending_frames(&self) -> usize {
        self.frames
    }

    /// Drop the message in progress.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.frames = 0;
    }
}
