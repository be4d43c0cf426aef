//! Stream reassembly: recovering stuffed frames from a byte stream.
//!
//! The channel delivers bytes in arbitrary chunks. The reassembler keeps one
//! receive buffer, appends each delivered chunk, and extracts every complete
//! stuffed frame it can find.
//!
//! # Design
//!
//! - **Jam notifications**: every 4-byte `0xFF` run in a delivered chunk is
//!   a jam from the peer's MAC; the run is removed and the bytes around it
//!   are kept. `0xFF` never appears unescaped inside a frame.
//! - **Resynchronization**: a chunk that starts with a start flag while the
//!   buffer holds partial data means the partial frame was aborted; the
//!   stale buffer is discarded first.
//! - **Frame boundaries**: a frame ends at an end flag and starts at the
//!   last start flag before it. Neither flag can appear inside a stuffed
//!   body, so a retransmission that follows an aborted partial frame is
//!   found intact.
//!
//! # Memory Bounds
//!
//! After extraction, bytes before the last start flag can never belong to a
//! frame and are dropped, so the buffer holds at most one partial frame
//! (plus whatever of it has been received so far).
//!
//! # Thread Safety
//!
//! This structure is NOT thread-safe. The receive path gives it a single
//! owner that drains the channel's chunk queue.

use std::ops::Range;

use crate::frame::{is_valid_frame, END_FLAG, START_FLAG};
use crate::stuffing::JAM_BYTE;

/// The 32-bit jam signal written after a collision.
pub const JAM_SIGNAL: [u8; 4] = [JAM_BYTE; 4];

/// Locate the first complete stuffed frame in `buffer`.
///
/// # Returns
/// The frame's byte range (start flag through end flag inclusive), or
/// `None` when no end flag closes a structurally valid frame yet.
pub fn find_complete_frame(buffer: &[u8]) -> Option<Range<usize>> {
    let mut start = None;

    for (i, &byte) in buffer.iter().enumerate() {
        match byte {
            START_FLAG => start = Some(i),
            END_FLAG => {
                if let Some(s) = start {
                    if is_valid_frame(&buffer[s..=i]) {
                        return Some(s..i + 1);
                    }
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove every jam run from `chunk`.
///
/// # Returns
/// The remaining bytes and the number of jam signals removed.
pub fn strip_jams(chunk: &[u8]) -> (Vec<u8>, usize) {
    let mut kept = Vec::with_capacity(chunk.len());
    let mut jams = 0;

    let mut i = 0;
    while i < chunk.len() {
        if chunk[i..].starts_with(&JAM_SIGNAL) {
            jams += 1;
            i += JAM_SIGNAL.len();
        } else {
            kept.push(chunk[i]);
            i += 1;
        }
    }

    (kept, jams)
}

/// What one delivered chunk produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Jam signals removed from the chunk
    pub jams: usize,

    /// True if the stale buffer was dropped before appending
    pub resynced: bool,

    /// Complete stuffed frames, in stream order
    pub frames: Vec<Vec<u8>>,

    /// Bytes dropped because they could not belong to any frame
    pub discarded: usize,
}

/// Single-owner receive buffer.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buffer: Vec<u8>,
    stats: ReassemblerStats,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delivered chunk and extract every complete frame.
    pub fn push(&mut self, chunk: &[u8]) -> PushOutcome {
        let mut outcome = PushOutcome::default();

        if chunk.first() == Some(&START_FLAG) && !self.buffer.is_empty() {
            outcome.discarded += self.buffer.len();
            outcome.resynced = true;
            self.buffer.clear();
            self.stats.resyncs += 1;
        }

        let (bytes, jams) = strip_jams(chunk);
        outcome.jams = jams;
        self.buffer.extend_from_slice(&bytes);

        while let Some(range) = find_complete_frame(&self.buffer) {
            outcome.discarded += range.start;
            outcome.frames.push(self.buffer[range.clone()].to_vec());
            self.buffer.drain(..range.end);
        }

        // Anything before the last start flag is garbage or an aborted frame.
        let keep_from = self
            .buffer
            .iter()
            .rposition(|&b| b == START_FLAG)
            .unwrap_or(self.buffer.len());
        outcome.discarded += keep_from;
        self.buffer.drain(..keep_from);

        self.stats.chunks += 1;
        self.stats.jams += jams as u64;
        self.stats.frames += outcome.frames.len() as u64;
        self.stats.discarded_bytes += outcome.discarded as u64;

        outcome
    }

    /// Bytes waiting for the rest of their frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial frame.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn stats(&self) -> ReassemblerStats {
        self.stats
    }
}

/// Counters accumulated across pushes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReassemblerStats {
    /// Chunks delivered
    pub chunks: u64,

    /// Jam signals seen
    pub jams: u64,

    /// Frames extracted
    pub frames: u64,

    /// Buffer resets caused by a chunk starting a new frame
    pub resyncs: u64,

    /// Bytes thrown away (garbage, aborted frames)
    pub discarded_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::stuffing::stuff;

    fn wire(total: u8, sequence: u8, payload: &[u8]) -> Vec<u8> {
        stuff(&Frame::new(total, sequence, payload.to_vec()).unwrap().serialize())
    }

    #[test]
    fn test_find_single_frame() {
        let frame = wire(1, 1, b"HI");
        assert_eq!(find_complete_frame(&frame), Some(0..frame.len()));
        assert_eq!(find_complete_frame(&frame[..frame.len() - 1]), None);
    }

    #[test]
    fn test_find_skips_short_candidates() {
        let frame = wire(1, 1, b"HI");
        let mut buffer = vec![START_FLAG, END_FLAG];
        buffer.extend_from_slice(&frame);
        assert_eq!(find_complete_frame(&buffer), Some(2..2 + frame.len()));
    }

    #[test]
    fn test_find_uses_last_start_flag() {
        let frame = wire(2, 1, b"data");
        // Aborted partial transmission of the same frame, then the retry.
        let mut buffer = frame[..3].to_vec();
        buffer.extend_from_slice(&frame);
        assert_eq!(find_complete_frame(&buffer), Some(3..3 + frame.len()));
    }

    #[test]
    fn test_strip_jams() {
        let (kept, jams) = strip_jams(&[1, 0xFF, 0xFF, 0xFF, 0xFF, 2, 0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(kept, vec![1, 2]);
        assert_eq!(jams, 2);

        let (kept, jams) = strip_jams(&[0xFF, 0xFF, 0xFF, 7]);
        assert_eq!(kept, vec![0xFF, 0xFF, 0xFF, 7]);
        assert_eq!(jams, 0);
    }

    #[test]
    fn test_push_byte_by_byte() {
        let frame = wire(1, 1, b"hello");
        let mut reassembler = StreamReassembler::new();

        let mut extracted = Vec::new();
        for &byte in &frame {
            extracted.extend(reassembler.push(&[byte]).frames);
        }

        assert_eq!(extracted, vec![frame]);
        assert_eq!(reassembler.buffered(), 0);
    }

    #[test]
    fn test_push_two_frames_in_one_chunk() {
        let first = wire(2, 1, b"ab");
        let second = wire(2, 2, b"cd");
        let mut chunk = first.clone();
        chunk.extend_from_slice(&second);

        let outcome = StreamReassembler::new().push(&chunk);
        assert_eq!(outcome.frames, vec![first, second]);
        assert_eq!(outcome.discarded, 0);
    }

    #[test]
    fn test_push_jam_between_partial_and_retry() {
        let frame = wire(1, 1, b"collide");
        let mut reassembler = StreamReassembler::new();

        // Two bytes go out, collision, jam, then the full retry.
        assert!(reassembler.push(&frame[..2]).frames.is_empty());
        let jam = reassembler.push(&JAM_SIGNAL);
        assert_eq!(jam.jams, 1);
        assert!(jam.frames.is_empty());

        let retry = reassembler.push(&frame);
        assert!(retry.resynced);
        assert_eq!(retry.frames, vec![frame]);
        assert_eq!(reassembler.stats().resyncs, 1);
    }

    #[test]
    fn test_push_drops_garbage() {
        let frame = wire(1, 1, b"ok");
        let mut reassembler = StreamReassembler::new();

        let garbage = reassembler.push(&[0x01, 0x02, 0x03]);
        assert_eq!(garbage.discarded, 3);
        assert_eq!(reassembler.buffered(), 0);

        let mut chunk = vec![0x42, 0x43];
        chunk.extend_from_slice(&frame);
        let outcome = reassembler.push(&chunk);
        assert_eq!(outcome.frames, vec![frame]);
        assert_eq!(outcome.discarded, 2);
    }

    #[test]
    fn test_escaped_jam_byte_is_not_a_jam() {
        let frame = wire(1, 1, &[0xFF; 8]);
        let outcome = StreamReassembler::new().push(&frame);
        assert_eq!(outcome.jams, 0);
        assert_eq!(outcome.frames, vec![frame]);
    }
}
