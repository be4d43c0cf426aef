//! Send and receive paths of one link endpoint.
//!
//! # Send
//!
//! ```text
//! text -> transcode -> segment -> serialize (+FCS) -> stuff -> MAC / write
//! ```
//!
//! A whole message is handed to a dedicated worker thread. The worker holds
//! the medium access controller for the duration of the message, so frames
//! go out strictly in order and each is resolved (delivered or abandoned)
//! before the next one starts.
//!
//! # Receive
//!
//! ```text
//! channel reader -> queue -> LinkReceiver (reassemble, unstuff,
//!                            deserialize, inject faults, correct, join)
//! ```
//!
//! The receiver is the single owner of the stream buffer. It turns every
//! delivered chunk into a list of [`ReceiveEvent`]s for the presentation
//! layer. Nothing on this path is fatal: malformed frames are reported and
//! skipped, uncorrectable payloads are delivered with their status.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::channel::DuplexChannel;
use crate::error::{Error, FecError, Result};
use crate::fault::FaultInjector;
use crate::frame::{stuffed_fcs_len, Frame, FrameLayout};
use crate::hamming::Correction;
use crate::mac::{MacConfig, MacStats, MacStatsSnapshot, MediumAccessController, TransmitOutcome};
use crate::metrics::LinkMetrics;
use crate::random::SeededRandom;
use crate::reassembly::StreamReassembler;
use crate::segment::{self, MessageAssembler, SequenceGap};
use crate::stuffing;
use crate::transcode::Transcoder;

/// Pause between consecutive frames of one message.
pub const DEFAULT_INTER_FRAME_GAP: Duration = Duration::from_millis(10);

/// Link-level configuration shared by both directions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinkConfig {
    /// Route frames through CSMA/CD and corrupt received payloads
    pub emulation: bool,

    /// Receive-side bit errors while emulating (ignored otherwise)
    pub fault_injection: bool,

    /// Pause after every frame of a message
    pub inter_frame_gap: Duration,

    /// Medium access parameters
    pub mac: MacConfig,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            emulation: false,
            fault_injection: true,
            inter_frame_gap: DEFAULT_INTER_FRAME_GAP,
            mac: MacConfig::default(),
        }
    }
}

impl LinkConfig {
    /// Faults are only injected on an emulated medium.
    pub fn injects_faults(&self) -> bool {
        self.emulation && self.fault_injection
    }
}

/// A frame ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub frame: Frame,

    /// Stuffed wire bytes
    pub stuffed: Vec<u8>,

    /// FCS size once stuffed
    pub stuffed_fcs_len: usize,
}

impl OutgoingFrame {
    fn from_frame(frame: Frame) -> Self {
        let stuffed = stuffing::stuff(&frame.serialize());
        let stuffed_fcs_len = stuffed_fcs_len(&frame.fcs);
        Self {
            frame,
            stuffed,
            stuffed_fcs_len,
        }
    }
}

/// What happened to one frame of a sent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub sequence: u8,
    pub total: u8,

    /// True if every byte reached the channel
    pub delivered: bool,

    /// Transmission attempts used
    pub attempts: u32,

    /// Stuffed wire bytes
    pub stuffed: Vec<u8>,

    pub stuffed_fcs_len: usize,
}

impl FrameReport {
    /// Per-field hex dump of the transmitted frame.
    pub fn layout(&self) -> Result<String> {
        FrameLayout::describe(&self.stuffed, self.stuffed_fcs_len)
    }
}

/// Outcome of a whole-message send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReport {
    pub frames: Vec<FrameReport>,
}

impl SendReport {
    /// Frames that reached the channel.
    pub fn delivered(&self) -> usize {
        self.frames.iter().filter(|f| f.delivered).count()
    }

    /// True when no frame was abandoned.
    pub fn is_complete(&self) -> bool {
        self.frames.iter().all(|f| f.delivered)
    }
}

/// Join handle for a send in progress.
#[derive(Debug)]
pub struct SendHandle {
    handle: JoinHandle<SendReport>,
}

impl SendHandle {
    /// Wait for the worker to finish.
    ///
    /// # Errors
    /// `Error::Io` if the worker panicked.
    pub fn join(self) -> Result<SendReport> {
        self.handle
            .join()
            .map_err(|_| Error::Io(std::io::Error::other("send worker panicked")))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Transmit side of a link endpoint.
pub struct LinkSender {
    channel: Arc<dyn DuplexChannel>,
    mac: Arc<Mutex<MediumAccessController>>,
    mac_stats: Arc<MacStats>,
    transcoder: Arc<dyn Transcoder>,
    config: LinkConfig,
    metrics: Arc<LinkMetrics>,
}

impl LinkSender {
    /// Create a sender with a controller built from `config.mac`.
    ///
    /// # Errors
    /// `Error::Config` when the MAC parameters are out of range.
    pub fn new(
        channel: Arc<dyn DuplexChannel>,
        transcoder: Arc<dyn Transcoder>,
        config: LinkConfig,
        metrics: Arc<LinkMetrics>,
    ) -> Result<Self> {
        config.mac.validate()?;
        let mac = MediumAccessController::new(config.mac);
        Ok(Self::with_controller(channel, transcoder, config, metrics, mac))
    }

    /// Create a sender around an existing controller.
    pub fn with_controller(
        channel: Arc<dyn DuplexChannel>,
        transcoder: Arc<dyn Transcoder>,
        config: LinkConfig,
        metrics: Arc<LinkMetrics>,
        mut mac: MediumAccessController,
    ) -> Self {
        mac.set_emulation_enabled(config.emulation);
        let mac_stats = mac.stats_handle();

        Self {
            channel,
            mac: Arc::new(Mutex::new(mac)),
            mac_stats,
            transcoder,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Contention counters, readable while a send is running.
    pub fn mac_stats(&self) -> MacStatsSnapshot {
        self.mac_stats.snapshot()
    }

    /// True while the controller is writing a jam signal.
    pub fn jam_signal(&self) -> bool {
        self.mac_stats.jam_active()
    }

    /// Zero the contention counters. Blocks while a send is running.
    pub fn reset_statistics(&self) {
        lock(&self.mac).reset_statistics();
    }

    /// Turn the emulated medium on or off for subsequent sends.
    pub fn set_emulation_enabled(&mut self, enabled: bool) {
        self.config.emulation = enabled;
        lock(&self.mac).set_emulation_enabled(enabled);
    }

    /// Build the stuffed frames for `text` without sending them.
    ///
    /// # Errors
    /// Transcoding failures and messages too long to number.
    pub fn prepare(&self, text: &str) -> Result<Vec<OutgoingFrame>> {
        let wire = self.transcoder.to_wire(text)?;
        let frames = segment::segment(&wire)?;

        let outgoing: Vec<OutgoingFrame> = frames.into_iter().map(OutgoingFrame::from_frame).collect();
        for out in &outgoing {
            debug!(
                sequence = out.frame.sequence,
                total = out.frame.total,
                payload = out.frame.payload.len(),
                stuffed = out.stuffed.len(),
                "frame built"
            );
        }
        Ok(outgoing)
    }

    /// Send `text` on a worker thread.
    ///
    /// # Errors
    /// The message is refused, and nothing is written, when it cannot be
    /// framed. `Error::Io` if the worker cannot be spawned.
    pub fn send(&self, text: &str) -> Result<SendHandle> {
        let frames = match self.prepare(text) {
            Ok(frames) => frames,
            Err(e) => {
                self.metrics.record_send_rejected();
                warn!(error = %e, "message refused");
                return Err(e);
            }
        };
        self.metrics.record_frames_built(frames.len());

        let worker = SendWorker {
            channel: Arc::clone(&self.channel),
            mac: Arc::clone(&self.mac),
            config: self.config,
            metrics: Arc::clone(&self.metrics),
        };
        let handle = thread::Builder::new()
            .name("link-sender".to_string())
            .spawn(move || worker.run(frames))?;

        Ok(SendHandle { handle })
    }

    /// Send `text` and wait for the result.
    pub fn send_blocking(&self, text: &str) -> Result<SendReport> {
        self.send(text)?.join()
    }
}

impl std::fmt::Debug for LinkSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkSender")
            .field("config", &self.config)
            .field("encoding", &self.transcoder.name())
            .finish()
    }
}

struct SendWorker {
    channel: Arc<dyn DuplexChannel>,
    mac: Arc<Mutex<MediumAccessController>>,
    config: LinkConfig,
    metrics: Arc<LinkMetrics>,
}

impl SendWorker {
    fn run(self, frames: Vec<OutgoingFrame>) -> SendReport {
        let mut mac = lock(&self.mac);
        let mut report = SendReport::default();

        for out in frames {
            let outcome = if mac.is_emulation_enabled() {
                mac.transmit(self.channel.as_ref(), &out.stuffed)
            } else {
                self.write_direct(&out.stuffed)
            };

            let (sequence, total) = (out.frame.sequence, out.frame.total);
            match outcome {
                TransmitOutcome::Delivered { attempts } => {
                    self.metrics.record_frame_sent(out.stuffed.len());
                    debug!(sequence, total, attempts, "frame sent");
                }
                TransmitOutcome::GaveUp { attempts } => {
                    self.metrics.record_frame_failed();
                    warn!(sequence, total, attempts, "frame not sent");
                }
            }

            report.frames.push(FrameReport {
                sequence,
                total,
                delivered: outcome.is_delivered(),
                attempts: outcome.attempts(),
                stuffed: out.stuffed,
                stuffed_fcs_len: out.stuffed_fcs_len,
            });

            if !self.config.inter_frame_gap.is_zero() {
                thread::sleep(self.config.inter_frame_gap);
            }
        }

        self.metrics.record_message_sent();
        info!(
            frames = report.frames.len(),
            delivered = report.delivered(),
            "message sent"
        );
        report
    }

    fn write_direct(&self, stuffed: &[u8]) -> TransmitOutcome {
        match self.channel.write(stuffed) {
            Ok(()) => TransmitOutcome::Delivered { attempts: 1 },
            Err(e) => {
                warn!(error = %e, "direct write failed");
                TransmitOutcome::GaveUp { attempts: 1 }
            }
        }
    }
}

fn lock(mac: &Mutex<MediumAccessController>) -> MutexGuard<'_, MediumAccessController> {
    mac.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// FEC status of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FecStatus {
    Checked(Correction),

    /// Nothing to check
    EmptyPayload,
}

impl FecStatus {
    /// 0 clean, 1 corrected, 2 uncorrectable, -1 empty payload.
    pub fn code(&self) -> i8 {
        match self {
            FecStatus::Checked(correction) => correction.code(),
            FecStatus::EmptyPayload => FecError::EmptyPayload.code(),
        }
    }
}

/// One observable step of the receive path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// Jam signals found in a chunk
    JamDetected { count: usize },

    /// A frame was extracted and checked.
    FrameReceived {
        sequence: u8,
        total: u8,
        /// Payload text as received, when faults were injected
        corrupted_text: Option<String>,
        /// Payload text after correction
        text: String,
        bits_injected: usize,
        fec: FecStatus,
    },

    /// The last frame of a message arrived.
    MessageComplete(String),

    /// Frames were lost and the partial message was abandoned.
    MessageDropped(SequenceGap),

    /// A delimited frame could not be decoded.
    Malformed { reason: String },
}

/// Receive side of a link endpoint.
pub struct LinkReceiver {
    reassembler: StreamReassembler,
    assembler: MessageAssembler,
    injector: Option<FaultInjector>,
    transcoder: Arc<dyn Transcoder>,
    metrics: Arc<LinkMetrics>,
}

impl LinkReceiver {
    /// Create a receiver; faults are injected when `config` emulates.
    ///
    /// The injector draws from `config.mac.seed + 1`, so a seeded run is
    /// reproducible end to end without sharing the MAC's stream.
    pub fn new(transcoder: Arc<dyn Transcoder>, config: &LinkConfig, metrics: Arc<LinkMetrics>) -> Self {
        let injector = config.injects_faults().then(|| {
            let rng = match config.mac.seed {
                Some(seed) => SeededRandom::new(seed.wrapping_add(1)),
                None => SeededRandom::from_entropy(),
            };
            FaultInjector::new(Box::new(rng))
        });
        Self::with_injector(transcoder, metrics, injector)
    }

    pub fn with_injector(
        transcoder: Arc<dyn Transcoder>,
        metrics: Arc<LinkMetrics>,
        injector: Option<FaultInjector>,
    ) -> Self {
        Self {
            reassembler: StreamReassembler::new(),
            assembler: MessageAssembler::new(),
            injector,
            transcoder,
            metrics,
        }
    }

    /// Bytes of the message in progress.
    pub fn pending_len(&self) -> usize {
        self.assembler.pending_len()
    }

    /// Process one delivered chunk.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Vec<ReceiveEvent> {
        let pushed = self.reassembler.push(chunk);
        let mut events = Vec::new();

        if pushed.resynced {
            debug!("partial frame dropped, new frame started");
        }
        if pushed.discarded > 0 {
            debug!(bytes = pushed.discarded, "discarded bytes outside frames");
        }
        if pushed.jams > 0 {
            self.metrics.record_jams_received(pushed.jams);
            warn!(count = pushed.jams, "jam signal received");
            events.push(ReceiveEvent::JamDetected { count: pushed.jams });
        }

        for stuffed in pushed.frames {
            self.handle_frame(&stuffed, &mut events);
        }

        events
    }

    fn handle_frame(&mut self, stuffed: &[u8], events: &mut Vec<ReceiveEvent>) {
        let mut frame = match stuffing::unstuff(stuffed).and_then(|raw| Frame::deserialize(&raw)) {
            Ok(frame) => frame,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, len = stuffed.len(), "malformed frame");
                events.push(ReceiveEvent::Malformed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let bits_injected = match self.injector.as_mut() {
            Some(injector) => injector.inject(&mut frame.payload),
            None => 0,
        };
        let corrupted_text = (bits_injected > 0).then(|| self.transcoder.from_wire(&frame.payload));
        self.metrics.record_bits_injected(bits_injected);

        let fec = match frame.correct() {
            Ok(correction) => {
                self.metrics.record_correction(&correction);
                FecStatus::Checked(correction)
            }
            Err(Error::Fec(FecError::EmptyPayload)) => FecStatus::EmptyPayload,
            Err(e) => {
                self.metrics.record_malformed();
                warn!(error = %e, "FEC check failed");
                events.push(ReceiveEvent::Malformed {
                    reason: e.to_string(),
                });
                return;
            }
        };
        self.metrics.record_frame_received();

        let (sequence, total) = (frame.sequence, frame.total);
        if let FecStatus::Checked(Correction::Uncorrectable { syndrome }) = fec {
            warn!(sequence, total, syndrome, "uncorrectable payload delivered as is");
        }
        debug!(sequence, total, bits_injected, outcome = fec.code(), "frame received");

        let assembled = self.assembler.push(&frame);
        if let Some(gap) = assembled.gap {
            self.metrics.record_message_dropped();
            warn!(
                expected = gap.expected,
                received = gap.received,
                frames = gap.dropped_frames,
                "sequence gap, incomplete message dropped"
            );
            events.push(ReceiveEvent::MessageDropped(gap));
        }
        if assembled.skipped {
            debug!(sequence, total, "frame of a broken message skipped");
        }

        events.push(ReceiveEvent::FrameReceived {
            sequence,
            total,
            corrupted_text,
            text: self.transcoder.from_wire(&frame.payload),
            bits_injected,
            fec,
        });

        if let Some(message) = assembled.message {
            self.metrics.record_message_received();
            let text = self.transcoder.from_wire(&message);
            info!(bytes = message.len(), frames = total, "message received");
            events.push(ReceiveEvent::MessageComplete(text));
        }
    }

    /// Consume chunks until the queue disconnects or nobody listens.
    pub fn run(mut self, chunks: Receiver<Vec<u8>>, events: Sender<ReceiveEvent>) {
        for chunk in chunks.iter() {
            for event in self.handle_chunk(&chunk) {
                if events.send(event).is_err() {
                    return;
                }
            }
        }

        let stats = self.reassembler.stats();
        info!(
            chunks = stats.chunks,
            frames = stats.frames,
            jams = stats.jams,
            resyncs = stats.resyncs,
            discarded = stats.discarded_bytes,
            "receive queue closed"
        );
    }

    /// Run the receiver on its own thread.
    pub fn spawn(self, chunks: Receiver<Vec<u8>>, events: Sender<ReceiveEvent>) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name("link-receiver".to_string())
            .spawn(move || self.run(chunks, events))?;
        Ok(handle)
    }
}

impl std::fmt::Debug for LinkReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkReceiver")
            .field("buffered", &self.reassembler.buffered())
            .field("pending", &self.assembler.pending_len())
            .field("injector", &self.injector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{LoopbackChannel, DEFAULT_BAUD_RATE};
    use crate::random::ScriptedRandom;
    use crate::transcode::{Utf8Transcoder, Windows1251Transcoder};
    use crossbeam_channel::unbounded;

    fn quick_config(emulation: bool) -> LinkConfig {
        LinkConfig {
            emulation,
            fault_injection: false,
            inter_frame_gap: Duration::ZERO,
            mac: MacConfig {
                slot_time: Duration::ZERO,
                ..MacConfig::quiet(1)
            },
        }
    }

    fn utf8() -> Arc<dyn Transcoder> {
        Arc::new(Utf8Transcoder)
    }

    fn open_pair() -> (Arc<LoopbackChannel>, Arc<LoopbackChannel>) {
        let (a, b) = LoopbackChannel::pair("loop-a", "loop-b");
        a.open("loop-a", DEFAULT_BAUD_RATE).unwrap();
        b.open("loop-b", DEFAULT_BAUD_RATE).unwrap();
        (Arc::new(a), Arc::new(b))
    }

    fn sender_on(channel: Arc<LoopbackChannel>, config: LinkConfig) -> (LinkSender, Arc<LinkMetrics>) {
        let metrics = Arc::new(LinkMetrics::new());
        let sender = LinkSender::new(channel, utf8(), config, Arc::clone(&metrics)).unwrap();
        (sender, metrics)
    }

    fn receiver() -> LinkReceiver {
        LinkReceiver::with_injector(utf8(), Arc::new(LinkMetrics::new()), None)
    }

    fn messages(events: &[ReceiveEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ReceiveEvent::MessageComplete(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_prepare_hi() {
        let (a, _b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(false));

        let frames = sender.prepare("HI").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].stuffed, vec![0x0B, 1, 1, b'H', b'I', 0x08, 0x0C]);
        assert_eq!(frames[0].stuffed_fcs_len, 1);
    }

    #[test]
    fn test_refused_message_writes_nothing() {
        let (a, _b) = open_pair();
        let metrics = Arc::new(LinkMetrics::new());
        let sender = LinkSender::new(
            a.clone(),
            Arc::new(Windows1251Transcoder),
            quick_config(false),
            Arc::clone(&metrics),
        )
        .unwrap();

        assert!(matches!(
            sender.send("日本"),
            Err(Error::Transcode(_))
        ));
        assert_eq!(a.bytes_written(), 0);
        assert_eq!(metrics.snapshot().sends_rejected, 1);
    }

    #[test]
    fn test_direct_send_and_receive() {
        let (a, b) = open_pair();
        let (sender, metrics) = sender_on(a, quick_config(false));
        let (tx, rx) = unbounded();
        b.start_async_read(tx).unwrap();

        let text = "x".repeat(130);
        let report = sender.send_blocking(&text).unwrap();
        assert_eq!(report.frames.len(), 3);
        assert!(report.is_complete());
        assert!(report.frames.iter().all(|f| f.attempts == 1));

        let mut rx_side = receiver();
        let mut events = Vec::new();
        while let Ok(chunk) = rx.recv_timeout(Duration::from_millis(200)) {
            events.extend(rx_side.handle_chunk(&chunk));
        }
        assert_eq!(messages(&events), vec![text]);
        assert_eq!(metrics.snapshot().frames_sent, 3);
    }

    #[test]
    fn test_emulated_send_byte_by_byte() {
        let (a, b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(true));
        let (tx, rx) = unbounded();
        b.start_async_read(tx).unwrap();

        let report = sender.send_blocking("hello, link").unwrap();
        assert!(report.is_complete());
        assert_eq!(sender.mac_stats().frames_delivered, 1);

        let mut rx_side = receiver();
        let mut events = Vec::new();
        let mut chunks = 0;
        while let Ok(chunk) = rx.recv_timeout(Duration::from_millis(200)) {
            assert_eq!(chunk.len(), 1);
            chunks += 1;
            events.extend(rx_side.handle_chunk(&chunk));
        }
        assert_eq!(chunks, report.frames[0].stuffed.len());
        assert_eq!(messages(&events), vec!["hello, link".to_string()]);
    }

    #[test]
    fn test_direct_write_failure_reported() {
        let (a, _b) = open_pair();
        a.fail_next_writes(1);
        let (sender, metrics) = sender_on(a, quick_config(false));

        let report = sender.send_blocking(&"y".repeat(100)).unwrap();
        assert_eq!(report.delivered(), 1);
        assert!(!report.frames[0].delivered);
        assert!(report.frames[1].delivered);
        assert_eq!(metrics.snapshot().frames_failed, 1);
    }

    #[test]
    fn test_give_up_then_continue() {
        let (a, _b) = open_pair();
        let config = LinkConfig {
            mac: MacConfig {
                max_attempts: 2,
                slot_time: Duration::ZERO,
                ..MacConfig::default()
            },
            ..quick_config(true)
        };
        // Two busy senses exhaust the first frame; the second frame goes out.
        let rng = ScriptedRandom::new([0.1, 0.1], []);
        let mac = MediumAccessController::with_random(config.mac, Box::new(rng));
        let sender = LinkSender::with_controller(a, utf8(), config, Arc::new(LinkMetrics::new()), mac);

        let report = sender.send_blocking(&"z".repeat(70)).unwrap();
        assert_eq!(report.frames.len(), 2);
        assert!(!report.frames[0].delivered);
        assert_eq!(report.frames[0].attempts, 2);
        assert!(report.frames[1].delivered);
        assert_eq!(sender.mac_stats().frames_abandoned, 1);
    }

    #[test]
    fn test_receive_with_injected_fault() {
        // One error, byte 0, bit 3: 'H' (0x48) arrives as '@' (0x40).
        let injector = FaultInjector::new(Box::new(ScriptedRandom::new([0.1], [0, 3])));
        let metrics = Arc::new(LinkMetrics::new());
        let mut rx_side = LinkReceiver::with_injector(utf8(), Arc::clone(&metrics), Some(injector));

        let events = rx_side.handle_chunk(&[0x0B, 1, 1, b'H', b'I', 0x08, 0x0C]);
        match &events[0] {
            ReceiveEvent::FrameReceived {
                corrupted_text,
                text,
                bits_injected,
                fec,
                ..
            } => {
                assert_eq!(corrupted_text.as_deref(), Some("@I"));
                assert_eq!(text, "HI");
                assert_eq!(*bits_injected, 1);
                assert_eq!(fec.code(), 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(events[1], ReceiveEvent::MessageComplete("HI".to_string()));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.bits_injected, 1);
        assert_eq!(snapshot.fec_corrected, 1);
    }

    #[test]
    fn test_uncorrectable_still_delivered() {
        let mut rx_side = receiver();
        // 'H' with two flipped bits, FCS left as sent.
        let events = rx_side.handle_chunk(&[0x0B, 1, 1, b'H' ^ 0x03, b'I', 0x08, 0x0C]);

        assert!(matches!(
            events[0],
            ReceiveEvent::FrameReceived {
                fec: FecStatus::Checked(Correction::Uncorrectable { .. }),
                ..
            }
        ));
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn test_empty_message_frame() {
        let mut rx_side = receiver();
        let events = rx_side.handle_chunk(&[0x0B, 1, 1, 0x00, 0x0C]);

        assert!(matches!(
            events[0],
            ReceiveEvent::FrameReceived {
                fec: FecStatus::EmptyPayload,
                ..
            }
        ));
        assert_eq!(events[1], ReceiveEvent::MessageComplete(String::new()));
        assert_eq!(FecStatus::EmptyPayload.code(), -1);
    }

    #[test]
    fn test_jam_and_malformed_events() {
        let mut rx_side = receiver();

        let events = rx_side.handle_chunk(&[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(events, vec![ReceiveEvent::JamDetected { count: 1 }]);

        // Structurally delimited, but the escape has nothing to unescape.
        let events = rx_side.handle_chunk(&[0x0B, 1, 1, 0x41, 0x7D, 0x0C]);
        assert!(matches!(events[0], ReceiveEvent::Malformed { .. }));
    }

    #[test]
    fn test_lost_frame_drops_partial_message() {
        let (a, _b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(false));
        let first = sender.prepare(&"a".repeat(70)).unwrap();
        let second = sender.prepare("ok").unwrap();

        let mut rx_side = receiver();
        let mut events = rx_side.handle_chunk(&first[0].stuffed);
        assert_eq!(rx_side.pending_len(), 64);
        events.extend(rx_side.handle_chunk(&second[0].stuffed));

        assert!(events.contains(&ReceiveEvent::MessageDropped(SequenceGap {
            expected: 2,
            received: 1,
            dropped_frames: 1,
        })));
        assert_eq!(messages(&events), vec!["ok".to_string()]);
        assert_eq!(rx_side.pending_len(), 0);
    }

    #[test]
    fn test_middle_frame_loss_reported() {
        let (a, _b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(false));
        let frames = sender.prepare(&"b".repeat(130)).unwrap();
        let metrics = Arc::new(LinkMetrics::new());
        let mut rx_side = LinkReceiver::with_injector(utf8(), Arc::clone(&metrics), None);

        let mut events = rx_side.handle_chunk(&frames[0].stuffed);
        // Frame 2 never made it onto the wire.
        events.extend(rx_side.handle_chunk(&frames[2].stuffed));

        assert!(events.contains(&ReceiveEvent::MessageDropped(SequenceGap {
            expected: 2,
            received: 3,
            dropped_frames: 1,
        })));
        assert!(messages(&events).is_empty());
        assert_eq!(rx_side.pending_len(), 0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.messages_dropped, 1);
        assert_eq!(snapshot.messages_received, 0);
    }

    #[test]
    fn test_receiver_thread() {
        let (a, b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(false));
        let (chunk_tx, chunk_rx) = unbounded();
        let (event_tx, event_rx) = unbounded();
        b.start_async_read(chunk_tx).unwrap();

        let handle = receiver().spawn(chunk_rx, event_tx).unwrap();
        sender.send_blocking("first").unwrap();
        sender.send_blocking("second").unwrap();

        let mut texts = Vec::new();
        while texts.len() < 2 {
            if let ReceiveEvent::MessageComplete(text) = event_rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                texts.push(text);
            }
        }
        assert_eq!(texts, vec!["first".to_string(), "second".to_string()]);

        b.stop_async_read();
        handle.join().unwrap();
    }

    #[test]
    fn test_frame_report_layout() {
        let (a, _b) = open_pair();
        let (sender, _) = sender_on(a, quick_config(false));
        let report = sender.send_blocking("HI").unwrap();

        let layout = report.frames[0].layout().unwrap();
        assert!(layout.contains("start flag:  0x0b"));
        assert!(layout.contains("payload:     0x48 0x49"));
        assert!(layout.contains("FCS:         0x08"));
    }
}
