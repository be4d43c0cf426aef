//! Metrics collection and reporting for the link.
//!
//! Counters cover both directions:
//! - Send path: frames built, delivered, abandoned, bytes on the wire
//! - Receive path: jams seen, frames extracted, malformed frames
//! - FEC: injected bit errors and the clean/corrected/uncorrectable split
//! - Messages sent and reassembled
//!
//! # Design
//!
//! Counters are atomics updated at each pipeline stage, and reports are made
//! from a [`MetricsSnapshot`] taken at one point in time. The MAC keeps its
//! own contention counters; a snapshot can carry a copy of them so one
//! summary shows the whole link.
//!
//! # Thread Safety
//!
//! `LinkMetrics` is shared as `Arc<LinkMetrics>` between the sending worker
//! and the receive consumer. Relaxed ordering is enough: counters are
//! independent and only read for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::hamming::Correction;
use crate::mac::MacStatsSnapshot;

/// Live counters for one link endpoint.
#[derive(Debug)]
pub struct LinkMetrics {
    start_time: Instant,

    // === Send ===
    frames_built: AtomicU64,
    frames_sent: AtomicU64,
    frames_failed: AtomicU64,
    bytes_on_wire: AtomicU64,
    messages_sent: AtomicU64,
    sends_rejected: AtomicU64,

    // === Receive ===
    jams_received: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,

    // === FEC ===
    bits_injected: AtomicU64,
    fec_clean: AtomicU64,
    fec_corrected: AtomicU64,
    fec_uncorrectable: AtomicU64,
}

fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl LinkMetrics {
    /// Create zeroed metrics with start time set to now.
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            frames_built: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            frames_failed: AtomicU64::new(0),
            bytes_on_wire: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            sends_rejected: AtomicU64::new(0),
            jams_received: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bits_injected: AtomicU64::new(0),
            fec_clean: AtomicU64::new(0),
            fec_corrected: AtomicU64::new(0),
            fec_uncorrectable: AtomicU64::new(0),
        }
    }

    pub fn record_frames_built(&self, count: usize) {
        bump(&self.frames_built, count as u64);
    }

    /// A stuffed frame of `len` bytes made it onto the wire.
    pub fn record_frame_sent(&self, len: usize) {
        bump(&self.frames_sent, 1);
        bump(&self.bytes_on_wire, len as u64);
    }

    pub fn record_frame_failed(&self) {
        bump(&self.frames_failed, 1);
    }

    pub fn record_message_sent(&self) {
        bump(&self.messages_sent, 1);
    }

    /// A message was refused before framing (encoding, size).
    pub fn record_send_rejected(&self) {
        bump(&self.sends_rejected, 1);
    }

    pub fn record_jams_received(&self, count: usize) {
        bump(&self.jams_received, count as u64);
    }

    pub fn record_frame_received(&self) {
        bump(&self.frames_received, 1);
    }

    pub fn record_malformed(&self) {
        bump(&self.malformed_frames, 1);
    }

    pub fn record_message_received(&self) {
        bump(&self.messages_received, 1);
    }

    /// A partial message was abandoned after a sequence gap.
    pub fn record_message_dropped(&self) {
        bump(&self.messages_dropped, 1);
    }

    pub fn record_bits_injected(&self, count: usize) {
        bump(&self.bits_injected, count as u64);
    }

    /// Count one FEC outcome.
    pub fn record_correction(&self, outcome: &Correction) {
        let counter = match outcome {
            Correction::Clean => &self.fec_clean,
            Correction::Corrected { .. } => &self.fec_corrected,
            Correction::Uncorrectable { .. } => &self.fec_uncorrectable,
        };
        bump(counter, 1);
    }

    /// Time since these metrics were created.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            duration: self.elapsed(),
            frames_built: load(&self.frames_built),
            frames_sent: load(&self.frames_sent),
            frames_failed: load(&self.frames_failed),
            bytes_on_wire: load(&self.bytes_on_wire),
            messages_sent: load(&self.messages_sent),
            sends_rejected: load(&self.sends_rejected),
            jams_received: load(&self.jams_received),
            frames_received: load(&self.frames_received),
            malformed_frames: load(&self.malformed_frames),
            messages_received: load(&self.messages_received),
            messages_dropped: load(&self.messages_dropped),
            bits_injected: load(&self.bits_injected),
            fec_clean: load(&self.fec_clean),
            fec_corrected: load(&self.fec_corrected),
            fec_uncorrectable: load(&self.fec_uncorrectable),
            mac: None,
        }
    }
}

impl Default for LinkMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    /// Time since the metrics were created
    pub duration: Duration,

    // === Send ===
    pub frames_built: u64,
    pub frames_sent: u64,
    pub frames_failed: u64,
    pub bytes_on_wire: u64,
    pub messages_sent: u64,
    pub sends_rejected: u64,

    // === Receive ===
    pub jams_received: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
    pub messages_received: u64,
    pub messages_dropped: u64,

    // === FEC ===
    pub bits_injected: u64,
    pub fec_clean: u64,
    pub fec_corrected: u64,
    pub fec_uncorrectable: u64,

    /// MAC contention counters, when attached
    pub mac: Option<MacStatsSnapshot>,
}

impl MetricsSnapshot {
    /// Attach the MAC's counters.
    pub fn with_mac(mut self, mac: MacStatsSnapshot) -> Self {
        self.mac = Some(mac);
        self
    }

    /// Frames that went through FEC.
    pub fn frames_checked(&self) -> u64 {
        self.fec_clean + self.fec_corrected + self.fec_uncorrectable
    }

    /// Corrected / checked.
    pub fn correction_rate(&self) -> f64 {
        ratio(self.fec_corrected, self.frames_checked())
    }

    /// (Clean + corrected) / checked.
    pub fn recovery_rate(&self) -> f64 {
        ratio(self.fec_clean + self.fec_corrected, self.frames_checked())
    }

    /// Sent / (sent + failed).
    pub fn delivery_rate(&self) -> f64 {
        ratio(self.frames_sent, self.frames_sent + self.frames_failed)
    }

    /// Collision rate from the attached MAC counters (0 without them).
    pub fn collision_rate(&self) -> f64 {
        self.mac.map(|m| m.collision_rate()).unwrap_or(0.0)
    }

    /// Print a human-readable summary to stdout.
    pub fn print_summary(&self) {
        println!("\n=== Link Summary ===");
        println!("Duration: {} ms", self.duration.as_millis());
        println!();

        println!("=== Send ===");
        println!("Messages sent: {}", self.messages_sent);
        println!("Messages rejected: {}", self.sends_rejected);
        println!("Frames built: {}", self.frames_built);
        println!(
            "Frames delivered: {} ({:.1}%)",
            self.frames_sent,
            self.delivery_rate() * 100.0
        );
        println!("Frames abandoned: {}", self.frames_failed);
        println!("Bytes on wire: {}", self.bytes_on_wire);
        println!();

        if let Some(mac) = &self.mac {
            println!("=== Medium Access ===");
            println!("Busy senses: {}", mac.busy_senses);
            println!(
                "Collisions: {} ({:.1}% of attempts)",
                mac.collisions,
                mac.collision_rate() * 100.0
            );
            println!("Jams sent: {}", mac.jams_sent);
            println!("Backoff slots: {}", mac.backoff_slots);
            println!();
        }

        println!("=== Receive ===");
        println!("Frames received: {}", self.frames_received);
        println!("Malformed frames: {}", self.malformed_frames);
        println!("Jams received: {}", self.jams_received);
        println!("Messages received: {}", self.messages_received);
        println!("Messages dropped: {}", self.messages_dropped);
        println!();

        println!("=== Error Correction ===");
        println!("Bits injected: {}", self.bits_injected);
        println!("Clean: {}", self.fec_clean);
        println!(
            "Corrected: {} ({:.1}%)",
            self.fec_corrected,
            self.correction_rate() * 100.0
        );
        println!("Uncorrectable: {}", self.fec_uncorrectable);
        println!("Recovery rate: {:.1}%", self.recovery_rate() * 100.0);
        println!();
    }

    /// Export metrics as `key=value` lines (for parsing/testing).
    pub fn export_text(&self) -> String {
        let mut text = format!(
            "duration_ms={}\n\
             messages_sent={}\n\
             sends_rejected={}\n\
             frames_built={}\n\
             frames_sent={}\n\
             frames_failed={}\n\
             bytes_on_wire={}\n\
             delivery_rate={:.4}\n\
             jams_received={}\n\
             frames_received={}\n\
             malformed_frames={}\n\
             messages_received={}\n\
             messages_dropped={}\n\
             bits_injected={}\n\
             fec_clean={}\n\
             fec_corrected={}\n\
             fec_uncorrectable={}\n\
             correction_rate={:.4}\n",
            self.duration.as_millis(),
            self.messages_sent,
            self.sends_rejected,
            self.frames_built,
            self.frames_sent,
            self.frames_failed,
            self.bytes_on_wire,
            self.delivery_rate(),
            self.jams_received,
            self.frames_received,
            self.malformed_frames,
            self.messages_received,
            self.messages_dropped,
            self.bits_injected,
            self.fec_clean,
            self.fec_corrected,
            self.fec_uncorrectable,
            self.correction_rate(),
        );

        if let Some(mac) = &self.mac {
            text.push_str(&format!(
                "busy_senses={}\n\
                 collisions={}\n\
                 jams_sent={}\n\
                 collision_rate={:.4}\n",
                mac.busy_senses,
                mac.collisions,
                mac.jams_sent,
                mac.collision_rate(),
            ));
        }

        text
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
