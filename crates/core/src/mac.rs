//! CSMA/CD medium access emulation.
//!
//! A shared half-duplex medium is modeled with Bernoulli trials: before each
//! attempt the channel is sensed (busy with probability 0.75), and before
//! every byte of the frame a collision may occur (probability 0.25). A
//! collision, or a failed byte write, aborts the attempt; the station writes
//! a 32-bit jam signal and backs off.
//!
//! # State Machine
//!
//! ```text
//! IDLE -> SENSE --busy--> BACKOFF -> SENSE ...
//!           |
//!           +--free--> TRANSMIT --all bytes--> SUCCESS
//!                         |
//!                         +--collision--> COLLIDED -> (jam) -> BACKOFF
//!
//! SENSE with attempt == max_attempts -> GIVE_UP
//! ```
//!
//! # Backoff
//!
//! Truncated binary exponential: after attempt `n` (0-based) the station
//! waits `uniform(0, 2^min(n, 10) - 1)` slot times.
//!
//! # Determinism
//!
//! All randomness comes from a [`RandomSource`]; with a seed in
//! [`MacConfig`] the trial sequence is reproducible.
//!
//! # Thread Safety
//!
//! The controller itself is used by one sending worker at a time (the link
//! keeps it behind a mutex). Its [`MacStats`] are atomics that can be read
//! through [`MediumAccessController::stats_handle`] while a frame is in
//! flight.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::channel::DuplexChannel;
use crate::error::{Error, Result};
use crate::random::{RandomSource, SeededRandom};
use crate::reassembly::JAM_SIGNAL;

/// Longest accepted contention slot.
pub const MAX_SLOT_TIME: Duration = Duration::from_secs(1);

/// Configuration for the medium access controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MacConfig {
    /// Duration of one contention slot
    pub slot_time: Duration,

    /// Attempts per frame before giving up
    pub max_attempts: u32,

    /// Probability that a sense finds the channel busy [0.0, 1.0]
    pub busy_probability: f64,

    /// Per-byte collision probability [0.0, 1.0]
    pub collision_probability: f64,

    /// Exponent cap for the backoff window
    pub backoff_cap: u32,

    /// Seed for the trial stream; `None` seeds from entropy
    pub seed: Option<u64>,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            slot_time: Duration::from_millis(1),
            max_attempts: 16,
            busy_probability: 0.75,
            collision_probability: 0.25,
            backoff_cap: 10,
            seed: None,
        }
    }
}

impl MacConfig {
    /// Default parameters with a fixed seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// A medium that is never busy and never collides.
    pub fn quiet(seed: u64) -> Self {
        Self {
            busy_probability: 0.0,
            collision_probability: 0.0,
            ..Self::with_seed(seed)
        }
    }

    /// Check parameter ranges.
    ///
    /// # Errors
    /// `Error::Config` naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.busy_probability) {
            return Err(Error::Config(format!(
                "busy probability {} is outside [0, 1]",
                self.busy_probability
            )));
        }
        if !(0.0..=1.0).contains(&self.collision_probability) {
            return Err(Error::Config(format!(
                "collision probability {} is outside [0, 1]",
                self.collision_probability
            )));
        }
        if self.slot_time > MAX_SLOT_TIME {
            return Err(Error::Config(format!(
                "slot time {} ms is too large (max {} ms)",
                self.slot_time.as_millis(),
                MAX_SLOT_TIME.as_millis()
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max attempts must be at least 1".to_string()));
        }
        if self.backoff_cap > 30 {
            return Err(Error::Config(format!(
                "backoff cap {} is too large (max 30)",
                self.backoff_cap
            )));
        }
        Ok(())
    }
}

/// Protocol state, as reported by [`MediumAccessController::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacState {
    Idle,
    Sense,
    Transmit,
    Collided,
    Backoff,
    Success,
    GiveUp,
}

/// How one frame's transmission ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitOutcome {
    /// Every byte went out without a collision.
    Delivered {
        /// Attempts used, including the successful one
        attempts: u32,
    },

    /// `max_attempts` were exhausted.
    GaveUp {
        /// Attempts made
        attempts: u32,
    },
}

impl TransmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, TransmitOutcome::Delivered { .. })
    }

    pub fn attempts(&self) -> u32 {
        match *self {
            TransmitOutcome::Delivered { attempts } | TransmitOutcome::GaveUp { attempts } => attempts,
        }
    }
}

/// Contention counters, shared lock-free with observers.
#[derive(Debug, Default)]
pub struct MacStats {
    busy_senses: AtomicU64,
    collisions: AtomicU64,
    jams_sent: AtomicU64,
    frames_delivered: AtomicU64,
    frames_abandoned: AtomicU64,
    bytes_written: AtomicU64,
    backoff_slots: AtomicU64,
    jam_active: AtomicBool,
}

impl MacStats {
    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> MacStatsSnapshot {
        MacStatsSnapshot {
            busy_senses: self.busy_senses.load(Ordering::Relaxed),
            collisions: self.collisions.load(Ordering::Relaxed),
            jams_sent: self.jams_sent.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            frames_abandoned: self.frames_abandoned.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            backoff_slots: self.backoff_slots.load(Ordering::Relaxed),
        }
    }

    /// True while a jam signal is being written.
    pub fn jam_active(&self) -> bool {
        self.jam_active.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        for counter in [
            &self.busy_senses,
            &self.collisions,
            &self.jams_sent,
            &self.frames_delivered,
            &self.frames_abandoned,
            &self.bytes_written,
            &self.backoff_slots,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.jam_active.store(false, Ordering::SeqCst);
    }
}

/// Plain copy of [`MacStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MacStatsSnapshot {
    /// Senses that found the channel busy
    pub busy_senses: u64,

    /// Collisions detected (including failed byte writes)
    pub collisions: u64,

    /// Jam signals written
    pub jams_sent: u64,

    /// Frames transmitted successfully
    pub frames_delivered: u64,

    /// Frames abandoned after max attempts
    pub frames_abandoned: u64,

    /// Frame bytes written, including partial attempts
    pub bytes_written: u64,

    /// Backoff slots waited in total
    pub backoff_slots: u64,
}

impl MacStatsSnapshot {
    /// Collisions per transmission attempt that reached the medium.
    pub fn collision_rate(&self) -> f64 {
        let attempts = self.collisions + self.frames_delivered;
        if attempts == 0 {
            0.0
        } else {
            self.collisions as f64 / attempts as f64
        }
    }

    /// Delivered / (delivered + abandoned).
    pub fn delivery_rate(&self) -> f64 {
        let frames = self.frames_delivered + self.frames_abandoned;
        if frames == 0 {
            0.0
        } else {
            self.frames_delivered as f64 / frames as f64
        }
    }
}

/// CSMA/CD transmitter for one station.
pub struct MediumAccessController {
    config: MacConfig,
    rng: Box<dyn RandomSource>,
    emulation_enabled: bool,
    state: MacState,
    stats: Arc<MacStats>,
}

impl MediumAccessController {
    /// Create a controller seeded from `config.seed` (or entropy).
    pub fn new(config: MacConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => SeededRandom::new(seed),
            None => SeededRandom::from_entropy(),
        };
        Self::with_random(config, Box::new(rng))
    }

    /// Create a controller drawing from an explicit source.
    pub fn with_random(config: MacConfig, rng: Box<dyn RandomSource>) -> Self {
        Self {
            config,
            rng,
            emulation_enabled: true,
            state: MacState::Idle,
            stats: Arc::new(MacStats::default()),
        }
    }

    pub fn config(&self) -> &MacConfig {
        &self.config
    }

    pub fn state(&self) -> MacState {
        self.state
    }

    /// Shared handle to the counters.
    pub fn stats_handle(&self) -> Arc<MacStats> {
        Arc::clone(&self.stats)
    }

    pub fn stats(&self) -> MacStatsSnapshot {
        self.stats.snapshot()
    }

    /// Total collisions since the last reset.
    pub fn collision_count(&self) -> u64 {
        self.stats.collisions.load(Ordering::Relaxed)
    }

    /// Zero every counter and clear the jam flag.
    pub fn reset_statistics(&mut self) {
        self.stats.reset();
    }

    /// With emulation off no trial ever fires.
    pub fn set_emulation_enabled(&mut self, enabled: bool) {
        self.emulation_enabled = enabled;
    }

    /// Whether [`transmit`](Self::transmit) runs contention trials.
    pub fn is_emulation_enabled(&self) -> bool {
        self.emulation_enabled
    }

    /// True while the jam signal is being written.
    pub fn jam_signal(&self) -> bool {
        self.stats.jam_active()
    }

    /// Carrier sense trial.
    pub fn is_channel_busy(&mut self) -> bool {
        self.emulation_enabled && self.rng.next_uniform() < self.config.busy_probability
    }

    /// Per-byte collision trial.
    pub fn is_collision_occurred(&mut self) -> bool {
        self.emulation_enabled && self.rng.next_uniform() < self.config.collision_probability
    }

    /// Draw a backoff in slots for 0-based `attempt`.
    ///
    /// # Returns
    /// A value in `[0, 2^min(attempt, backoff_cap) - 1]`.
    pub fn calculate_backoff_delay(&mut self, attempt: u32) -> u32 {
        let exponent = attempt.min(self.config.backoff_cap);
        let max_slots = (1i64 << exponent) - 1;
        self.rng.next_in_range(0, max_slots) as u32
    }

    /// Run one frame through the contention state machine.
    ///
    /// Blocks the calling thread for pacing and backoff waits.
    ///
    /// # Returns
    /// `Delivered` with the attempt count, or `GaveUp` after `max_attempts`.
    pub fn transmit(&mut self, channel: &dyn DuplexChannel, frame: &[u8]) -> TransmitOutcome {
        let mut attempt = 0u32;
        self.state = MacState::Sense;

        let outcome = loop {
            let current = self.state;
            self.state = match current {
                MacState::Sense if attempt >= self.config.max_attempts => MacState::GiveUp,
                MacState::Sense => {
                    if self.is_channel_busy() {
                        self.stats.busy_senses.fetch_add(1, Ordering::Relaxed);
                        warn!(attempt = attempt + 1, "channel busy");
                        MacState::Backoff
                    } else {
                        MacState::Transmit
                    }
                }
                MacState::Transmit => match self.send_bytes(channel, frame) {
                    Some(at) => {
                        self.stats.collisions.fetch_add(1, Ordering::Relaxed);
                        warn!(attempt = attempt + 1, byte = at, "collision");
                        MacState::Collided
                    }
                    None => MacState::Success,
                },
                MacState::Collided => {
                    self.send_jam(channel);
                    MacState::Backoff
                }
                MacState::Backoff => {
                    let slots = self.calculate_backoff_delay(attempt);
                    let wait = self.config.slot_time.saturating_mul(slots);
                    debug!(attempt = attempt + 1, slots, wait_ms = wait.as_millis() as u64, "backing off");
                    self.stats.backoff_slots.fetch_add(u64::from(slots), Ordering::Relaxed);
                    pause(wait);
                    attempt += 1;
                    MacState::Sense
                }
                MacState::Success => {
                    self.stats.frames_delivered.fetch_add(1, Ordering::Relaxed);
                    break TransmitOutcome::Delivered {
                        attempts: attempt + 1,
                    };
                }
                MacState::GiveUp => {
                    self.stats.frames_abandoned.fetch_add(1, Ordering::Relaxed);
                    warn!(attempts = attempt, "giving up on frame");
                    break TransmitOutcome::GaveUp { attempts: attempt };
                }
                MacState::Idle => MacState::Sense,
            };
        };

        self.state = MacState::Idle;
        outcome
    }

    /// Write the 4-byte jam signal, raising the jam flag meanwhile.
    pub fn send_jam(&mut self, channel: &dyn DuplexChannel) {
        self.stats.jam_active.store(true, Ordering::SeqCst);
        match channel.write(&JAM_SIGNAL) {
            Ok(()) => {
                self.stats.jams_sent.fetch_add(1, Ordering::Relaxed);
                debug!("jam signal sent");
            }
            Err(e) => warn!(error = %e, "jam signal write failed"),
        }
        self.stats.jam_active.store(false, Ordering::SeqCst);
    }

    /// Byte-at-a-time write with a collision trial before each byte.
    ///
    /// Returns the index of the byte where a collision (or write failure)
    /// stopped the attempt.
    fn send_bytes(&mut self, channel: &dyn DuplexChannel, frame: &[u8]) -> Option<usize> {
        let pace = self
            .config
            .slot_time
            .checked_div(frame.len() as u32)
            .unwrap_or_default();

        for (i, &byte) in frame.iter().enumerate() {
            if self.is_collision_occurred() {
                return Some(i);
            }
            if let Err(e) = channel.write(&[byte]) {
                debug!(error = %e, "byte write failed, treating as collision");
                return Some(i);
            }
            self.stats.bytes_written.fetch_add(1, Ordering::Relaxed);
            pause(pace);
        }

        None
    }
}

fn pause(duration: Duration) {
    if !duration.is_zero() {
        std::thread::sleep(duration);
    }
}

impl std::fmt::Debug for MediumAccessController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediumAccessController")
            .field("config", &self.config)
            .field("emulation_enabled", &self.emulation_enabled)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::LoopbackChannel;
    use crate::random::ScriptedRandom;
    use crossbeam_channel::{unbounded, Receiver};

    fn fast_config() -> MacConfig {
        MacConfig {
            slot_time: Duration::ZERO,
            ..MacConfig::with_seed(1)
        }
    }

    fn scripted(uniforms: Vec<f64>, ranges: Vec<i64>) -> MediumAccessController {
        MediumAccessController::with_random(fast_config(), Box::new(ScriptedRandom::new(uniforms, ranges)))
    }

    fn wired() -> (LoopbackChannel, LoopbackChannel, Receiver<Vec<u8>>) {
        let (a, b) = LoopbackChannel::pair("a", "b");
        a.open("a", 9600).unwrap();
        b.open("b", 9600).unwrap();
        let (tx, rx) = unbounded();
        b.start_async_read(tx).unwrap();
        (a, b, rx)
    }

    fn drain(rx: &Receiver<Vec<u8>>, expected: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        while bytes.len() < expected {
            match rx.recv_timeout(Duration::from_secs(1)) {
                Ok(chunk) => bytes.extend(chunk),
                Err(_) => break,
            }
        }
        bytes
    }

    #[test]
    fn test_default_config() {
        let config = MacConfig::default();
        assert_eq!(config.slot_time, Duration::from_millis(1));
        assert_eq!(config.max_attempts, 16);
        assert_eq!(config.busy_probability, 0.75);
        assert_eq!(config.collision_probability, 0.25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let config = MacConfig {
            busy_probability: 1.5,
            ..MacConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = MacConfig {
            max_attempts: 0,
            ..MacConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MacConfig {
            slot_time: Duration::from_millis(u64::MAX),
            ..MacConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = MacConfig {
            slot_time: MAX_SLOT_TIME,
            ..MacConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_bounds() {
        let mut mac = MediumAccessController::new(fast_config());
        for attempt in 0..20u32 {
            let max = (1u32 << attempt.min(10)) - 1;
            for _ in 0..200 {
                assert!(mac.calculate_backoff_delay(attempt) <= max);
            }
        }
        assert_eq!(mac.calculate_backoff_delay(0), 0);
    }

    #[test]
    fn test_trials_disabled_without_emulation() {
        let mut mac = scripted(vec![0.0; 4], vec![]);
        mac.set_emulation_enabled(false);
        assert!(!mac.is_channel_busy());
        assert!(!mac.is_collision_occurred());
    }

    #[test]
    fn test_clean_transmit() {
        let (a, _b, rx) = wired();
        let mut mac = scripted(vec![], vec![]);

        let outcome = mac.transmit(&a, b"\x0bframe\x0c");
        assert_eq!(outcome, TransmitOutcome::Delivered { attempts: 1 });
        assert_eq!(drain(&rx, 7), b"\x0bframe\x0c".to_vec());
        assert_eq!(mac.state(), MacState::Idle);
        assert_eq!(mac.stats().bytes_written, 7);
    }

    #[test]
    fn test_busy_then_transmit() {
        let (a, _b, rx) = wired();
        // busy, busy, free
        let mut mac = scripted(vec![0.1, 0.1, 0.9], vec![0, 1]);

        let outcome = mac.transmit(&a, &[0x0B, 1, 1, 0, 0x0C]);
        assert_eq!(outcome, TransmitOutcome::Delivered { attempts: 3 });
        assert_eq!(mac.stats().busy_senses, 2);
        assert_eq!(mac.stats().backoff_slots, 1);
        assert_eq!(drain(&rx, 5).len(), 5);
    }

    #[test]
    fn test_collision_sends_jam_then_retries() {
        let (a, _b, rx) = wired();
        // free; byte 0 ok, byte 1 ok, byte 2 collides; free; all bytes ok
        let mut mac = scripted(vec![0.9, 0.9, 0.9, 0.1], vec![1]);

        let frame = [0x0B, 1, 1, 0x42, 0x0C];
        let outcome = mac.transmit(&a, &frame);
        assert_eq!(outcome, TransmitOutcome::Delivered { attempts: 2 });
        assert_eq!(mac.collision_count(), 1);
        assert_eq!(mac.stats().jams_sent, 1);
        assert!(!mac.jam_signal());

        let mut expected = frame[..2].to_vec();
        expected.extend_from_slice(&JAM_SIGNAL);
        expected.extend_from_slice(&frame);
        assert_eq!(drain(&rx, expected.len()), expected);
    }

    #[test]
    fn test_write_failure_is_collision() {
        let (a, _b, rx) = wired();
        a.fail_next_writes(1);
        let mut mac = scripted(vec![], vec![]);

        let outcome = mac.transmit(&a, &[0x0B, 1, 1, 0, 0x0C]);
        assert_eq!(outcome, TransmitOutcome::Delivered { attempts: 2 });
        assert_eq!(mac.collision_count(), 1);

        let bytes = drain(&rx, 9);
        assert_eq!(&bytes[..4], &JAM_SIGNAL);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let (a, _b, rx) = wired();
        let mut mac = scripted(vec![0.0; 16], vec![]);

        let outcome = mac.transmit(&a, &[0x0B, 1, 1, 0, 0x0C]);
        assert_eq!(outcome, TransmitOutcome::GaveUp { attempts: 16 });
        assert!(!outcome.is_delivered());
        assert_eq!(mac.stats().frames_abandoned, 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_terminates_under_constant_collisions() {
        let (a, _b, _rx) = wired();
        let config = MacConfig {
            slot_time: Duration::ZERO,
            busy_probability: 0.0,
            collision_probability: 1.0,
            ..MacConfig::with_seed(3)
        };
        let mut mac = MediumAccessController::new(config);

        let outcome = mac.transmit(&a, &[0x0B, 1, 1, 0, 0x0C]);
        assert_eq!(outcome.attempts(), config.max_attempts);
        assert_eq!(mac.collision_count(), u64::from(config.max_attempts));
        assert_eq!(mac.stats().jams_sent, u64::from(config.max_attempts));
    }

    #[test]
    fn test_reset_statistics() {
        let (a, _b, _rx) = wired();
        let mut mac = scripted(vec![0.0], vec![]);
        mac.transmit(&a, &[0x0B, 1, 1, 0, 0x0C]);
        assert_eq!(mac.stats().busy_senses, 1);

        let handle = mac.stats_handle();
        mac.reset_statistics();
        assert_eq!(handle.snapshot(), MacStatsSnapshot::default());
    }

    #[test]
    fn test_snapshot_rates() {
        let snapshot = MacStatsSnapshot {
            collisions: 1,
            frames_delivered: 3,
            frames_abandoned: 1,
            ..MacStatsSnapshot::default()
        };
        assert!((snapshot.collision_rate() - 0.25).abs() < 1e-9);
        assert!((snapshot.delivery_rate() - 0.75).abs() < 1e-9);
    }
}
