//! Configuration for the framelink demo.
//!
//! Command-line arguments are parsed with clap and resolved into a
//! [`Config`], filling every unset value with a default.
//!
//! # Philosophy
//!
//! The tool should work with ZERO arguments, using intelligent defaults.
//! Everything random (MAC trials, injected faults, sample messages) is
//! derived from one seed, and the resolved configuration can be printed, so
//! any run can be repeated exactly.

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use framelink_core::channel::{DEFAULT_BAUD_RATE, STANDARD_BAUD_RATES};
use framelink_core::link::{LinkConfig, DEFAULT_INTER_FRAME_GAP};
use framelink_core::mac::MacConfig;
use framelink_core::transcode::WireEncoding;

use crate::input_gen;

/// Wire encoding as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    Utf8,
    Cp1251,
}

impl From<EncodingArg> for WireEncoding {
    fn from(arg: EncodingArg) -> Self {
        match arg {
            EncodingArg::Utf8 => WireEncoding::Utf8,
            EncodingArg::Cp1251 => WireEncoding::Windows1251,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "framelink",
    version,
    about = "Framing, Hamming FEC and CSMA/CD over a loopback duplex channel"
)]
pub struct Cli {
    /// Message to send; repeat for several.
    #[arg(long = "message", short = 'm')]
    pub messages: Vec<String>,

    /// Sample messages to generate when no --message is given.
    #[arg(long, default_value_t = 3)]
    pub sample_messages: usize,

    /// Random seed for determinism.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Emulate a shared medium: CSMA/CD on send, bit errors on receive.
    #[arg(long)]
    pub emulation: bool,

    /// Keep CSMA/CD but do not corrupt received payloads.
    #[arg(long)]
    pub no_faults: bool,

    /// Contention slot time in milliseconds (default: 1, max: 1000).
    #[arg(long)]
    pub slot_ms: Option<u64>,

    /// Attempts per frame before giving up (default: 16).
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Probability the channel is sensed busy (default: 0.75).
    #[arg(long)]
    pub busy: Option<f64>,

    /// Per-byte collision probability (default: 0.25).
    #[arg(long)]
    pub collision: Option<f64>,

    /// Encoding of message text on the wire.
    #[arg(long, value_enum, default_value_t = EncodingArg::Utf8)]
    pub encoding: EncodingArg,

    /// Baud rate for both endpoints.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// Log level when RUST_LOG is not set.
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Print the resolved configuration.
    #[arg(long)]
    pub print_config: bool,

    /// Don't print the metrics summary.
    #[arg(long)]
    pub no_metrics: bool,
}

/// Complete configuration for a demo run.
#[derive(Debug, Clone)]
pub struct Config {
    // === Messages ===
    /// Texts to send, in order
    pub messages: Vec<String>,

    /// True if `messages` were generated
    pub generated: bool,

    pub encoding: WireEncoding,

    // === Channel ===
    pub baud_rate: u32,

    // === Link ===
    pub seed: u64,
    pub link: LinkConfig,

    // === Behavior ===
    pub print_config: bool,
    pub print_metrics: bool,
}

impl Config {
    /// Resolve parsed arguments into a configuration.
    ///
    /// If --seed is missing a time-based seed is used; it is printed with the
    /// configuration so the run can be repeated.
    pub fn from_cli(cli: Cli) -> Result<Self> {
        let seed = cli.seed.unwrap_or_else(time_seed);

        if cli.baud == 0 {
            bail!("--baud must be positive");
        }

        let mac = MacConfig {
            slot_time: cli
                .slot_ms
                .map(Duration::from_millis)
                .unwrap_or(MacConfig::default().slot_time),
            max_attempts: cli.max_attempts.unwrap_or(MacConfig::default().max_attempts),
            busy_probability: cli.busy.unwrap_or(MacConfig::default().busy_probability),
            collision_probability: cli
                .collision
                .unwrap_or(MacConfig::default().collision_probability),
            ..MacConfig::with_seed(seed)
        };
        mac.validate()?;

        let generated = cli.messages.is_empty();
        let messages = if generated {
            input_gen::generate_sample_messages(seed, cli.sample_messages)
        } else {
            cli.messages
        };

        Ok(Config {
            messages,
            generated,
            encoding: cli.encoding.into(),
            baud_rate: cli.baud,
            seed,
            link: LinkConfig {
                emulation: cli.emulation,
                fault_injection: !cli.no_faults,
                inter_frame_gap: DEFAULT_INTER_FRAME_GAP,
                mac,
            },
            print_config: cli.print_config,
            print_metrics: !cli.no_metrics,
        })
    }

    /// Print the configuration in human-readable form.
    pub fn print(&self) {
        let mac = &self.link.mac;

        println!("=== Configuration ===");
        println!("Seed: {}", self.seed);
        println!(
            "Messages: {}{}",
            self.messages.len(),
            if self.generated { " (generated)" } else { "" }
        );
        println!("Encoding: {}", self.encoding.transcoder().name());
        print!("Baud rate: {}", self.baud_rate);
        if !STANDARD_BAUD_RATES.contains(&self.baud_rate) {
            print!(" (non-standard)");
        }
        println!();
        println!();
        println!("=== Link ===");
        println!("Emulation: {}", on_off(self.link.emulation));
        println!("Fault injection: {}", on_off(self.link.injects_faults()));
        println!("Inter-frame gap: {} ms", self.link.inter_frame_gap.as_millis());
        println!();
        println!("=== Medium Access ===");
        println!("Slot time: {} ms", mac.slot_time.as_millis());
        println!("Max attempts: {}", mac.max_attempts);
        println!("Busy probability: {:.2}", mac.busy_probability);
        println!("Collision probability: {:.2}", mac.collision_probability);
        println!("Backoff cap: 2^{}", mac.backoff_cap);
        println!();
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn time_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_millis() as u64)
        .unwrap_or_default()
}
