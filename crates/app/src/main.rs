//! framelink: send text across an emulated data link.
//!
//! Two loopback endpoints stand in for two stations on one cable. Station A
//! frames and transmits each message (through CSMA/CD when emulating);
//! station B reassembles the byte stream, repairs what it can and reports
//! every step.

mod config;
mod input_gen;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use framelink_core::channel::{DuplexChannel, LoopbackChannel};
use framelink_core::hamming::Correction;
use framelink_core::link::{FecStatus, FrameReport, LinkReceiver, LinkSender, ReceiveEvent};
use framelink_core::metrics::LinkMetrics;
use framelink_core::transcode::Transcoder;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{Cli, Config};

const SENDER_ENDPOINT: &str = "station-a";
const RECEIVER_ENDPOINT: &str = "station-b";

/// How long to wait for the rest of a message once the sender is done.
const SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = Config::from_cli(cli)?;
    if config.print_config {
        config.print();
    }

    run(&config)
}

/// RUST_LOG wins over `--log-level`.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level {level:?}"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .try_init()
        .map_err(|e| anyhow!("cannot install logger: {e}"))
}

fn run(config: &Config) -> Result<()> {
    let (a, b) = LoopbackChannel::pair(SENDER_ENDPOINT, RECEIVER_ENDPOINT);
    a.open(SENDER_ENDPOINT, config.baud_rate)
        .with_context(|| format!("open {SENDER_ENDPOINT}"))?;
    b.open(RECEIVER_ENDPOINT, config.baud_rate)
        .with_context(|| format!("open {RECEIVER_ENDPOINT}"))?;
    let (a, b) = (Arc::new(a), Arc::new(b));

    let transcoder: Arc<dyn Transcoder> = Arc::from(config.encoding.transcoder());
    let metrics = Arc::new(LinkMetrics::new());

    let sender = LinkSender::new(
        a.clone(),
        Arc::clone(&transcoder),
        config.link,
        Arc::clone(&metrics),
    )?;

    let (chunk_tx, chunk_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    b.start_async_read(chunk_tx)?;
    let consumer = LinkReceiver::new(transcoder, &config.link, Arc::clone(&metrics))
        .spawn(chunk_rx, event_tx)?;

    info!(
        messages = config.messages.len(),
        emulation = config.link.emulation,
        seed = config.seed,
        "link up"
    );

    for (i, message) in config.messages.iter().enumerate() {
        println!("=== Message {} of {} ===", i + 1, config.messages.len());
        println!("Sending: {message:?}");

        let report = match sender.send_blocking(message) {
            Ok(report) => report,
            Err(e) => {
                println!("Refused: {e}");
                println!();
                continue;
            }
        };

        for frame in &report.frames {
            print_frame(frame);
        }
        if report.delivered() > 0 {
            drain_events(&event_rx);
        } else {
            warn!("no frame of the message was delivered");
        }
        println!();
    }

    b.stop_async_read();
    consumer
        .join()
        .map_err(|_| anyhow!("receive consumer panicked"))?;
    a.close();
    b.close();

    if config.print_metrics {
        metrics.snapshot().with_mac(sender.mac_stats()).print_summary();
    }

    Ok(())
}

fn print_frame(frame: &FrameReport) {
    let status = if frame.delivered { "sent" } else { "NOT SENT" };
    println!(
        "Frame {}/{}: {} after {} attempt(s), {} bytes on the wire",
        frame.sequence,
        frame.total,
        status,
        frame.attempts,
        frame.stuffed.len()
    );
    match frame.layout() {
        Ok(layout) => println!("{layout}"),
        Err(e) => println!("  (cannot describe frame: {e})"),
    }
}

/// Print receive events until the message completes or the link goes quiet.
fn drain_events(events: &Receiver<ReceiveEvent>) {
    loop {
        match events.recv_timeout(SETTLE_TIMEOUT) {
            Ok(event) => {
                let done = matches!(event, ReceiveEvent::MessageComplete(_));
                print_event(&event);
                if done {
                    return;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                println!("Receiver: message incomplete");
                return;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn print_event(event: &ReceiveEvent) {
    match event {
        ReceiveEvent::JamDetected { count } => println!("Receiver: jam signal x{count}"),
        ReceiveEvent::FrameReceived {
            sequence,
            total,
            corrupted_text,
            text,
            bits_injected,
            fec,
        } => {
            println!("Receiver: frame {sequence}/{total}");
            if let Some(corrupted) = corrupted_text {
                println!("  with {bits_injected} bit error(s): {corrupted:?}");
            }
            println!("  FEC: {} (code {})", describe_fec(fec), fec.code());
            println!("  payload: {text:?}");
        }
        ReceiveEvent::MessageComplete(text) => println!("Received: {text:?}"),
        ReceiveEvent::MessageDropped(gap) => println!(
            "Receiver: expected frame {} but got {}, dropped {} buffered frame(s)",
            gap.expected, gap.received, gap.dropped_frames
        ),
        ReceiveEvent::Malformed { reason } => println!("Receiver: malformed frame ({reason})"),
    }
}

fn describe_fec(fec: &FecStatus) -> String {
    match fec {
        FecStatus::Checked(Correction::Clean) => "clean".to_string(),
        FecStatus::Checked(Correction::Corrected { position }) => {
            format!("corrected bit {position}")
        }
        FecStatus::Checked(Correction::Uncorrectable { syndrome }) => {
            format!("uncorrectable (syndrome {syndrome})")
        }
        FecStatus::EmptyPayload => "empty payload".to_string(),
    }
}
