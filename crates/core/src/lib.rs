//! framelink-core: data-link layer emulation over a byte-oriented duplex channel
//!
//! This library turns text messages into delimited, error-protected frames
//! and moves them across a duplex byte channel:
//! - Splits messages into 64-byte segments, one frame each
//! - Protects every payload with an extended Hamming (SECDED) code
//! - Escapes reserved bytes so frame boundaries survive any payload
//! - Arbitrates a shared medium with CSMA/CD, jam signals and backoff
//! - Recovers frames from a continuous byte stream and rebuilds messages
//!
//! # Architecture
//!
//! The system is designed around clear module boundaries:
//! - `bitio`: Bit vectors for the FEC code
//! - `hamming`: Hamming FCS computation and single-bit correction
//! - `frame`: Frame wire layout and the transmit inspector
//! - `stuffing`: Byte stuffing and unstuffing
//! - `segment`: Message segmentation and payload concatenation
//! - `reassembly`: Frame extraction from a byte stream
//! - `random`: Seedable randomness for the stochastic parts
//! - `fault`: Receive-side bit error injection
//! - `channel`: Duplex channel trait and in-memory loopback pair
//! - `mac`: CSMA/CD medium access controller
//! - `transcode`: Text to wire encoding
//! - `link`: Send worker and receive consumer
//! - `metrics`: Observable link behavior
//!
//! # Design Principles
//!
//! - **No panics**: All errors are structured and recoverable
//! - **Owned state**: The MAC is constructed and owned, never global
//! - **Deterministic**: Seeded randomness makes runs reproducible
//! - **Observable**: Receive events and metrics for every pipeline stage

pub mod bitio;
pub mod channel;
pub mod error;
pub mod fault;
pub mod frame;
pub mod hamming;
pub mod link;
pub mod mac;
pub mod metrics;
pub mod random;
pub mod reassembly;
pub mod segment;
pub mod stuffing;
pub mod transcode;

// Re-export commonly used types
pub use channel::{DuplexChannel, LoopbackChannel};
pub use error::{Error, Result};
pub use frame::Frame;
pub use hamming::Correction;
pub use link::{LinkConfig, LinkReceiver, LinkSender, ReceiveEvent};
pub use mac::{MacConfig, MediumAccessController};
pub use metrics::LinkMetrics;
