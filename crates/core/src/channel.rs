//! Duplex byte channel.
//!
//! The link only needs a handful of operations from its transport: open and
//! close an endpoint, write raw bytes, and have received bytes pushed onto a
//! queue from a background reader. [`DuplexChannel`] captures exactly that,
//! so the same send and receive paths run over a serial port driver or the
//! in-memory [`LoopbackChannel`] pair used by the demo and the tests.
//!
//! # Thread Safety
//!
//! Channels are shared between the sending worker (writes) and the owner of
//! the receive path (reader control), so every operation takes `&self` and
//! implementations synchronize internally.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use tracing::{debug, trace};

use crate::error::{ChannelError, Result};

/// Baud rate used when none is requested.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Standard rates offered for an endpoint.
pub const STANDARD_BAUD_RATES: [u32; 16] = [
    50, 75, 110, 134, 150, 300, 600, 1200, 1800, 2400, 4800, 9600, 19200, 38400, 57600, 115200,
];

/// Byte transport with asynchronous receive.
pub trait DuplexChannel: Send + Sync {
    /// Endpoints this channel can open.
    fn available_endpoints(&self) -> Vec<String>;

    /// Open `endpoint` at `baud_rate`.
    fn open(&self, endpoint: &str, baud_rate: u32) -> Result<()>;

    /// Stop reading and release the endpoint. Idempotent.
    fn close(&self);

    fn is_open(&self) -> bool;

    /// Change the rate of an open endpoint.
    fn set_baud_rate(&self, baud_rate: u32) -> Result<()>;

    /// Current rate, if open.
    fn baud_rate(&self) -> Option<u32>;

    /// Name of the open endpoint, if any.
    fn endpoint(&self) -> Option<String>;

    /// Write raw bytes.
    ///
    /// # Errors
    /// `ChannelError::NotOpen` or `ChannelError::WriteFailed`.
    fn write(&self, bytes: &[u8]) -> Result<()>;

    /// Start delivering received chunks to `sink` from a background reader.
    fn start_async_read(&self, sink: Sender<Vec<u8>>) -> Result<()>;

    /// Stop the background reader and wait for it to exit. Idempotent.
    fn stop_async_read(&self);
}

/// Background reader bookkeeping.
struct Reader {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct EndpointState {
    open: bool,
    baud_rate: u32,
    reader: Option<Reader>,
}

/// One end of an in-memory duplex link.
///
/// Bytes written on one endpoint arrive, chunk for chunk, on the other.
/// Writes can be made to fail on demand to exercise collision handling.
pub struct LoopbackChannel {
    name: String,
    /// Towards the peer's inbound queue
    outbound: Sender<Vec<u8>>,
    /// Chunks written by the peer
    inbound: Receiver<Vec<u8>>,
    state: Mutex<EndpointState>,
    failing_writes: AtomicUsize,
    bytes_written: AtomicU64,
}

impl LoopbackChannel {
    /// Create two connected endpoints.
    pub fn pair(a: &str, b: &str) -> (Self, Self) {
        let (to_b, from_a) = unbounded();
        let (to_a, from_b) = unbounded();

        (Self::endpoint_of(a, to_b, from_b), Self::endpoint_of(b, to_a, from_a))
    }

    fn endpoint_of(name: &str, outbound: Sender<Vec<u8>>, inbound: Receiver<Vec<u8>>) -> Self {
        Self {
            name: name.to_string(),
            outbound,
            inbound,
            state: Mutex::new(EndpointState::default()),
            failing_writes: AtomicUsize::new(0),
            bytes_written: AtomicU64::new(0),
        }
    }

    /// Make the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Bytes successfully written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EndpointState> {
        // A panicked reader cannot leave the state half-updated.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_write_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl DuplexChannel for LoopbackChannel {
    fn available_endpoints(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn open(&self, endpoint: &str, baud_rate: u32) -> Result<()> {
        if endpoint != self.name {
            return Err(ChannelError::OpenFailed {
                endpoint: endpoint.to_string(),
                reason: format!("loopback endpoint is {:?}", self.name),
            }
            .into());
        }
        if baud_rate == 0 {
            return Err(ChannelError::OpenFailed {
                endpoint: endpoint.to_string(),
                reason: "baud rate must be positive".to_string(),
            }
            .into());
        }

        let mut state = self.lock();
        state.open = true;
        state.baud_rate = baud_rate;
        debug!(endpoint, baud_rate, "endpoint opened");
        Ok(())
    }

    fn close(&self) {
        self.stop_async_read();
        let mut state = self.lock();
        if state.open {
            state.open = false;
            debug!(endpoint = %self.name, "endpoint closed");
        }
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn set_baud_rate(&self, baud_rate: u32) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(ChannelError::NotOpen.into());
        }
        state.baud_rate = baud_rate;
        Ok(())
    }

    fn baud_rate(&self) -> Option<u32> {
        let state = self.lock();
        state.open.then_some(state.baud_rate)
    }

    fn endpoint(&self) -> Option<String> {
        self.lock().open.then(|| self.name.clone())
    }

    fn write(&self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(ChannelError::NotOpen.into());
        }
        if self.take_write_failure() {
            return Err(ChannelError::WriteFailed { len: bytes.len() }.into());
        }

        self.outbound
            .send(bytes.to_vec())
            .map_err(|_| ChannelError::Disconnected)?;
        self.bytes_written.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        trace!(endpoint = %self.name, len = bytes.len(), "wrote bytes");
        Ok(())
    }

    fn start_async_read(&self, sink: Sender<Vec<u8>>) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Err(ChannelError::NotOpen.into());
        }
        if state.reader.is_some() {
            return Err(ChannelError::AlreadyReading.into());
        }

        let (stop, stopped) = unbounded::<()>();
        let inbound = self.inbound.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-reader", self.name))
            .spawn(move || loop {
                select! {
                    recv(inbound) -> chunk => match chunk {
                        Ok(bytes) => {
                            if sink.send(bytes).is_err() {
                                break;
                            }
                        }
                        Err(_) => break,
                    },
                    recv(stopped) -> _ => break,
                }
            })
            .map_err(|e| ChannelError::OpenFailed {
                endpoint: self.name.clone(),
                reason: format!("cannot spawn reader: {e}"),
            })?;

        state.reader = Some(Reader { stop, handle });
        Ok(())
    }

    fn stop_async_read(&self) {
        let reader = self.lock().reader.take();
        if let Some(reader) = reader {
            let _ = reader.stop.send(());
            let _ = reader.handle.join();
        }
    }
}

impl Drop for LoopbackChannel {
    fn drop(&mut self) {
        self.stop_async_read();
    }
}

impl std::fmt::Debug for LoopbackChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackChannel")
            .field("name", &self.name)
            .field("bytes_written", &self.bytes_written())
            .finish()
    }
}
