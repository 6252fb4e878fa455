//! Lossy telemetry ring sink exposed as a virtual device.
//!
//! Producers append newline-terminated telemetry records; the ring keeps the
//! most recent 8192 bytes and silently overwrites the oldest data when full.
//! Consumers drain bytes FIFO through a shared cursor, either non-blocking
//! (`WouldBlock` when empty) or blocking until a producer appends.

use crate::config::{TELEMETRY_LINE_MAX, TELEMETRY_RING_CAPACITY};
use arrayvec::ArrayString;
use std::fmt::Write as _;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RingError {
    #[error("no telemetry data available")]
    WouldBlock,
}

struct RingInner {
    buf: Box<[u8; TELEMETRY_RING_CAPACITY]>,
    // Monotonic cursors; index = cursor % capacity. write == read means
    // empty, so the full capacity is usable.
    write: u64,
    read: u64,
}

/// Bounded byte ring with overwrite-oldest semantics.
pub struct TelemetryRing {
    inner: Mutex<RingInner>,
    readable: Condvar,
}

impl TelemetryRing {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RingInner {
                buf: Box::new([0u8; TELEMETRY_RING_CAPACITY]),
                write: 0,
                read: 0,
            }),
            readable: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append bytes, overwriting the oldest data when the ring is full.
    /// Never blocks. Returns the number of bytes stored.
    pub fn append(&self, data: &[u8]) -> usize {
        let cap = TELEMETRY_RING_CAPACITY as u64;
        // Anything older than the trailing capacity window is gone anyway.
        let src = if data.len() > TELEMETRY_RING_CAPACITY {
            &data[data.len() - TELEMETRY_RING_CAPACITY..]
        } else {
            data
        };

        let mut inner = self.lock();
        for &byte in src {
            let idx = (inner.write % cap) as usize;
            inner.buf[idx] = byte;
            inner.write += 1;
        }
        if inner.write - inner.read > cap {
            inner.read = inner.write - cap;
        }
        drop(inner);

        if !src.is_empty() {
            self.readable.notify_all();
        }
        src.len()
    }

    /// Drain up to `buf.len()` bytes in FIFO order.
    ///
    /// With `blocking` set, an empty ring waits for the next append;
    /// otherwise it returns `RingError::WouldBlock`.
    pub fn read(&self, buf: &mut [u8], blocking: bool) -> Result<usize, RingError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let cap = TELEMETRY_RING_CAPACITY as u64;
        let mut inner = self.lock();
        while inner.write == inner.read {
            if !blocking {
                return Err(RingError::WouldBlock);
            }
            inner = self
                .readable
                .wait(inner)
                .unwrap_or_else(|e| e.into_inner());
        }

        let available = (inner.write - inner.read) as usize;
        let count = available.min(buf.len());
        for slot in buf[..count].iter_mut() {
            let idx = (inner.read % cap) as usize;
            *slot = inner.buf[idx];
            inner.read += 1;
        }
        Ok(count)
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        let inner = self.lock();
        (inner.write - inner.read) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TelemetryRing {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable device endpoint over a shared ring.
///
/// All handles share one read cursor, matching a single device file with
/// multiple opens. `std::io::Read` is non-blocking; an empty ring surfaces
/// as `io::ErrorKind::WouldBlock`.
#[derive(Clone)]
pub struct TelemetryDevice {
    ring: Arc<TelemetryRing>,
}

impl TelemetryDevice {
    pub fn new(ring: Arc<TelemetryRing>) -> Self {
        Self { ring }
    }

    /// Blocking read; parks until data arrives.
    pub fn read_blocking(&self, buf: &mut [u8]) -> usize {
        match self.ring.read(buf, true) {
            Ok(n) => n,
            // Blocking reads only return with data.
            Err(RingError::WouldBlock) => 0,
        }
    }
}

impl io::Read for TelemetryDevice {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ring
            .read(buf, false)
            .map_err(|e| io::Error::new(io::ErrorKind::WouldBlock, e))
    }
}

/// Format one telemetry record:
/// `<sec>.<millis>,alt=<f>,vel=<f>,thr=<int>,go=<int>\n`
pub fn format_telemetry_line(
    timestamp_ms: u64,
    altitude_m: f64,
    velocity_ms: f64,
    throttle: i32,
    mission_go: bool,
) -> ArrayString<TELEMETRY_LINE_MAX> {
    let mut line = ArrayString::new();
    // Fields are width-bounded well under the buffer capacity.
    let _ = write!(
        &mut line,
        "{}.{:03},alt={:.2},vel={:.2},thr={},go={}\n",
        timestamp_ms / 1000,
        timestamp_ms % 1000,
        altitude_m,
        velocity_ms,
        throttle,
        i32::from(mission_go),
    );
    line
}
