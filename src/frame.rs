//! Frame types and the capture/processing hand-off.
//!
//! - `RawFrame`: one RGB24 frame at native capture resolution.
//! - `ScaledFrame`: a frame resized to the detector's input dimensions.
//! - `FrameRing`: bounded ring between the capture thread and the
//!   processing thread with an explicit drop-oldest overflow policy.
//!
//! The ring never blocks the producer: when full, the oldest frame is
//! evicted and counted as dropped. If detection falls behind the capture
//! rate, old frames are shed here rather than queueing without bound.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Default ring capacity. Roughly half a second of backlog at 15 fps.
pub const RING_CAPACITY: usize = 8;

// ----------------------------------------------------------------------------
// RawFrame
// ----------------------------------------------------------------------------

/// One RGB24 frame from a capture source.
///
/// Pixel data is row-major, 3 bytes per pixel, stride = width * 3.
/// Frames are freshly allocated per capture and never shared for mutation.
pub struct RawFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic capture sequence number, assigned by the source.
    pub seq: u64,
}

impl RawFrame {
    /// Create a frame, validating that the buffer matches the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} RGB bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            seq,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn stride(&self) -> usize {
        self.width as usize * 3
    }

    pub fn into_pixels(self) -> Vec<u8> {
        self.data
    }
}

// ----------------------------------------------------------------------------
// ScaledFrame
// ----------------------------------------------------------------------------

/// A frame resized to the detector's input dimensions.
///
/// Exists only for the duration of one detector invocation.
pub struct ScaledFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl ScaledFrame {
    pub fn pixels(&self) -> &[u8] {
        &self.data
    }
}

// ----------------------------------------------------------------------------
// FrameRing
// ----------------------------------------------------------------------------

struct RingInner {
    frames: VecDeque<RawFrame>,
    dropped: u64,
    closed: bool,
}

/// Bounded frame ring with drop-oldest overflow.
///
/// One producer (capture thread), one consumer (processing thread).
/// `push` never blocks; `pop` waits up to a timeout for a frame.
pub struct FrameRing {
    inner: Mutex<RingInner>,
    available: Condvar,
    capacity: usize,
}

impl FrameRing {
    pub fn new() -> Self {
        Self::with_capacity(RING_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RingInner {
                frames: VecDeque::with_capacity(capacity.max(1)),
                dropped: 0,
                closed: false,
            }),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    /// Push a frame. When the ring is full the oldest frame is evicted
    /// and counted as dropped; the producer is never blocked.
    pub fn push(&self, frame: RawFrame) {
        let mut inner = self.inner.lock().expect("frame ring lock poisoned");
        if inner.closed {
            return;
        }
        while inner.frames.len() >= self.capacity {
            inner.frames.pop_front();
            inner.dropped += 1;
        }
        inner.frames.push_back(frame);
        drop(inner);
        self.available.notify_one();
    }

    /// Pop the oldest retained frame, waiting up to `timeout`.
    ///
    /// Returns `None` on timeout or after `close()` once drained.
    pub fn pop(&self, timeout: Duration) -> Option<RawFrame> {
        let mut inner = self.inner.lock().expect("frame ring lock poisoned");
        loop {
            if let Some(frame) = inner.frames.pop_front() {
                return Some(frame);
            }
            if inner.closed {
                return None;
            }
            let (guard, wait) = self
                .available
                .wait_timeout(inner, timeout)
                .expect("frame ring lock poisoned");
            inner = guard;
            if wait.timed_out() {
                return inner.frames.pop_front();
            }
        }
    }

    /// Close the ring. Pending frames remain poppable; further pushes are
    /// discarded.
    pub fn close(&self) {
        let mut inner = self.inner.lock().expect("frame ring lock poisoned");
        inner.closed = true;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().expect("frame ring lock poisoned").closed
    }

    /// Frames evicted due to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().expect("frame ring lock poisoned").dropped
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .expect("frame ring lock poisoned")
            .frames
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
