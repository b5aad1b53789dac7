//! Frame-time reference used to stamp outgoing events.
//!
//! The realtime callback publishes the frame time at the start of each
//! block; application threads extrapolate from it with the wall clock.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Instant;

/// Source of the current transport frame time.
pub trait FrameClock: Send + Sync {
    /// Estimated frame time right now.
    fn frame_time(&self) -> u32;

    /// Called by the realtime thread at the start of every block.
    fn block_started(&self, _last_frame_time: u32) {}

    fn set_sample_rate(&self, _sample_rate: u32) {}
}

/// Extrapolating clock fed by the realtime callback.
#[derive(Debug)]
pub struct TransportClock {
    base: Instant,
    /// Block start frame in the high half, block start in microseconds
    /// since `base` (wrapping) in the low half.
    block: AtomicU64,
    sample_rate: AtomicU32,
}

impl TransportClock {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            base: Instant::now(),
            block: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
        }
    }

    #[inline]
    fn micros(&self) -> u32 {
        self.base.elapsed().as_micros() as u32
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Relaxed)
    }

    /// Frame time of the most recently published block start.
    pub fn last_block_start(&self) -> u32 {
        (self.block.load(Ordering::Acquire) >> 32) as u32
    }

    fn frames_since(&self, micros: u32) -> u32 {
        let block = self.block.load(Ordering::Acquire);
        let start_frame = (block >> 32) as u32;
        let elapsed = micros.wrapping_sub(block as u32) as u64;
        let frames = elapsed * self.sample_rate() as u64 / 1_000_000;
        start_frame.wrapping_add(frames as u32)
    }
}

impl FrameClock for TransportClock {
    fn frame_time(&self) -> u32 {
        self.frames_since(self.micros())
    }

    fn block_started(&self, last_frame_time: u32) {
        let packed = ((last_frame_time as u64) << 32) | self.micros() as u64;
        self.block.store(packed, Ordering::Release);
    }

    fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Relaxed);
    }
}

/// Clock that only moves when told to. For offline processing and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    frame: AtomicU32,
}

impl ManualClock {
    pub fn new(frame: u32) -> Self {
        Self {
            frame: AtomicU32::new(frame),
        }
    }

    pub fn set(&self, frame: u32) {
        self.frame.store(frame, Ordering::Release);
    }

    pub fn advance(&self, frames: u32) {
        // fetch_add on AtomicU32 wraps.
        self.frame.fetch_add(frames, Ordering::AcqRel);
    }
}

impl FrameClock for ManualClock {
    fn frame_time(&self) -> u32 {
        self.frame.load(Ordering::Acquire)
    }
}
