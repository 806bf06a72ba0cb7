//! Latest heart-rate reading, shared between the read task and callers.
//!
//! The slot is a single `AtomicU64`, so a reader never observes a value from
//! one frame paired with the timestamp of another. Layout:
//!
//! ```text
//! ┌───────────────────────────┬─────────┬─────────┐
//! │ observed_at (ms, 55 bits) │ present │ value   │
//! │ bits 9..64                │ bit 8   │ bits 0-7│
//! └───────────────────────────┴─────────┴─────────┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

const PRESENT: u64 = 1 << 8;
const TIMESTAMP_SHIFT: u32 = 9;
const TIMESTAMP_MAX: u64 = u64::MAX >> TIMESTAMP_SHIFT;

/// A heart-rate sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reading {
    /// Beats per minute.
    pub value: u8,
    /// Milliseconds since the Unix epoch when the frame was decoded.
    pub observed_at_ms: u64,
}

impl Reading {
    /// Create a reading with an explicit timestamp.
    pub fn new(value: u8, observed_at: SystemTime) -> Self {
        let observed_at_ms = observed_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self {
            value,
            observed_at_ms: observed_at_ms.min(TIMESTAMP_MAX),
        }
    }

    /// Create a reading stamped with the current time.
    pub fn now(value: u8) -> Self {
        Self::new(value, SystemTime::now())
    }

    /// Timestamp as a `SystemTime`.
    pub fn observed_at(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.observed_at_ms)
    }

    #[inline]
    fn pack(&self) -> u64 {
        (self.observed_at_ms.min(TIMESTAMP_MAX) << TIMESTAMP_SHIFT) | PRESENT | self.value as u64
    }

    #[inline]
    fn unpack(packed: u64) -> Option<Self> {
        if packed & PRESENT == 0 {
            return None;
        }
        Some(Self {
            value: packed as u8,
            observed_at_ms: packed >> TIMESTAMP_SHIFT,
        })
    }
}

/// Lock-free last-writer-wins slot for the latest [`Reading`].
#[derive(Debug, Default)]
pub struct ReadingSlot {
    packed: AtomicU64,
}

impl ReadingSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a reading, replacing any previous one.
    #[inline]
    pub fn publish(&self, reading: Reading) {
        self.packed.store(reading.pack(), Ordering::Release);
    }

    /// The latest reading, if any has been published.
    #[inline]
    pub fn latest(&self) -> Option<Reading> {
        Reading::unpack(self.packed.load(Ordering::Acquire))
    }
}
