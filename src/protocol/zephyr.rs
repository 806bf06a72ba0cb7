//! Zephyr HxM frame profile.
//!
//! ```text
//! ┌─────┬─────┬─────┬───────────┬────┬───────────┬─────┬─────┐
//! │ STX │ MID │ DLC │ ...       │ HR │ ...       │ CRC │ ETX │
//! │  0  │  1  │  2  │ 3..12     │ 12 │ 13..58    │ 58  │ 59  │
//! └─────┴─────┴─────┴───────────┴────┴───────────┴─────┴─────┘
//! ```
//!
//! The checksum covers bytes `3..58`.

use super::checksum8;
use super::FrameProfile;

/// Zephyr frame size in bytes.
pub const ZEPHYR_FRAME_SIZE: usize = 60;

/// Start-of-text marker.
pub const ZEPHYR_START: u8 = 0x02;

/// End-of-text marker.
pub const ZEPHYR_END: u8 = 0x03;

const BYTE_STX: usize = 0;
const BYTE_HR: usize = 12;
const BYTE_CRC: usize = 58;
const BYTE_ETX: usize = 59;

const CHECKSUM_START: usize = 3;
const CHECKSUM_LEN: usize = 55;

/// Message id of the general data packet.
const MSG_ID_GENERAL: u8 = 0x26;

/// Zephyr HxM profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZephyrProfile;

impl ZephyrProfile {
    /// Provider name.
    pub const NAME: &'static str = "Zephyr";
}

impl FrameProfile for ZephyrProfile {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn frame_size(&self) -> usize {
        ZEPHYR_FRAME_SIZE
    }

    fn validate_and_extract(&self, frame: &[u8]) -> Option<u8> {
        let ok = frame.len() >= ZEPHYR_FRAME_SIZE
            && frame[BYTE_STX] == ZEPHYR_START
            && frame[BYTE_ETX] == ZEPHYR_END
            && checksum8(frame, CHECKSUM_START, CHECKSUM_LEN) == frame[BYTE_CRC];

        ok.then(|| frame[BYTE_HR])
    }

    /// Offset of the first END/START boundary pair.
    fn find_resync_offset(&self, buffer: &[u8]) -> Option<usize> {
        buffer
            .windows(2)
            .position(|pair| pair[0] == ZEPHYR_END && pair[1] == ZEPHYR_START)
    }
}

/// Build a valid Zephyr general data frame carrying `hr`.
///
/// Useful for simulated sensors and tests.
pub fn build_frame(hr: u8) -> [u8; ZEPHYR_FRAME_SIZE] {
    let mut frame = [0u8; ZEPHYR_FRAME_SIZE];
    frame[BYTE_STX] = ZEPHYR_START;
    frame[1] = MSG_ID_GENERAL;
    frame[2] = CHECKSUM_LEN as u8;
    frame[BYTE_HR] = hr;
    frame[BYTE_CRC] = checksum8(&frame, CHECKSUM_START, CHECKSUM_LEN);
    frame[BYTE_ETX] = ZEPHYR_END;
    frame
}
