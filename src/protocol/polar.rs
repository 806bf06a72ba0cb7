//! Polar WearLink frame profile.
//!
//! Messages start with a four byte header:
//! `0xFE`, a length byte, its one's complement, and a sequence number below
//! 16. The heart-rate value sits two bytes after the header.

use super::FrameProfile;

/// Polar frame size in bytes.
pub const POLAR_FRAME_SIZE: usize = 16;

/// Message header byte.
pub const POLAR_HEADER: u8 = 0xFE;

const HEADER_LEN: usize = 4;
const OFFSET_HR: usize = 5;
const SEQUENCE_LIMIT: u8 = 16;

/// Trailing bytes a message start must leave before it counts for extraction.
const MIN_TAIL: usize = 8;

/// Default message length: header, status and heart-rate bytes plus RR slack.
const DEFAULT_LEN: u8 = 8;

/// Polar WearLink profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolarProfile;

impl PolarProfile {
    /// Provider name.
    pub const NAME: &'static str = "Polar";
}

/// Whether a message header starts at `pos`.
pub(crate) fn starts_message_at(buf: &[u8], pos: usize) -> bool {
    if buf.len() < pos + HEADER_LEN {
        return false;
    }

    buf[pos] == POLAR_HEADER
        && buf[pos + 2] == 0xFF - buf[pos + 1]
        && buf[pos + 3] < SEQUENCE_LIMIT
}

impl FrameProfile for PolarProfile {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn frame_size(&self) -> usize {
        POLAR_FRAME_SIZE
    }

    /// The last matching header wins, so the most recent message is reported.
    fn validate_and_extract(&self, frame: &[u8]) -> Option<u8> {
        (0..frame.len().saturating_sub(MIN_TAIL))
            .filter(|&pos| starts_message_at(frame, pos))
            .last()
            .map(|pos| frame[pos + OFFSET_HR])
    }

    fn find_resync_offset(&self, buffer: &[u8]) -> Option<usize> {
        (0..buffer.len()).find(|&pos| starts_message_at(buffer, pos))
    }
}

/// Build a Polar frame carrying `hr` with the given sequence number.
///
/// `seq` is reduced modulo 16.
pub fn build_frame(hr: u8, seq: u8) -> [u8; POLAR_FRAME_SIZE] {
    let mut frame = [0u8; POLAR_FRAME_SIZE];
    frame[0] = POLAR_HEADER;
    frame[1] = DEFAULT_LEN;
    frame[2] = 0xFF - DEFAULT_LEN;
    frame[3] = seq % SEQUENCE_LIMIT;
    frame[4] = 0xF1;
    frame[OFFSET_HR] = hr;
    frame
}
