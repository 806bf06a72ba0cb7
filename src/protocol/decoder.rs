//! Fixed-size frame decoder with resynchronization.
//!
//! The decoder owns a buffer of exactly one frame. Bytes are read straight
//! into the unfilled tail; once the buffer is full a decode attempt is made:
//! - valid frame: the value is returned and the buffer is cleared
//! - invalid frame, resync point found: the bytes from that point become the
//!   new prefix and are kept for the next fill
//! - invalid frame, no resync point: the whole buffer is discarded
//!
//! A stream that starts mid-frame, drops bytes or carries noise realigns
//! within about one extra frame of input.
//!
//! # Example
//!
//! ```
//! use hrlink::protocol::{zephyr, FrameDecoder, ZephyrProfile};
//!
//! let mut decoder = FrameDecoder::new(ZephyrProfile);
//! let frame = zephyr::build_frame(64);
//!
//! assert!(decoder.push(&frame[..25]).is_empty());
//! assert_eq!(decoder.push(&frame[25..]), vec![64]);
//! ```

use bytes::Buf;

use super::FrameProfile;

/// Outcome of committing bytes to the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// The frame buffer is not full yet.
    Pending,
    /// A valid frame was decoded.
    Value(u8),
    /// Invalid frame; `dropped` leading bytes were discarded and the rest kept.
    Resynced { dropped: usize },
    /// Invalid frame with no resync point; the buffer was cleared.
    Discarded,
}

/// Streaming decoder for one connection.
pub struct FrameDecoder<P> {
    /// Framing policy.
    profile: P,
    /// Frame buffer, exactly `frame_size` long.
    bytes: Box<[u8]>,
    /// Number of valid bytes at the front of `bytes`.
    filled: usize,
}

impl<P: FrameProfile> FrameDecoder<P> {
    /// Create a decoder sized for the profile's frames.
    pub fn new(profile: P) -> Self {
        let size = profile.frame_size();
        Self {
            profile,
            bytes: vec![0u8; size].into_boxed_slice(),
            filled: 0,
        }
    }

    /// The framing profile in use.
    pub fn profile(&self) -> &P {
        &self.profile
    }

    /// Frame size (buffer capacity).
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.bytes.len()
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Check if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Bytes buffered so far.
    pub fn buffered(&self) -> &[u8] {
        &self.bytes[..self.filled]
    }

    /// The unfilled tail of the frame buffer, for reading into directly.
    ///
    /// Never empty: a full buffer is always decoded inside [`commit`](Self::commit).
    pub fn unfilled_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[self.filled..]
    }

    /// Mark `n` bytes of [`unfilled_mut`](Self::unfilled_mut) as filled and
    /// decode if the frame is complete.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the unfilled length.
    pub fn commit(&mut self, n: usize) -> Decoded {
        assert!(
            n <= self.bytes.len() - self.filled,
            "committed {} bytes into {} free",
            n,
            self.bytes.len() - self.filled
        );
        self.filled += n;

        if self.filled < self.bytes.len() {
            return Decoded::Pending;
        }

        self.decode_full()
    }

    /// Feed arbitrary data and return every value decoded from it.
    pub fn push<B: Buf>(&mut self, mut data: B) -> Vec<u8> {
        let mut values = Vec::new();

        while data.has_remaining() {
            let dst = self.unfilled_mut();
            let n = dst.len().min(data.remaining());
            data.copy_to_slice(&mut dst[..n]);

            if let Decoded::Value(value) = self.commit(n) {
                values.push(value);
            }
        }

        values
    }

    /// Drop all buffered bytes.
    pub fn clear(&mut self) {
        self.filled = 0;
    }

    fn decode_full(&mut self) -> Decoded {
        let size = self.bytes.len();

        if let Some(value) = self.profile.validate_and_extract(&self.bytes) {
            self.filled = 0;
            return Decoded::Value(value);
        }

        // Offset 0 would leave the buffer full and unchanged.
        let offset = self
            .profile
            .find_resync_offset(&self.bytes)
            .map(|offset| offset.max(1))
            .filter(|&offset| offset < size);

        match offset {
            Some(offset) => {
                self.bytes.copy_within(offset.., 0);
                self.filled = size - offset;
                tracing::trace!(
                    profile = self.profile.name(),
                    dropped = offset,
                    "Resynchronized frame buffer"
                );
                Decoded::Resynced { dropped: offset }
            }
            None => {
                self.filled = 0;
                tracing::trace!(profile = self.profile.name(), "Discarded frame buffer");
                Decoded::Discarded
            }
        }
    }
}

impl<P: FrameProfile> std::fmt::Debug for FrameDecoder<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("profile", &self.profile.name())
            .field("frame_size", &self.bytes.len())
            .field("filled", &self.filled)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{polar, zephyr, PolarProfile, ZephyrProfile};

    #[test]
    fn test_single_complete_frame() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        assert_eq!(decoder.push(&zephyr::build_frame(80)[..]), vec![80]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_partial_reads_accumulate() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let frame = zephyr::build_frame(91);

        assert!(decoder.push(&frame[..10]).is_empty());
        assert_eq!(decoder.len(), 10);
        assert!(decoder.push(&frame[10..59]).is_empty());
        assert_eq!(decoder.len(), 59);
        assert_eq!(decoder.push(&frame[59..]), vec![91]);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut decoder = FrameDecoder::new(PolarProfile);
        let mut values = Vec::new();

        for hr in [70u8, 71, 72] {
            for byte in polar::build_frame(hr, hr) {
                values.extend(decoder.push(&[byte][..]));
            }
        }

        assert_eq!(values, vec![70, 71, 72]);
    }

    #[test]
    fn test_commit_into_unfilled() {
        let mut decoder = FrameDecoder::new(PolarProfile);
        let frame = polar::build_frame(55, 0);

        let dst = decoder.unfilled_mut();
        assert_eq!(dst.len(), 16);
        dst[..8].copy_from_slice(&frame[..8]);
        assert_eq!(decoder.commit(8), Decoded::Pending);

        let dst = decoder.unfilled_mut();
        assert_eq!(dst.len(), 8);
        dst.copy_from_slice(&frame[8..]);
        assert_eq!(decoder.commit(8), Decoded::Value(55));
    }

    #[test]
    #[should_panic]
    fn test_commit_overflow_panics() {
        let mut decoder = FrameDecoder::new(PolarProfile);
        decoder.commit(17);
    }

    #[test]
    fn test_leading_end_marker_realigns_within_one_byte() {
        // Stream picks up on the previous frame's ETX byte.
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let mut stream = vec![zephyr::ZEPHYR_END];
        stream.extend_from_slice(&zephyr::build_frame(120));

        assert!(decoder.push(&stream[..30]).is_empty());
        assert_eq!(decoder.push(&stream[30..]), vec![120]);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_noise_then_frames_recovers() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let mut stream = vec![0xAA];
        stream.extend_from_slice(&zephyr::build_frame(101));
        stream.extend_from_slice(&zephyr::build_frame(102));
        stream.extend_from_slice(&zephyr::build_frame(103));

        let (head, tail) = stream.split_at(37);
        let mut values = decoder.push(head);
        values.extend(decoder.push(tail));

        // The first frame straddles the noise; alignment is back by the second.
        assert_eq!(values, vec![102, 103]);
    }

    #[test]
    fn test_zephyr_noise_waits_for_next_boundary() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let mut stream = vec![0xAA];
        stream.extend_from_slice(&zephyr::build_frame(77));

        // No ETX precedes the frame's STX, so there is nothing to realign on.
        assert!(decoder.push(&stream[..30]).is_empty());
        assert!(decoder.push(&stream[30..]).is_empty());
        assert_eq!(decoder.len(), 1);

        // The trailing ETX meets the next frame's STX.
        assert_eq!(decoder.push(&zephyr::build_frame(78)[..]), vec![78]);
    }

    #[test]
    fn test_dropped_byte_recovers() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let mut stream = Vec::new();
        let mut first = zephyr::build_frame(66).to_vec();
        first.remove(20);
        stream.extend_from_slice(&first);
        stream.extend_from_slice(&zephyr::build_frame(67));
        stream.extend_from_slice(&zephyr::build_frame(68));

        // The short frame ends in the next frame's STX, which the END/START
        // boundary search picks up.
        assert_eq!(decoder.push(&stream[..]), vec![67, 68]);
    }

    #[test]
    fn test_polar_noise_prefix() {
        let mut decoder = FrameDecoder::new(PolarProfile);
        let mut stream = vec![0x13];
        stream.extend_from_slice(&polar::build_frame(84, 3));

        assert!(decoder.push(&stream[..7]).is_empty());
        assert_eq!(decoder.push(&stream[7..]), vec![84]);
    }

    #[test]
    fn test_resync_keeps_tail() {
        let mut decoder = FrameDecoder::new(PolarProfile);
        let frame = polar::build_frame(77, 1);

        let dst = decoder.unfilled_mut();
        dst[..10].fill(0);
        dst[10..].copy_from_slice(&frame[..6]);
        assert_eq!(decoder.commit(16), Decoded::Resynced { dropped: 10 });
        assert_eq!(decoder.buffered(), &frame[..6]);

        assert_eq!(decoder.push(&frame[6..]), vec![77]);
    }

    #[test]
    fn test_garbage_discarded() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let dst = decoder.unfilled_mut();
        dst.fill(0x55);
        assert_eq!(decoder.commit(60), Decoded::Discarded);
        assert!(decoder.is_empty());
    }

    #[test]
    fn test_boundary_at_start_makes_progress() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        let dst = decoder.unfilled_mut();
        dst.fill(0);
        dst[0] = zephyr::ZEPHYR_END;
        dst[1] = zephyr::ZEPHYR_START;
        assert_eq!(decoder.commit(60), Decoded::Resynced { dropped: 1 });
        assert_eq!(decoder.len(), 59);
        assert_eq!(decoder.buffered()[0], zephyr::ZEPHYR_START);
    }

    #[test]
    fn test_clear() {
        let mut decoder = FrameDecoder::new(ZephyrProfile);
        decoder.push(&[1u8, 2, 3][..]);
        assert_eq!(decoder.len(), 3);
        decoder.clear();
        assert!(decoder.is_empty());
        assert_eq!(decoder.unfilled_mut().len(), 60);
    }

    #[test]
    fn test_dyn_profile() {
        let mut decoder = FrameDecoder::new(crate::protocol::ProfileKind::Polar.profile());
        assert_eq!(decoder.frame_size(), 16);
        assert_eq!(decoder.push(&polar::build_frame(150, 9)[..]), vec![150]);
    }
}
