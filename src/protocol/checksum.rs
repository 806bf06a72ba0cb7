//! 8-bit XOR checksum used by sensor frame validation.
//!
//! Older firmware documentation calls this a "CRC-8", but it is a plain XOR
//! fold with no polynomial.

/// XOR-fold `length` bytes of `data` starting at `start`.
///
/// # Panics
///
/// Panics if `start + length` exceeds `data.len()`.
///
/// # Example
///
/// ```
/// use hrlink::protocol::checksum8;
///
/// assert_eq!(checksum8(&[0x0F, 0xF0, 0xFF], 0, 2), 0xFF);
/// assert_eq!(checksum8(&[0x0F, 0xF0, 0xFF], 0, 3), 0x00);
/// ```
#[inline]
pub fn checksum8(data: &[u8], start: usize, length: usize) -> u8 {
    data[start..start + length].iter().fold(0, |acc, b| acc ^ b)
}
