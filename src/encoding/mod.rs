//! Variable-length integer encoding for length prefixes.
//!
//! LEB128 layout: seven payload bits per byte, least significant group first,
//! high bit set on every byte except the last. A `u32` needs 1-5 bytes:
//! - 0-127: 1 byte
//! - 128-16383: 2 bytes
//! - etc.

/// Longest encoding of a `u32`.
pub const MAX_VARINT_LEN: usize = 5;

const CONTINUATION: u8 = 0x80;
const PAYLOAD: u8 = 0x7F;

/// Why a varint could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarintError {
    /// The buffer ended before a terminating byte.
    Underflow,
    /// The encoding does not fit in 32 bits.
    TooLarge,
}

/// Encode `value` into the front of `buf`, returning the number of bytes
/// written.
///
/// # Panics
/// Panics if `buf` is shorter than [`varint_size`]`(value)`.
pub fn encode_varint(mut value: u32, buf: &mut [u8]) -> usize {
    let mut i = 0;
    while value >= CONTINUATION as u32 {
        buf[i] = (value as u8 & PAYLOAD) | CONTINUATION;
        value >>= 7;
        i += 1;
    }
    buf[i] = value as u8;
    i + 1
}

/// Decode a varint from the front of `buf`.
///
/// Returns `(value, bytes_consumed)`.
pub fn decode_varint(buf: &[u8]) -> Result<(u32, usize), VarintError> {
    let mut value = 0u32;
    for (i, &byte) in buf.iter().take(MAX_VARINT_LEN).enumerate() {
        let payload = (byte & PAYLOAD) as u32;
        let shift = 7 * i as u32;
        // Fifth byte may only contribute the top four bits.
        if i == MAX_VARINT_LEN - 1 && payload > 0x0F {
            return Err(VarintError::TooLarge);
        }
        value |= payload << shift;
        if byte & CONTINUATION == 0 {
            return Ok((value, i + 1));
        }
    }
    if buf.len() >= MAX_VARINT_LEN {
        Err(VarintError::TooLarge)
    } else {
        Err(VarintError::Underflow)
    }
}

/// Number of bytes [`encode_varint`] would write for `value`.
pub const fn varint_size(value: u32) -> usize {
    if value < 1 << 7 {
        1
    } else if value < 1 << 14 {
        2
    } else if value < 1 << 21 {
        3
    } else if value < 1 << 28 {
        4
    } else {
        5
    }
}
