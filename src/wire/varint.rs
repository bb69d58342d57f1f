//! Decode varints from byte slices.
//!
//! Variable length integers (_varints_) are the default encoding of integers
//! in Protocol Buffers messages, including field tags and numbers.
//!
//! See <https://protobuf.dev/programming-guides/encoding/#varints>.

use serde::Deserialize;

/// Maximum number of bytes for an encoded varint.
///
/// A decoded varint is a u64 value. Each byte contains 7 value bits and one
/// continuation bit. Hence we need 9 "full" bytes plus one bit from the 10th byte.
pub const MAX_VARINT_LEN: usize = 10;

/// Controls which unusual varint encodings are accepted.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarintStrictness {
    /// Accept non-minimal encodings such as `[0x80, 0x00]` for zero.
    ///
    /// Encoders are allowed to produce these, so this is the default.
    #[default]
    Lenient,

    /// Reject non-minimal encodings, where the final byte of a multi-byte
    /// varint contributes no value bits.
    Strict,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VarintError {
    /// The input ended before a byte without the continuation bit, or no such
    /// byte was found within [`MAX_VARINT_LEN`] bytes.
    Truncated,

    /// The varint encodes more than 64 bits of data.
    Overflow,

    /// The varint was not minimally encoded and strict checking is enabled.
    NonCanonical,
}

/// Decode a varint value of up to 64 bits from the start of `buf`.
///
/// Returns the value and the number of bytes it occupied, which is between one
/// and ten.
pub fn decode_varint(buf: &[u8], strictness: VarintStrictness) -> Result<(u64, usize), VarintError> {
    let mut value = 0;

    for (index, byte) in buf.iter().copied().take(MAX_VARINT_LEN).enumerate() {
        // High bit is continuation bit. Low 7 bits are the payload.
        value |= ((byte & 0x7f) as u64) << (index * 7);
        if byte <= 0x7f {
            // Only one value bit from the last byte may be used.
            if index + 1 == MAX_VARINT_LEN && byte > 0x01 {
                return Err(VarintError::Overflow);
            }
            if strictness == VarintStrictness::Strict && index > 0 && byte == 0 {
                return Err(VarintError::NonCanonical);
            }
            return Ok((value, index + 1));
        }
    }

    Err(VarintError::Truncated)
}

/// Decode a zig-zag encoded 64-bit value, as used by `sint64` fields.
pub fn decode_zigzag64(val: u64) -> i64 {
    ((val >> 1) as i64) ^ -((val & 1) as i64)
}

/// Decode a zig-zag encoded 32-bit value, as used by `sint32` fields.
///
/// Only the low 32 bits of `val` are used.
pub fn decode_zigzag32(val: u64) -> i32 {
    let val = val as u32;
    ((val >> 1) as i32) ^ -((val & 1) as i32)
}
