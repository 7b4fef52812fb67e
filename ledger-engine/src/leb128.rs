//! LEB128 variable-length integers
//!
//! Seven bits per byte, least-significant group first, high bit set on every
//! byte except the last. The certified `last_block_index` leaf uses the
//! unsigned form; the hasher uses both.

use crate::{Error, Result};

/// Encode an unsigned integer
pub fn encode(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decode an unsigned integer, requiring the whole input to be consumed
pub fn decode(bytes: &[u8]) -> Result<u64> {
    let mut value: u64 = 0;
    for (i, byte) in bytes.iter().enumerate() {
        let shift = 7 * i as u32;
        let group = (byte & 0x7f) as u64;
        if shift >= 64 || (shift == 63 && group > 1) {
            return Err(Error::Leb128("value overflows u64".to_string()));
        }
        value |= group << shift;

        if byte & 0x80 == 0 {
            if i + 1 != bytes.len() {
                return Err(Error::Leb128(format!(
                    "{} trailing bytes",
                    bytes.len() - i - 1
                )));
            }
            return Ok(value);
        }
    }
    Err(Error::Leb128("truncated input".to_string()))
}

/// Encode a signed integer (two's complement, sign-extended)
pub fn encode_signed(mut value: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        let done = (value == 0 && byte & 0x40 == 0) || (value == -1 && byte & 0x40 != 0);
        if done {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}
