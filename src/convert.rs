// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions between packed bits, flags, registers and floats.
//!
//! Bits are always packed least-significant bit first, as on the wire.

use crate::{Error, Result, Word};

/// Unpack the 8 bits of `byte`; bit 0 becomes the first flag.
#[must_use]
pub fn pack_bits(byte: u8) -> [bool; 8] {
    let mut bits = [false; 8];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (byte >> i) & 0b1 > 0;
    }
    bits
}

/// Unpack `bit_count` flags from `bytes`.
///
/// # Errors
///
/// Fails if `bytes` is too short to hold `bit_count` bits.
pub fn pack_bits_range(bytes: &[u8], bit_count: usize) -> Result<Vec<bool>> {
    let required = (bit_count + 7) / 8;
    if bytes.len() < required {
        return Err(Error::InvalidArgument(format!(
            "{bit_count} bits need {required} bytes, got {}",
            bytes.len()
        )));
    }
    Ok((0..bit_count)
        .map(|i| (bytes[i / 8] >> (i % 8)) & 0b1 > 0)
        .collect())
}

/// Pack `count` flags of `bits` starting at `start_index` into a single byte.
///
/// # Errors
///
/// Fails if `count` exceeds 8 or the range exceeds `bits`.
pub fn unpack_bits(bits: &[bool], start_index: usize, count: usize) -> Result<u8> {
    if count > 8 {
        return Err(Error::InvalidArgument(format!(
            "cannot pack {count} bits into a byte"
        )));
    }
    let Some(bits) = start_index
        .checked_add(count)
        .and_then(|end| bits.get(start_index..end))
    else {
        return Err(Error::InvalidArgument(format!(
            "bit range {start_index}+{count} exceeds {} bits",
            bits.len()
        )));
    };
    Ok(bits
        .iter()
        .enumerate()
        .fold(0, |byte, (i, bit)| byte | (u8::from(*bit) << i)))
}

/// Word and byte order of a 32-bit float stored in two registers.
///
/// The letters name the bytes of the IEEE 754 big-endian representation
/// `A B C D` in the order in which they appear in registers 0 and 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatOrder {
    /// Register 0 holds `A B`, register 1 holds `C D`.
    #[default]
    Abcd,
    /// Register 0 holds `C D`, register 1 holds `A B`.
    Cdab,
    /// Bytes swapped within each register.
    Badc,
    /// Fully reversed.
    Dcba,
}

/// Encode `value` into two registers in the given order.
#[must_use]
pub fn encode_float_with(order: FloatOrder, value: f32) -> [Word; 2] {
    let [a, b, c, d] = value.to_be_bytes();
    let (hi, lo) = match order {
        FloatOrder::Abcd => ([a, b], [c, d]),
        FloatOrder::Cdab => ([c, d], [a, b]),
        FloatOrder::Badc => ([b, a], [d, c]),
        FloatOrder::Dcba => ([d, c], [b, a]),
    };
    [Word::from_be_bytes(hi), Word::from_be_bytes(lo)]
}

/// Decode a float from two registers in the given order.
#[must_use]
pub fn decode_float_with(order: FloatOrder, words: [Word; 2]) -> f32 {
    let [w0_hi, w0_lo] = words[0].to_be_bytes();
    let [w1_hi, w1_lo] = words[1].to_be_bytes();
    let bytes = match order {
        FloatOrder::Abcd => [w0_hi, w0_lo, w1_hi, w1_lo],
        FloatOrder::Cdab => [w1_hi, w1_lo, w0_hi, w0_lo],
        FloatOrder::Badc => [w0_lo, w0_hi, w1_lo, w1_hi],
        FloatOrder::Dcba => [w1_lo, w1_hi, w0_lo, w0_hi],
    };
    f32::from_be_bytes(bytes)
}

/// Encode `value` with the high half in register 0.
#[must_use]
pub fn encode_float(value: f32) -> [Word; 2] {
    encode_float_with(FloatOrder::Abcd, value)
}

/// Inverse of [`encode_float`].
#[must_use]
pub fn decode_float(words: [Word; 2]) -> f32 {
    decode_float_with(FloatOrder::Abcd, words)
}

/// Encode `value` with the low half in register 0.
#[must_use]
pub fn encode_float_swapped(value: f32) -> [Word; 2] {
    encode_float_with(FloatOrder::Cdab, value)
}

/// Inverse of [`encode_float_swapped`].
#[must_use]
pub fn decode_float_swapped(words: [Word; 2]) -> f32 {
    decode_float_with(FloatOrder::Cdab, words)
}
