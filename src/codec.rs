//! Binary primitives shared by both table encodings.
//!
//! - [`ValueSize`]: the fixed value width a table is tagged with.
//! - A little-endian unsigned integer codec for widths 1..=8, used for keys,
//!   values and intra-buffer pointers alike.

use crate::error::{Result, TableError};

/// Size in bytes of the packed header at offset 0 of every non-empty table.
pub const HEADER_SIZE: usize = 2;

// Offset 0 is never a bucket, layer or value position; both encodings rely on
// this for their sentinels.
const _: () = assert!(HEADER_SIZE > 0);

// =============================================================================
// Value size tagging
// =============================================================================

/// Width of every value stored in a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum ValueSize {
    Byte,
    Short,
    Int,
    Long,
}

impl ValueSize {
    pub const ALL: [ValueSize; 4] = [
        ValueSize::Byte,
        ValueSize::Short,
        ValueSize::Int,
        ValueSize::Long,
    ];

    /// Width in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            ValueSize::Byte => 1,
            ValueSize::Short => 2,
            ValueSize::Int => 4,
            ValueSize::Long => 8,
        }
    }

    /// log2 of the width in bits.
    #[inline]
    pub const fn shift_bits(self) -> u32 {
        (self.size() * 8).trailing_zeros()
    }

    /// 2-bit header field.
    #[inline]
    pub const fn encode(self) -> u16 {
        (self.shift_bits() - 3) as u16
    }

    /// Inverse of [`encode`](Self::encode). Only the low two bits are looked at.
    #[inline]
    pub const fn decode(bits: u16) -> ValueSize {
        match bits & 0b11 {
            0 => ValueSize::Byte,
            1 => ValueSize::Short,
            2 => ValueSize::Int,
            _ => ValueSize::Long,
        }
    }

    pub const fn from_size(size: usize) -> Option<ValueSize> {
        match size {
            1 => Some(ValueSize::Byte),
            2 => Some(ValueSize::Short),
            4 => Some(ValueSize::Int),
            8 => Some(ValueSize::Long),
            _ => None,
        }
    }

    /// Fails with [`TableError::ValueSizeMismatch`] unless `self == expected`.
    #[inline]
    pub(crate) fn ensure(self, expected: ValueSize) -> Result<()> {
        if self == expected {
            Ok(())
        } else {
            Err(TableError::ValueSizeMismatch {
                expected,
                actual: self,
            })
        }
    }
}

// =============================================================================
// Fixed-width little-endian integers
// =============================================================================

/// Appends the low `width` bytes of `value` in little-endian order.
///
/// Values wider than `width` are truncated to their low bytes; callers
/// guarantee the value fits.
#[inline]
pub fn encode_uint(value: u64, width: usize, out: &mut Vec<u8>) {
    debug_assert!((1..=8).contains(&width));
    out.extend_from_slice(&value.to_le_bytes()[..width]);
}

/// Reads a `width`-byte little-endian integer from the start of `bytes`.
///
/// Panics if `bytes` is shorter than `width`; readers bounds-check first.
#[inline]
pub fn decode_uint(bytes: &[u8], width: usize) -> u64 {
    debug_assert!((1..=8).contains(&width));
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&bytes[..width]);
    u64::from_le_bytes(buf)
}

/// Bounds-checked [`decode_uint`] at `offset` of `data`.
#[inline]
pub(crate) fn read_uint(data: &[u8], offset: usize, width: usize) -> Result<u64> {
    match data.get(offset..offset.saturating_add(width)) {
        Some(bytes) => Ok(decode_uint(bytes, width)),
        None => Err(out_of_bounds(offset, width, data.len())),
    }
}

/// Minimum number of bytes holding `value`; at least 1.
#[inline]
pub fn min_bytes(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 {
        1
    } else {
        (bits + 7) / 8
    }
}

/// Largest value addressable by a `width`-byte pointer.
#[inline]
pub(crate) fn max_uint(width: usize) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width)) - 1
    }
}

pub(crate) fn out_of_bounds(offset: usize, len: usize, buffer_len: usize) -> TableError {
    TableError::Decode(format!(
        "range {}..{} is outside the {}-byte buffer",
        offset,
        offset.saturating_add(len),
        buffer_len
    ))
}

#[inline]
pub(crate) fn read_header(data: &[u8]) -> Result<u16> {
    match data.get(..HEADER_SIZE) {
        Some(bytes) => Ok(u16::from_le_bytes([bytes[0], bytes[1]])),
        None => Err(TableError::Decode(format!(
            "buffer of {} bytes is too short for the header",
            data.len()
        ))),
    }
}
