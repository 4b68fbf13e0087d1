//! The writer/reader contract shared by both encodings.
//!
//! A [`TableWriter`] turns strictly ascending keys and fixed-width values into
//! one byte buffer; a [`TableReader`] answers lookups directly against that
//! buffer. [`Encoding`] picks one of the two implementations at runtime.

use std::collections::BTreeMap;

use crate::chain::{ChainReader, ChainWriter};
use crate::codec::{out_of_bounds, ValueSize};
use crate::error::{Result, TableError};
use crate::trie::{TrieReader, TrieWriter};

// =============================================================================
// Writer
// =============================================================================

/// Encodes sorted `(key, value)` pairs into a single buffer.
///
/// Keys must be strictly ascending. This is not checked: unsorted or duplicate
/// keys produce a table that answers lookups incorrectly.
pub trait TableWriter {
    /// Width every value passed to [`dump`](Self::dump) must have.
    fn value_size(&self) -> ValueSize;

    /// Encodes the table. Empty input yields an empty buffer.
    fn dump(&self, keys: &[u64], values: &[&[u8]]) -> Result<Vec<u8>>;

    fn dump_u8(&self, keys: &[u64], values: &[u8]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Byte)?;
        dump_fixed(self, keys, values.iter().map(|v| [*v]))
    }

    fn dump_u16(&self, keys: &[u64], values: &[u16]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Short)?;
        dump_fixed(self, keys, values.iter().map(|v| v.to_le_bytes()))
    }

    fn dump_u32(&self, keys: &[u64], values: &[u32]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Int)?;
        dump_fixed(self, keys, values.iter().map(|v| v.to_le_bytes()))
    }

    fn dump_u64(&self, keys: &[u64], values: &[u64]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Long)?;
        dump_fixed(self, keys, values.iter().map(|v| v.to_le_bytes()))
    }

    /// Stores the IEEE-754 bit pattern of each value.
    fn dump_f32(&self, keys: &[u64], values: &[f32]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Int)?;
        dump_fixed(self, keys, values.iter().map(|v| v.to_bits().to_le_bytes()))
    }

    /// Stores the IEEE-754 bit pattern of each value.
    fn dump_f64(&self, keys: &[u64], values: &[f64]) -> Result<Vec<u8>> {
        self.value_size().ensure(ValueSize::Long)?;
        dump_fixed(self, keys, values.iter().map(|v| v.to_bits().to_le_bytes()))
    }

    /// Encodes a map; its iteration order already satisfies the ordering rule.
    fn dump_map(&self, entries: &BTreeMap<u64, Vec<u8>>) -> Result<Vec<u8>> {
        let keys: Vec<u64> = entries.keys().copied().collect();
        let values: Vec<&[u8]> = entries.values().map(Vec::as_slice).collect();
        self.dump(&keys, &values)
    }
}

fn dump_fixed<W, const N: usize>(
    writer: &W,
    keys: &[u64],
    values: impl Iterator<Item = [u8; N]>,
) -> Result<Vec<u8>>
where
    W: TableWriter + ?Sized,
{
    let owned: Vec<[u8; N]> = values.collect();
    let values: Vec<&[u8]> = owned.iter().map(|v| v.as_slice()).collect();
    writer.dump(keys, &values)
}

/// Precondition checks shared by every `dump` implementation.
pub(crate) fn check_input(keys: &[u64], values: &[&[u8]], value_size: ValueSize) -> Result<()> {
    if keys.len() != values.len() {
        return Err(TableError::LengthMismatch {
            keys: keys.len(),
            values: values.len(),
        });
    }
    if let Some((index, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| v.len() != value_size.size())
    {
        return Err(TableError::ValueWidth {
            index,
            expected: value_size.size(),
            actual: v.len(),
        });
    }
    Ok(())
}

// =============================================================================
// Reader
// =============================================================================

/// Read-only view over an encoded table.
///
/// Lookups return `Ok(None)` for absent keys. Malformed buffers surface as
/// [`TableError::Decode`] instead of reading out of bounds.
pub trait TableReader: Send + Sync {
    /// The whole encoded buffer, header included.
    fn data(&self) -> &[u8];

    fn value_size(&self) -> ValueSize;

    /// Byte offset of the value stored under `key`, or `None` if absent.
    fn value_offset(&self, key: u64) -> Result<Option<usize>>;

    fn exists(&self, key: u64) -> Result<bool> {
        Ok(matches!(self.value_offset(key)?, Some(offset) if offset > 0))
    }

    /// Raw value bytes at `offset`.
    fn value_at(&self, offset: usize) -> Result<&[u8]> {
        let width = self.value_size().size();
        let data = self.data();
        data.get(offset..offset.saturating_add(width))
            .ok_or_else(|| out_of_bounds(offset, width, data.len()))
    }

    fn get(&self, key: u64) -> Result<Option<&[u8]>> {
        match self.value_offset(key)? {
            Some(offset) => self.value_at(offset).map(Some),
            None => Ok(None),
        }
    }

    fn u8_at(&self, offset: usize) -> Result<u8> {
        fixed_at::<_, 1>(self, offset, ValueSize::Byte).map(|b| b[0])
    }

    fn u16_at(&self, offset: usize) -> Result<u16> {
        fixed_at(self, offset, ValueSize::Short).map(u16::from_le_bytes)
    }

    fn u32_at(&self, offset: usize) -> Result<u32> {
        fixed_at(self, offset, ValueSize::Int).map(u32::from_le_bytes)
    }

    fn u64_at(&self, offset: usize) -> Result<u64> {
        fixed_at(self, offset, ValueSize::Long).map(u64::from_le_bytes)
    }

    fn f32_at(&self, offset: usize) -> Result<f32> {
        self.u32_at(offset).map(f32::from_bits)
    }

    fn f64_at(&self, offset: usize) -> Result<f64> {
        self.u64_at(offset).map(f64::from_bits)
    }

    fn get_u8_or(&self, key: u64, default: u8) -> Result<u8> {
        match self.value_offset(key)? {
            Some(offset) => self.u8_at(offset),
            None => Ok(default),
        }
    }

    fn get_u16_or(&self, key: u64, default: u16) -> Result<u16> {
        match self.value_offset(key)? {
            Some(offset) => self.u16_at(offset),
            None => Ok(default),
        }
    }

    fn get_u32_or(&self, key: u64, default: u32) -> Result<u32> {
        match self.value_offset(key)? {
            Some(offset) => self.u32_at(offset),
            None => Ok(default),
        }
    }

    fn get_u64_or(&self, key: u64, default: u64) -> Result<u64> {
        match self.value_offset(key)? {
            Some(offset) => self.u64_at(offset),
            None => Ok(default),
        }
    }

    fn get_f32_or(&self, key: u64, default: f32) -> Result<f32> {
        match self.value_offset(key)? {
            Some(offset) => self.f32_at(offset),
            None => Ok(default),
        }
    }

    fn get_f64_or(&self, key: u64, default: f64) -> Result<f64> {
        match self.value_offset(key)? {
            Some(offset) => self.f64_at(offset),
            None => Ok(default),
        }
    }
}

fn fixed_at<R, const N: usize>(reader: &R, offset: usize, expected: ValueSize) -> Result<[u8; N]>
where
    R: TableReader + ?Sized,
{
    reader.value_size().ensure(expected)?;
    let mut out = [0u8; N];
    out.copy_from_slice(reader.value_at(offset)?);
    Ok(out)
}

// =============================================================================
// Encoding selection
// =============================================================================

/// The two interchangeable binary layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// Bucketed hash table with sorted, binary-searched buckets.
    Chain,
    /// Hash array mapped trie with popcount-ranked children.
    Trie,
}

impl Encoding {
    pub const ALL: [Encoding; 2] = [Encoding::Chain, Encoding::Trie];

    /// Writer with the encoding's default configuration.
    pub fn writer(self, value_size: ValueSize) -> Box<dyn TableWriter> {
        match self {
            Encoding::Chain => Box::new(ChainWriter::new(value_size)),
            Encoding::Trie => Box::new(TrieWriter::new(value_size)),
        }
    }

    /// Opens `data`, which must have been produced by this encoding.
    pub fn reader(self, data: &[u8]) -> Result<Box<dyn TableReader + '_>> {
        let reader: Box<dyn TableReader + '_> = match self {
            Encoding::Chain => Box::new(ChainReader::new(data)?),
            Encoding::Trie => Box::new(TrieReader::new(data)?),
        };
        Ok(reader)
    }
}
