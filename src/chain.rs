//! Bucketed hash table with sorted, binary-searched buckets.
//!
//! ## Layout
//!
//! ```text
//! <Header:2><PointerArray>?<Bucket>*
//!
//! Header (little-endian u16, bit offset / width):
//!   0 / 3  key size in bytes - 1
//!   3 / 2  pointer size in bytes - 1
//!   5 / 2  value size exponent
//!   7 / 1  variable value size flag (reserved, always 0)
//!   8 / 5  hash table size exponent (size = 2^n; 0 = no pointer array)
//!
//! PointerArray: one absolute bucket offset per slot, 0 for an empty bucket
//! Bucket:       [<Key:key size><Value:value size>], ascending by key
//! ```
//!
//! A bucket's length is not stored. The reader recovers it from the next
//! non-empty bucket's pointer, or from the end of the buffer.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::codec::{
    decode_uint, encode_uint, max_uint, min_bytes, out_of_bounds, read_header, read_uint,
    ValueSize, HEADER_SIZE,
};
use crate::error::{Result, TableError};
use crate::table::{check_input, TableReader, TableWriter};

const KEY_SIZE_OFFSET: u16 = 0;
const PTR_SIZE_OFFSET: u16 = 3;
const VALUE_SIZE_OFFSET: u16 = 5;
const HASH_TABLE_SIZE_OFFSET: u16 = 8;
const KEY_SIZE_MASK: u16 = 0b0000_0111;
const PTR_SIZE_MASK: u16 = 0b0000_0011;
const VALUE_SIZE_MASK: u16 = 0b0000_0011;
const HASH_TABLE_SIZE_MASK: u16 = 0b0001_1111;

/// Largest bucket count the 5-bit exponent field can describe.
const MAX_HASH_TABLE_SIZE: usize = 1 << 31;

const MAX_PTR_SIZE: usize = 4;

// =============================================================================
// Configuration
// =============================================================================

/// Sizing parameters for [`ChainWriter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainConfig {
    /// Target average number of entries per bucket.
    pub filling_ratio: usize,
    /// Bucket counts below this collapse into a single flat sorted list.
    pub min_hash_table_size: usize,
}

impl ChainConfig {
    pub const DEFAULT_FILLING_RATIO: usize = 10;
    pub const DEFAULT_MIN_HASH_TABLE_SIZE: usize = 2;

    fn validate(&self) -> Result<()> {
        if self.filling_ratio == 0 {
            return Err(TableError::InvalidConfig(
                "filling_ratio must be positive".to_string(),
            ));
        }
        if self.min_hash_table_size < 2 {
            return Err(TableError::InvalidConfig(format!(
                "min_hash_table_size must be at least 2, got {}",
                self.min_hash_table_size
            )));
        }
        Ok(())
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            filling_ratio: Self::DEFAULT_FILLING_RATIO,
            min_hash_table_size: Self::DEFAULT_MIN_HASH_TABLE_SIZE,
        }
    }
}

fn pack_header(key_size: usize, ptr_size: usize, value_size: ValueSize, hash_table_size: usize) -> u16 {
    debug_assert!((1..=8).contains(&key_size));
    debug_assert!((1..=MAX_PTR_SIZE).contains(&ptr_size));
    let exponent = if hash_table_size == 0 {
        0
    } else {
        hash_table_size.trailing_zeros() as u16
    };
    ((key_size as u16 - 1) << KEY_SIZE_OFFSET)
        | ((ptr_size as u16 - 1) << PTR_SIZE_OFFSET)
        | (value_size.encode() << VALUE_SIZE_OFFSET)
        | (exponent << HASH_TABLE_SIZE_OFFSET)
}

// =============================================================================
// Writer
// =============================================================================

type Entry<'v> = (u64, &'v [u8]);

/// Encodes tables in the chained layout.
#[derive(Debug, Clone)]
pub struct ChainWriter {
    value_size: ValueSize,
    config: ChainConfig,
}

impl ChainWriter {
    /// Writer with the default [`ChainConfig`].
    pub fn new(value_size: ValueSize) -> Self {
        Self {
            value_size,
            config: ChainConfig::default(),
        }
    }

    pub fn with_config(value_size: ValueSize, config: ChainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { value_size, config })
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    /// Largest power of two `<= num_keys / filling_ratio`, or 0 for a flat list.
    fn hash_table_size(&self, num_keys: usize) -> usize {
        let target = num_keys / self.config.filling_ratio;
        if target == 0 {
            return 0;
        }
        let size = (1usize << (usize::BITS - 1 - target.leading_zeros())).min(MAX_HASH_TABLE_SIZE);
        if size < self.config.min_hash_table_size {
            0
        } else {
            size
        }
    }
}

/// Smallest pointer width whose range covers the last bucket's pointer.
///
/// The last non-empty bucket starts at the largest offset any pointer holds.
fn pointer_width(hash_table_size: usize, body_len: u64, last_bucket_len: u64) -> Result<usize> {
    if hash_table_size == 0 {
        return Ok(1);
    }
    let largest = |width: usize| {
        (HEADER_SIZE + hash_table_size * width) as u64 + body_len - last_bucket_len
    };
    for width in 1..=MAX_PTR_SIZE {
        let required = largest(width);
        trace!(width, required, "trying chain pointer width");
        if required <= max_uint(width) {
            return Ok(width);
        }
    }
    Err(TableError::TableTooLarge {
        required: largest(MAX_PTR_SIZE),
    })
}

impl TableWriter for ChainWriter {
    fn value_size(&self) -> ValueSize {
        self.value_size
    }

    fn dump(&self, keys: &[u64], values: &[&[u8]]) -> Result<Vec<u8>> {
        check_input(keys, values, self.value_size)?;
        let Some(&max_key) = keys.last() else {
            return Ok(Vec::new());
        };

        let key_size = min_bytes(max_key);
        let entry_size = key_size + self.value_size.size();
        let hash_table_size = self.hash_table_size(keys.len());

        // A flat table is one bucket without a pointer array.
        let mut buckets: Vec<Vec<Entry<'_>>> = vec![Vec::new(); hash_table_size.max(1)];
        for (&key, &value) in keys.iter().zip(values) {
            let slot = if hash_table_size == 0 {
                0
            } else {
                (key % hash_table_size as u64) as usize
            };
            buckets[slot].push((key, value));
        }

        let body_len = (keys.len() * entry_size) as u64;
        let last_bucket_len = buckets
            .iter()
            .rev()
            .map(|b| (b.len() * entry_size) as u64)
            .find(|len| *len != 0)
            .unwrap_or(0);
        let ptr_size = pointer_width(hash_table_size, body_len, last_bucket_len)?;

        let total = HEADER_SIZE + hash_table_size * ptr_size + body_len as usize;
        let mut out = Vec::with_capacity(total);
        let header = pack_header(key_size, ptr_size, self.value_size, hash_table_size);
        out.extend_from_slice(&header.to_le_bytes());

        if hash_table_size > 0 {
            let mut next = HEADER_SIZE + hash_table_size * ptr_size;
            for bucket in &buckets {
                let ptr = if bucket.is_empty() { 0 } else { next };
                encode_uint(ptr as u64, ptr_size, &mut out);
                next += bucket.len() * entry_size;
            }
        }
        for (key, value) in buckets.iter().flatten() {
            encode_uint(*key, key_size, &mut out);
            out.extend_from_slice(value);
        }
        debug_assert_eq!(out.len(), total);

        debug!(
            keys = keys.len(),
            key_size,
            hash_table_size,
            ptr_size,
            bytes = out.len(),
            "encoded chain hash table"
        );
        Ok(out)
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Lookups over a buffer produced by [`ChainWriter`].
#[derive(Debug, Clone, Copy)]
pub struct ChainReader<'a> {
    data: &'a [u8],
    key_size: usize,
    ptr_size: usize,
    value_size: ValueSize,
    hash_table_size: usize,
    entry_size: usize,
}

impl<'a> ChainReader<'a> {
    /// Parses the header. An empty buffer is the empty table.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let header = if data.is_empty() { 0 } else { read_header(data)? };
        let key_size = ((header >> KEY_SIZE_OFFSET) & KEY_SIZE_MASK) as usize + 1;
        let ptr_size = ((header >> PTR_SIZE_OFFSET) & PTR_SIZE_MASK) as usize + 1;
        let value_size = ValueSize::decode((header >> VALUE_SIZE_OFFSET) & VALUE_SIZE_MASK);
        let hash_table_size = 1usize << ((header >> HASH_TABLE_SIZE_OFFSET) & HASH_TABLE_SIZE_MASK);
        Ok(Self {
            data,
            key_size,
            ptr_size,
            value_size,
            hash_table_size,
            entry_size: key_size + value_size.size(),
        })
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn ptr_size(&self) -> usize {
        self.ptr_size
    }

    /// Number of bucket slots; 1 means a single flat sorted list.
    pub fn hash_table_size(&self) -> usize {
        self.hash_table_size
    }

    #[inline]
    fn bucket_ptr(&self, slot: usize) -> Result<usize> {
        read_uint(self.data, HEADER_SIZE + slot * self.ptr_size, self.ptr_size).map(|p| p as usize)
    }

    /// Byte length of the bucket in `slot` starting at `ptr`.
    fn bucket_len(&self, slot: usize, ptr: usize) -> Result<usize> {
        for next_slot in slot + 1..self.hash_table_size {
            let next = self.bucket_ptr(next_slot)?;
            if next == 0 {
                continue;
            }
            return next.checked_sub(ptr).ok_or_else(|| {
                TableError::Decode(format!(
                    "bucket {} at {} ends before it starts ({})",
                    slot, ptr, next
                ))
            });
        }
        self.data
            .len()
            .checked_sub(ptr)
            .ok_or_else(|| out_of_bounds(ptr, 0, self.data.len()))
    }

    fn binary_search(&self, start: usize, len: usize, key: u64) -> Result<Option<usize>> {
        if start + len > self.data.len() {
            return Err(out_of_bounds(start, len, self.data.len()));
        }
        let mut lo = 0;
        let mut hi = len / self.entry_size;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let entry = start + mid * self.entry_size;
            let entry_key = decode_uint(&self.data[entry..], self.key_size);
            match entry_key.cmp(&key) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Ok(Some(entry + self.key_size)),
            }
        }
        Ok(None)
    }
}

impl TableReader for ChainReader<'_> {
    fn data(&self) -> &[u8] {
        self.data
    }

    fn value_size(&self) -> ValueSize {
        self.value_size
    }

    fn value_offset(&self, key: u64) -> Result<Option<usize>> {
        if self.data.is_empty() {
            return Ok(None);
        }
        if self.hash_table_size == 1 {
            return self.binary_search(HEADER_SIZE, self.data.len() - HEADER_SIZE, key);
        }
        let slot = (key % self.hash_table_size as u64) as usize;
        let ptr = self.bucket_ptr(slot)?;
        if ptr == 0 {
            return Ok(None);
        }
        let len = self.bucket_len(slot, ptr)?;
        self.binary_search(ptr, len, key)
    }
}
