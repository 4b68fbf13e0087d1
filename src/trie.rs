//! Hash array mapped trie over integer keys.
//!
//! Keys are split into fixed-size chunks, most significant chunk first. Each
//! trie node ("layer") stores a bitmask with one bit per possible chunk value,
//! followed by one entry per set bit: a child pointer on inner levels, a value
//! on the leaf level. The entry for chunk `k` is found by counting the set bits
//! below `k` (its rank), so absent children take no space.
//!
//! ## Layout
//!
//! ```text
//! <Header:2>[<Bitmask><Pointer|Value>*]*
//!
//! Header (little-endian u16, bit offset / width):
//!   0 / 2  value size exponent
//!   2 / 1  variable value size flag (reserved, always 0)
//!   3 / 3  bitmask size exponent (log2 of bitmask bits, minus 3)
//!   6 / 2  pointer size in bytes - 1
//!   8 / 5  number of levels
//! ```
//!
//! Layers are written breadth-first; the root always starts right after the
//! header. Pointers are absolute buffer offsets.

use smallvec::{smallvec, SmallVec};
use tracing::{debug, trace};

use crate::codec::{
    encode_uint, max_uint, out_of_bounds, read_header, read_uint, ValueSize, HEADER_SIZE,
};
use crate::error::{Result, TableError};
use crate::table::{check_input, TableReader, TableWriter};

const VALUE_SIZE_OFFSET: u16 = 0;
const BITMASK_SIZE_OFFSET: u16 = 3;
const PTR_SIZE_OFFSET: u16 = 6;
const NUM_LEVELS_OFFSET: u16 = 8;
const VALUE_SIZE_MASK: u16 = 0b0000_0011;
const BITMASK_SIZE_MASK: u16 = 0b0000_0111;
const PTR_SIZE_MASK: u16 = 0b0000_0011;
const NUM_LEVELS_MASK: u16 = 0b0001_1111;

const MAX_PTR_SIZE: usize = 4;

// =============================================================================
// Bitmask size
// =============================================================================

/// Bitmask width of every layer; fixes how many key bits each level consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(test, derive(proptest_derive::Arbitrary))]
pub enum BitmaskSize {
    /// 8 children per layer, 3 key bits per level.
    Byte,
    /// 16 children per layer, 4 key bits per level.
    Short,
    /// 32 children per layer, 5 key bits per level.
    Int,
    /// 64 children per layer, 6 key bits per level.
    Long,
}

impl BitmaskSize {
    pub const ALL: [BitmaskSize; 4] = [
        BitmaskSize::Byte,
        BitmaskSize::Short,
        BitmaskSize::Int,
        BitmaskSize::Long,
    ];

    /// Bitmask width in bytes.
    #[inline]
    pub const fn size(self) -> usize {
        match self {
            BitmaskSize::Byte => 1,
            BitmaskSize::Short => 2,
            BitmaskSize::Int => 4,
            BitmaskSize::Long => 8,
        }
    }

    /// Key bits consumed per level.
    #[inline]
    pub const fn shift_bits(self) -> u32 {
        (self.size() * 8).trailing_zeros()
    }

    #[inline]
    pub const fn shift_mask(self) -> u64 {
        (1 << self.shift_bits()) - 1
    }

    #[inline]
    pub const fn encode(self) -> u16 {
        (self.shift_bits() - 3) as u16
    }

    /// Inverse of [`encode`](Self::encode); `None` for values no writer emits.
    pub const fn decode(bits: u16) -> Option<BitmaskSize> {
        match bits {
            0 => Some(BitmaskSize::Byte),
            1 => Some(BitmaskSize::Short),
            2 => Some(BitmaskSize::Int),
            3 => Some(BitmaskSize::Long),
            _ => None,
        }
    }

    /// Chunk of `key` examined at `level` (0 = least significant).
    #[inline]
    fn chunk(self, key: u64, level: usize) -> usize {
        let shift = level as u32 * self.shift_bits();
        (key.checked_shr(shift).unwrap_or(0) & self.shift_mask()) as usize
    }
}

// =============================================================================
// Rank (popcount below a bit)
// =============================================================================

const fn build_bit_counts() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
}

/// Set bits per byte value.
static BIT_COUNTS: [u8; 256] = build_bit_counts();

/// Bits strictly below a bit position within one byte.
static BIT_COUNT_MASKS: [u8; 8] = [
    0b0000_0000,
    0b0000_0001,
    0b0000_0011,
    0b0000_0111,
    0b0000_1111,
    0b0001_1111,
    0b0011_1111,
    0b0111_1111,
];

/// Number of set bits in `bitmask` below bit `n_bit` of byte `n_byte`.
#[inline]
fn rank_below(bitmask: &[u8], n_byte: usize, n_bit: usize) -> usize {
    let mut count = BIT_COUNTS[(bitmask[n_byte] & BIT_COUNT_MASKS[n_bit]) as usize] as usize;
    for &b in &bitmask[..n_byte] {
        count += BIT_COUNTS[b as usize] as usize;
    }
    count
}

/// Dense index of chunk `k`, or `None` if its bit is unset.
#[inline]
fn rank(bitmask: &[u8], k: usize) -> Option<usize> {
    let n_byte = k >> 3;
    let n_bit = k & 0b0000_0111;
    if bitmask[n_byte] & (1 << n_bit) == 0 {
        None
    } else {
        Some(rank_below(bitmask, n_byte, n_bit))
    }
}

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieConfig {
    pub bitmask_size: BitmaskSize,
}

impl Default for TrieConfig {
    fn default() -> Self {
        Self {
            bitmask_size: BitmaskSize::Short,
        }
    }
}

fn pack_header(
    value_size: ValueSize,
    bitmask_size: BitmaskSize,
    ptr_size: usize,
    num_levels: usize,
) -> u16 {
    debug_assert!((1..=MAX_PTR_SIZE).contains(&ptr_size));
    debug_assert!(num_levels as u16 <= NUM_LEVELS_MASK);
    (value_size.encode() << VALUE_SIZE_OFFSET)
        | (bitmask_size.encode() << BITMASK_SIZE_OFFSET)
        | ((ptr_size as u16 - 1) << PTR_SIZE_OFFSET)
        | ((num_levels as u16) << NUM_LEVELS_OFFSET)
}

// =============================================================================
// Writer
// =============================================================================

/// Build-time trie node. Children are indices into the layer arena.
struct Layer<'v> {
    bitmask: SmallVec<[u8; 8]>,
    children: Vec<usize>,
    values: Vec<&'v [u8]>,
    offset: usize,
}

impl<'v> Layer<'v> {
    fn new(bitmask_size: BitmaskSize) -> Self {
        Self {
            bitmask: smallvec![0; bitmask_size.size()],
            children: Vec::new(),
            values: Vec::new(),
            offset: 0,
        }
    }

    #[inline]
    fn has_bit(&self, k: usize) -> bool {
        self.bitmask[k >> 3] & (1 << (k & 7)) != 0
    }

    #[inline]
    fn set_bit(&mut self, k: usize) {
        self.bitmask[k >> 3] |= 1 << (k & 7);
    }

    /// Serialized size under the given pointer width.
    fn size(&self, ptr_size: usize, value_size: ValueSize) -> u64 {
        (self.bitmask.len()
            + self.children.len() * ptr_size
            + self.values.len() * value_size.size()) as u64
    }
}

/// Encodes tables in the trie layout.
#[derive(Debug, Clone)]
pub struct TrieWriter {
    value_size: ValueSize,
    config: TrieConfig,
}

impl TrieWriter {
    /// Writer with the default 16-bit bitmask.
    pub fn new(value_size: ValueSize) -> Self {
        Self::with_config(value_size, TrieConfig::default())
    }

    pub fn with_config(value_size: ValueSize, config: TrieConfig) -> Self {
        Self { value_size, config }
    }

    pub fn config(&self) -> &TrieConfig {
        &self.config
    }

    /// Levels needed so that `max_key` fits in `levels * shift_bits` bits.
    fn num_levels(&self, max_key: u64) -> usize {
        let shift = self.config.bitmask_size.shift_bits();
        let mut levels = 1;
        let mut key = max_key >> shift;
        while key != 0 {
            levels += 1;
            key >>= shift;
        }
        levels
    }

    /// Builds the layer arena top-down. Layers end up in creation order, which
    /// is breadth-first; index 0 is the root.
    fn build<'v>(&self, keys: &[u64], values: &[&'v [u8]], num_levels: usize) -> Vec<Layer<'v>> {
        let bitmask_size = self.config.bitmask_size;
        let mut layers = vec![Layer::new(bitmask_size)];
        // Layer each key currently sits in.
        let mut current = vec![0usize; keys.len()];

        for level in (0..num_levels).rev() {
            for (i, &key) in keys.iter().enumerate() {
                let k = bitmask_size.chunk(key, level);
                let parent = current[i];
                if level == 0 {
                    layers[parent].values.push(values[i]);
                } else {
                    // Sorted keys: a set bit always belongs to the newest child.
                    let existing = match layers[parent].children.last() {
                        Some(&child) if layers[parent].has_bit(k) => Some(child),
                        _ => None,
                    };
                    current[i] = match existing {
                        Some(child) => child,
                        None => {
                            let child = layers.len();
                            layers.push(Layer::new(bitmask_size));
                            layers[parent].children.push(child);
                            child
                        }
                    };
                }
                layers[parent].set_bit(k);
            }
        }
        layers
    }
}

/// Smallest pointer width under which the last layer's offset is addressable.
///
/// `preceding_sizes(width)` yields the serialized sizes of every layer before
/// the last one; their running sum plus the header is that layer's offset.
fn pointer_width<F, I>(preceding_sizes: F) -> Result<usize>
where
    F: Fn(usize) -> I,
    I: IntoIterator<Item = u64>,
{
    for width in 1..=MAX_PTR_SIZE {
        let limit = max_uint(width);
        let mut offset = HEADER_SIZE as u64;
        let mut fits = true;
        for size in preceding_sizes(width) {
            offset += size;
            if offset > limit {
                fits = false;
                break;
            }
        }
        trace!(width, fits, "trying trie pointer width");
        if fits {
            return Ok(width);
        }
    }
    let required = HEADER_SIZE as u64 + preceding_sizes(MAX_PTR_SIZE).into_iter().sum::<u64>();
    Err(TableError::TableTooLarge { required })
}

impl TableWriter for TrieWriter {
    fn value_size(&self) -> ValueSize {
        self.value_size
    }

    fn dump(&self, keys: &[u64], values: &[&[u8]]) -> Result<Vec<u8>> {
        check_input(keys, values, self.value_size)?;
        let Some(&max_key) = keys.last() else {
            return Ok(Vec::new());
        };

        let value_size = self.value_size;
        let num_levels = self.num_levels(max_key);
        let mut layers = self.build(keys, values, num_levels);

        let preceding = &layers[..layers.len() - 1];
        let ptr_size = pointer_width(move |width| {
            preceding
                .iter()
                .map(move |layer| layer.size(width, value_size))
        })?;

        let mut offset = HEADER_SIZE;
        for layer in layers.iter_mut() {
            layer.offset = offset;
            offset += layer.size(ptr_size, value_size) as usize;
        }

        let mut out = Vec::with_capacity(offset);
        let header = pack_header(value_size, self.config.bitmask_size, ptr_size, num_levels);
        out.extend_from_slice(&header.to_le_bytes());
        for layer in &layers {
            out.extend_from_slice(&layer.bitmask);
            if layer.children.is_empty() {
                for value in &layer.values {
                    out.extend_from_slice(value);
                }
            } else {
                for &child in &layer.children {
                    encode_uint(layers[child].offset as u64, ptr_size, &mut out);
                }
            }
        }
        debug_assert_eq!(out.len(), offset);

        debug!(
            keys = keys.len(),
            num_levels,
            layers = layers.len(),
            ptr_size,
            bytes = out.len(),
            "encoded trie hash table"
        );
        Ok(out)
    }
}

// =============================================================================
// Reader
// =============================================================================

/// Lookups over a buffer produced by [`TrieWriter`].
#[derive(Debug, Clone, Copy)]
pub struct TrieReader<'a> {
    data: &'a [u8],
    num_levels: usize,
    bitmask_size: BitmaskSize,
    ptr_size: usize,
    value_size: ValueSize,
}

impl<'a> TrieReader<'a> {
    /// Parses the header. An empty buffer is the empty table.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self {
                data,
                num_levels: 0,
                bitmask_size: TrieConfig::default().bitmask_size,
                ptr_size: 1,
                value_size: ValueSize::Byte,
            });
        }
        let header = read_header(data)?;
        let bits = (header >> BITMASK_SIZE_OFFSET) & BITMASK_SIZE_MASK;
        let bitmask_size = BitmaskSize::decode(bits)
            .ok_or_else(|| TableError::Decode(format!("invalid bitmask size exponent {}", bits)))?;
        let num_levels = ((header >> NUM_LEVELS_OFFSET) & NUM_LEVELS_MASK) as usize;
        if num_levels == 0 {
            return Err(TableError::Decode("trie header has zero levels".to_string()));
        }
        Ok(Self {
            data,
            num_levels,
            bitmask_size,
            ptr_size: ((header >> PTR_SIZE_OFFSET) & PTR_SIZE_MASK) as usize + 1,
            value_size: ValueSize::decode((header >> VALUE_SIZE_OFFSET) & VALUE_SIZE_MASK),
        })
    }

    pub fn num_levels(&self) -> usize {
        self.num_levels
    }

    pub fn bitmask_size(&self) -> BitmaskSize {
        self.bitmask_size
    }

    pub fn ptr_size(&self) -> usize {
        self.ptr_size
    }

    #[inline]
    fn bitmask_at(&self, layer: usize) -> Result<&'a [u8]> {
        let width = self.bitmask_size.size();
        self.data
            .get(layer..layer + width)
            .ok_or_else(|| out_of_bounds(layer, width, self.data.len()))
    }
}

impl TableReader for TrieReader<'_> {
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
        let key_bits = self.num_levels as u32 * self.bitmask_size.shift_bits();
        if key_bits < u64::BITS && key >> key_bits != 0 {
            return Ok(None);
        }

        let bitmask_len = self.bitmask_size.size();
        let mut layer = HEADER_SIZE;
        for level in (1..self.num_levels).rev() {
            let bitmask = self.bitmask_at(layer)?;
            let Some(ix) = rank(bitmask, self.bitmask_size.chunk(key, level)) else {
                return Ok(None);
            };
            layer = read_uint(self.data, layer + bitmask_len + ix * self.ptr_size, self.ptr_size)? as usize;
        }

        let bitmask = self.bitmask_at(layer)?;
        let Some(ix) = rank(bitmask, self.bitmask_size.chunk(key, 0)) else {
            return Ok(None);
        };
        let offset = layer + bitmask_len + ix * self.value_size.size();
        if offset + self.value_size.size() > self.data.len() {
            return Err(out_of_bounds(offset, self.value_size.size(), self.data.len()));
        }
        Ok(Some(offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::BTreeMap;

    fn writer(value_size: ValueSize, bitmask_size: BitmaskSize) -> TrieWriter {
        TrieWriter::with_config(value_size, TrieConfig { bitmask_size })
    }

    #[test]
    fn test_small_long_table() {
        let w = TrieWriter::new(ValueSize::Long);
        let buf = w.dump_u64(&[1, 2, 300_000], &[10, 20, 30]).unwrap();
        let r = TrieReader::new(&buf).unwrap();
        assert_eq!(r.num_levels(), 5);
        assert_eq!(r.bitmask_size(), BitmaskSize::Short);

        let offset = r.value_offset(300_000).unwrap().unwrap();
        assert_eq!(r.u64_at(offset).unwrap(), 30);
        assert_eq!(r.get_u64_or(1, 0).unwrap(), 10);
        assert_eq!(r.get_u64_or(2, 0).unwrap(), 20);
        assert_eq!(r.value_offset(5).unwrap(), None);
        assert_eq!(r.value_offset(300_001).unwrap(), None);
        assert_eq!(r.value_offset(0).unwrap(), None);
        assert!(r.exists(300_000).unwrap());
        assert!(!r.exists(5).unwrap());
    }

    #[test]
    fn test_rank_exhaustive() {
        let filler = [0b1010_0110u8, 0xff, 0x00, 0b0001_0001, 0x80, 0x7f, 0x01, 0xc3];
        for bitmask_size in BitmaskSize::ALL {
            let len = bitmask_size.size();
            for n_byte in 0..len {
                for byte in 0..=255u8 {
                    let mut bitmask = filler[..len].to_vec();
                    bitmask[n_byte] = byte;
                    for n_bit in 0..8 {
                        let position = n_byte * 8 + n_bit;
                        let naive = (0..position)
                            .filter(|p| bitmask[p >> 3] & (1 << (p & 7)) != 0)
                            .count();
                        assert_eq!(
                            rank_below(&bitmask, n_byte, n_bit),
                            naive,
                            "bitmask {:?}, byte {}, bit {}",
                            bitmask,
                            n_byte,
                            n_bit
                        );
                        let set = byte & (1 << n_bit) != 0;
                        assert_eq!(rank(&bitmask, position), set.then_some(naive));
                    }
                }
            }
        }
    }

    #[test]
    fn test_bit_count_table() {
        for i in 0..256usize {
            assert_eq!(BIT_COUNTS[i] as u32, (i as u8).count_ones());
        }
        for (bit, mask) in BIT_COUNT_MASKS.iter().enumerate() {
            assert_eq!(*mask as u32, (1u32 << bit) - 1);
        }
    }

    #[test]
    fn test_bitmask_size_tags() {
        assert_eq!(BitmaskSize::Byte.shift_bits(), 3);
        assert_eq!(BitmaskSize::Short.shift_bits(), 4);
        assert_eq!(BitmaskSize::Int.shift_bits(), 5);
        assert_eq!(BitmaskSize::Long.shift_bits(), 6);
        assert_eq!(BitmaskSize::Short.shift_mask(), 0xf);
        for bs in BitmaskSize::ALL {
            assert_eq!(BitmaskSize::decode(bs.encode()), Some(bs));
        }
        assert_eq!(BitmaskSize::decode(4), None);
        assert_eq!(BitmaskSize::decode(7), None);
    }

    #[test]
    fn test_num_levels() {
        let w = TrieWriter::new(ValueSize::Byte);
        assert_eq!(w.num_levels(0), 1);
        assert_eq!(w.num_levels(15), 1);
        assert_eq!(w.num_levels(16), 2);
        assert_eq!(w.num_levels(255), 2);
        assert_eq!(w.num_levels(256), 3);
        assert_eq!(w.num_levels(u64::MAX), 16);

        assert_eq!(writer(ValueSize::Byte, BitmaskSize::Byte).num_levels(u64::MAX), 22);
        assert_eq!(writer(ValueSize::Byte, BitmaskSize::Int).num_levels(u64::MAX), 13);
        assert_eq!(writer(ValueSize::Byte, BitmaskSize::Long).num_levels(u64::MAX), 11);
        assert_eq!(writer(ValueSize::Byte, BitmaskSize::Long).num_levels(63), 1);
    }

    #[test]
    fn test_header_layout() {
        let w = writer(ValueSize::Int, BitmaskSize::Int);
        let buf = w.dump_u32(&[1, 40, 5000], &[1, 2, 3]).unwrap();
        let header = u16::from_le_bytes([buf[0], buf[1]]);
        assert_eq!(header & 0b11, 2);
        assert_eq!((header >> 2) & 1, 0);
        assert_eq!((header >> 3) & 0b111, 2);
        assert_eq!((header >> 6) & 0b11, 0);
        // 5000 < 2^15 = 32^3
        assert_eq!(header >> 8, 3);
    }

    #[test]
    fn test_shared_prefixes_share_layers() {
        let w = TrieWriter::new(ValueSize::Byte);
        let buf = w.dump_u8(&[0x10, 0x11, 0x1f], &[1, 2, 3]).unwrap();
        // Root with one pointer, one leaf with three values.
        assert_eq!(buf.len(), HEADER_SIZE + (2 + 1) + (2 + 3));

        let values: [&[u8]; 4] = [&[1], &[2], &[3], &[4]];
        let layers = w.build(&[0x10, 0x11, 0x1f, 0x20], &values, 2);
        assert_eq!(layers.len(), 3);
        assert_eq!(layers[0].children, vec![1, 2]);
        assert_eq!(layers[1].values.len(), 3);
        assert_eq!(layers[2].values.len(), 1);
    }

    #[test]
    fn test_key_beyond_levels_is_absent() {
        let w = TrieWriter::new(ValueSize::Short);
        let buf = w.dump_u16(&[1, 2, 3], &[1, 2, 3]).unwrap();
        let r = TrieReader::new(&buf).unwrap();
        assert_eq!(r.num_levels(), 1);
        assert_eq!(r.get_u16_or(3, 0).unwrap(), 3);
        for key in [16u64, 17, 1 << 40, u64::MAX] {
            assert_eq!(r.value_offset(key).unwrap(), None);
        }
    }

    #[test]
    fn test_full_width_keys() {
        for bitmask_size in BitmaskSize::ALL {
            let keys = [0u64, 1, 1 << 32, u64::MAX - 1, u64::MAX];
            let w = writer(ValueSize::Short, bitmask_size);
            let buf = w.dump_u16(&keys, &[1, 2, 3, 4, 5]).unwrap();
            let r = TrieReader::new(&buf).unwrap();
            for (k, v) in keys.iter().zip(1u16..) {
                assert_eq!(r.get_u16_or(*k, 0).unwrap(), v, "{:?} key {}", bitmask_size, k);
            }
            assert_eq!(r.value_offset(2).unwrap(), None);
            assert_eq!(r.value_offset(u64::MAX - 2).unwrap(), None);
        }
    }

    #[test]
    fn test_pointer_width_is_minimal() {
        let w = TrieWriter::new(ValueSize::Long);

        let small: Vec<u64> = (0..16).collect();
        let values: Vec<u64> = small.clone();
        let buf = w.dump_u64(&small, &values).unwrap();
        assert_eq!(TrieReader::new(&buf).unwrap().ptr_size(), 1);

        for (n, step, expected) in [(1_000u64, 1u64, 2usize), (20_000, 7, 3)] {
            let keys: Vec<u64> = (0..n).map(|i| i * step).collect();
            let values: Vec<u64> = keys.iter().map(|k| k ^ 0xabcd).collect();
            let buf = w.dump_u64(&keys, &values).unwrap();
            let r = TrieReader::new(&buf).unwrap();
            assert_eq!(r.ptr_size(), expected);

            let raw: Vec<Vec<u8>> = values.iter().map(|v| v.to_le_bytes().to_vec()).collect();
            let raw: Vec<&[u8]> = raw.iter().map(Vec::as_slice).collect();
            let layers = w.build(&keys, &raw, r.num_levels());
            let last_offset = |width: usize| {
                HEADER_SIZE as u64
                    + layers[..layers.len() - 1]
                        .iter()
                        .map(|l| l.size(width, ValueSize::Long))
                        .sum::<u64>()
            };
            assert!(last_offset(expected) <= max_uint(expected));
            assert!(last_offset(expected - 1) > max_uint(expected - 1));

            for (k, v) in keys.iter().zip(&values).step_by(97) {
                assert_eq!(r.get_u64_or(*k, 0).unwrap(), *v);
            }
        }
    }

    #[test]
    fn test_pointer_width_too_large() {
        assert_eq!(pointer_width(|_| std::iter::empty()).unwrap(), 1);
        assert_eq!(pointer_width(|_| std::iter::repeat(100u64).take(2)).unwrap(), 1);
        assert_eq!(pointer_width(|_| std::iter::repeat(100u64).take(3)).unwrap(), 2);
        assert!(matches!(
            pointer_width(|_| std::iter::repeat(1u64 << 20).take(5_000)),
            Err(TableError::TableTooLarge { .. })
        ));
    }

    #[test]
    fn test_deterministic() {
        let keys: Vec<u64> = (0..3_000u64).map(|i| i * 2_654_435_761).collect();
        let values: Vec<u32> = (0..3_000u32).collect();
        let w = TrieWriter::new(ValueSize::Int);
        assert_eq!(
            w.dump_u32(&keys, &values).unwrap(),
            w.dump_u32(&keys, &values).unwrap()
        );
    }

    #[test]
    fn test_random_roundtrip() {
        let mut rng = StdRng::seed_from_u64(11);
        for bitmask_size in BitmaskSize::ALL {
            let mut m: BTreeMap<u64, u64> = BTreeMap::new();
            while m.len() < 5_000 {
                let bits = rng.gen_range(1..=64);
                m.insert(rng.gen::<u64>() >> (64 - bits), rng.gen());
            }
            let keys: Vec<u64> = m.keys().copied().collect();
            let values: Vec<u64> = m.values().copied().collect();
            let buf = writer(ValueSize::Long, bitmask_size)
                .dump_u64(&keys, &values)
                .unwrap();
            let r = TrieReader::new(&buf).unwrap();
            for (k, v) in &m {
                assert_eq!(r.get_u64_or(*k, 0).unwrap(), *v);
            }
            for _ in 0..2_000 {
                let probe = rng.gen::<u64>() >> rng.gen_range(0..64);
                assert_eq!(r.value_offset(probe).unwrap().is_some(), m.contains_key(&probe));
            }
        }
    }

    #[test]
    fn test_malformed_buffers() {
        let w = TrieWriter::new(ValueSize::Int);
        let keys: Vec<u64> = (0..500).map(|i| i * 13).collect();
        let values: Vec<u32> = (0..500).collect();
        let buf = w.dump_u32(&keys, &values).unwrap();

        let mut bad = buf.clone();
        bad[0] |= 0b0010_0000; // bitmask exponent 5
        assert!(matches!(TrieReader::new(&bad), Err(TableError::Decode(_))));

        let mut bad = buf.clone();
        bad[1] = 0;
        assert!(matches!(TrieReader::new(&bad), Err(TableError::Decode(_))));

        assert!(matches!(TrieReader::new(&buf[..1]), Err(TableError::Decode(_))));

        let cut = &buf[..HEADER_SIZE + 3];
        let r = TrieReader::new(cut).unwrap();
        for k in &keys {
            assert!(matches!(r.value_offset(*k), Err(TableError::Decode(_))));
        }
    }
}
