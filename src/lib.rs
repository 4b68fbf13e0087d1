//! # htable-rs
//!
//! Immutable `u64`-keyed lookup tables packed into one contiguous byte buffer.
//!
//! Tables are built once from sorted keys and fixed-width values, then queried
//! in place: a lookup is header-driven arithmetic and a bounded scan over the
//! raw bytes, with no deserialization and no allocation.
//!
//! Two interchangeable encodings implement the same [`TableWriter`] /
//! [`TableReader`] contract:
//!
//! - [`chain`]: a bucketed hash table whose buckets are sorted and
//!   binary-searched.
//! - [`trie`]: a hash array mapped trie with bitmask/popcount child indexing.
//!
//! ## Example
//!
//! ```rust
//! use htable_rs::{Encoding, TableReader, TableWriter, ValueSize};
//!
//! for encoding in Encoding::ALL {
//!     let writer = encoding.writer(ValueSize::Long);
//!     let buf = writer.dump_u64(&[1, 2, 300_000], &[10, 20, 30]).unwrap();
//!
//!     let reader = encoding.reader(&buf).unwrap();
//!     assert_eq!(reader.get_u64_or(300_000, 0).unwrap(), 30);
//!     assert_eq!(reader.value_offset(5).unwrap(), None);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod chain;
pub mod codec;
pub mod error;
pub mod table;
pub mod trie;

pub use chain::{ChainConfig, ChainReader, ChainWriter};
pub use codec::{ValueSize, HEADER_SIZE};
pub use error::{Result, TableError};
pub use table::{Encoding, TableReader, TableWriter};
pub use trie::{BitmaskSize, TrieConfig, TrieReader, TrieWriter};

#[cfg(test)]
mod proptests;
