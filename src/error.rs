//! Error types for table encoding and decoding.

use thiserror::Error;

use crate::codec::ValueSize;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// `dump` was called with a different number of keys and values.
    #[error("keys and values differ in length: {keys} keys, {values} values")]
    LengthMismatch { keys: usize, values: usize },

    /// A value passed to `dump` is not exactly `value_size` bytes wide.
    #[error("value #{index} is {actual} bytes wide, expected {expected}")]
    ValueWidth {
        index: usize,
        expected: usize,
        actual: usize,
    },

    /// A typed helper was used against a table tagged with another value size.
    #[error("value size mismatch: table holds {actual:?}, accessor expects {expected:?}")]
    ValueSizeMismatch {
        expected: ValueSize,
        actual: ValueSize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No pointer width of 1..=4 bytes can address every offset of the table.
    #[error("table too large: largest offset {required} needs more than 4 pointer bytes")]
    TableTooLarge { required: u64 },

    #[error("decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, TableError>;
