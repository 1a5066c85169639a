#![forbid(unsafe_code)]

use std::collections::TryReserveError;

use log::error;
use thiserror::Error;

/// The errors of the term storage. Except for [StorageError::InvalidConfig]
/// these are fatal for term construction, see [fatal].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot allocate a block of {words} words")]
    OutOfMemory {
        words: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("allocating {requested} bytes exceeds the memory limit of {limit} bytes")]
    MemoryLimit { requested: usize, limit: usize },

    #[error("the block registry is full ({0} blocks)")]
    TooManyBlocks(usize),

    #[error("cannot allocate a hash table with {buckets} buckets")]
    HashTable {
        buckets: usize,
        #[source]
        source: TryReserveError,
    },

    #[error("invalid value {value:?} for {variable}")]
    InvalidConfig { variable: &'static str, value: String },
}

/// Reports an unrecoverable storage error that occurred during the given operation.
pub(crate) fn fatal(operation: &str, error: StorageError) -> ! {
    error!("Out of memory while {operation}: {error}");
    panic!("out of memory while {operation}: {error}");
}
