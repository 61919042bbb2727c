// Path: crates/index/src/error.rs

//! Error types for the index engine.

use thiserror::Error;

/// Errors raised by [`crate::IndexEngine`].
#[derive(Debug, Error)]
pub enum IndexError {
    /// The key was not present in the index.
    #[error("not found")]
    NotFound,
    /// A secondary index referenced a candid with no candidate entry.
    ///
    /// This is cross-index corruption and is fatal for the query that hit it.
    #[error("candidate index has no entry for candid {candid} referenced by a secondary index")]
    CorruptIndex {
        /// The candid that failed to resolve.
        candid: u64,
    },
    /// The underlying ordered store failed.
    #[error("{index} index backend error: {message}")]
    Backend {
        /// Name of the sub-index the failure came from.
        index: &'static str,
        /// Backend error rendered as text.
        message: String,
    },
    /// A stored index value was not a whole number of 8-byte entries.
    #[error("{index} index value has invalid length {len}, must be a multiple of 8")]
    BadValueLength {
        /// Name of the sub-index holding the bad value.
        index: &'static str,
        /// Observed value length in bytes.
        len: usize,
    },
    /// A stored candidate URL was not valid UTF-8.
    #[error("candidates index value for candid {candid} is not valid UTF-8")]
    BadUrlEncoding {
        /// The candid whose URL failed to decode.
        candid: u64,
    },
    /// The index directory could not be created.
    #[error("unable to create index directory: {0}")]
    Io(#[source] std::io::Error),
}

impl IndexError {
    /// Wraps a backend error with the sub-index it came from.
    pub(crate) fn backend(index: &'static str, err: impl std::fmt::Display) -> Self {
        IndexError::Backend {
            index,
            message: err.to_string(),
        }
    }
}
