//! Error types for recorder line protocol parsing

use thiserror::Error;

/// Errors that can occur while classifying a single protocol line
///
/// These never escape [`LineDecoder::feed`](crate::LineDecoder::feed):
/// a line that fails to parse is dropped and decoding continues with the
/// next line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// LIVE: payload is not an integer
    #[error("invalid sample value: {0:?}")]
    InvalidSample(String),

    /// Session entry line has fewer than the 3 required fields
    #[error("session entry has too few fields: {fields}")]
    TruncatedSessionEntry { fields: usize },
}
