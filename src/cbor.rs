//! CBOR (RFC 8949) data model and codec.
//!
//! [DataItem] is the value tree every other structure in this crate is built on. It keeps the
//! distinctions a generic serde value loses (indefinite lengths, raw simple values, float widths,
//! pre-encoded fragments), so that what was decoded can be re-encoded byte for byte.
//!
//! Bridging to serde types goes through [ciborium] (see [to_vec], [from_slice],
//! [to_data_item] and [from_data_item]).
use thiserror::Error;

use crate::error::ErrorKind;

mod builder;
mod data_item;
mod decode;
mod diagnostics;
mod encode;
mod value;

pub use builder::{ArrayBuilder, MapBuilder};
pub use data_item::{simple, tag, CborMap, DataItem};
pub use decode::{decode, decode_at, MAX_NESTING_DEPTH};
pub use diagnostics::DiagnosticOptions;
pub use encode::encode;
pub use value::{from_data_item, from_slice, to_data_item, to_vec};

/// The reason a buffer is not well-formed CBOR.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("unexpected end of input")]
    Truncated,
    #[error("invalid additional information {0}")]
    InvalidAdditionalInfo(u8),
    #[error("indefinite length is not allowed for major type {0}")]
    IndefiniteNotAllowed(u8),
    #[error("break outside of an indefinite-length item")]
    UnexpectedBreak,
    #[error("chunk of an indefinite-length string must be a definite string of the same type")]
    InvalidChunk,
    #[error("text string is not valid UTF-8")]
    InvalidUtf8,
    #[error("duplicate map key")]
    DuplicateMapKey,
    #[error("two-byte simple value {0} must be at least 32")]
    InvalidSimpleValue(u8),
    #[error("{0} trailing bytes after the data item")]
    TrailingBytes(usize),
    #[error("length {0} exceeds the remaining input")]
    LengthOutOfRange(u64),
    #[error("nesting deeper than {0} levels")]
    NestingTooDeep(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborError {
    /// Every structural decoding failure, with the offset of the offending item.
    #[error("malformed CBOR at offset {offset}: {reason}")]
    Malformed {
        offset: usize,
        reason: MalformedReason,
    },
    /// Unexpected CBOR item encountered (got, want).
    #[error("unexpected item: {0}, want {1}")]
    UnexpectedItem(&'static str, &'static str),
    /// Integer value outside the range representable by the target.
    #[error("integer value out of range")]
    OutOfRangeIntegerValue,
    /// Serde encoding failure.
    #[error("CBOR encoding failure: {0}")]
    EncodeFailed(String),
    /// Serde decoding failure.
    #[error("CBOR decoding failure: {0}")]
    DecodeFailed(String),
}

impl CborError {
    pub(crate) fn malformed(offset: usize, reason: MalformedReason) -> Self {
        CborError::Malformed { offset, reason }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CborError::EncodeFailed(_) => ErrorKind::UnsupportedFeature,
            _ => ErrorKind::MalformedEncoding,
        }
    }
}
