//! This module defines the single, unified error type for the entire
//! halopack library.
//!
//! By using a single error enum we can propagate failures from any kernel
//! or codec stage up to the caller unchanged. The `thiserror` crate is
//! used to reduce boilerplate. Nothing in this crate recovers from an
//! error silently: configuration problems surface at open time, format
//! corruption at the offending read, and schema mismatches leave the
//! reader state untouched and reusable.

use std::io;
use thiserror::Error;

use crate::types::ColumnTag;

#[derive(Error, Debug)]
pub enum HalopackError {
    // =========================================================================
    // === Open-time errors
    // =========================================================================
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    // =========================================================================
    // === Format corruption
    // =========================================================================
    #[error("bad magic number: expected {expected:#x}, found {found:#x}")]
    BadMagic { expected: u64, found: u64 },

    #[error("format version mismatch: file has version {found}, reader supports {expected}")]
    VersionMismatch { expected: i64, found: i64 },

    #[error("frame marker mismatch: leading marker {leading}, trailing marker {trailing}")]
    FrameMarkerMismatch { leading: i64, trailing: i64 },

    #[error("record of {size} bytes cannot be framed with 32-bit length markers")]
    FrameSizeOverflow { size: u64 },

    #[error("corrupt file: {0}")]
    Corrupt(String),

    // =========================================================================
    // === Schema mismatches (reader state stays valid)
    // =========================================================================
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("column {column} stores {stored} values, but {requested} values were requested")]
    ColumnTypeMismatch {
        column: usize,
        stored: &'static str,
        requested: &'static str,
    },

    #[error("column {0} was skipped when this file was written")]
    SkippedColumnRead(usize),

    #[error("unrecognized column tag {0}")]
    UnknownTag(i64),

    // =========================================================================
    // === Fatal internal / argument errors
    // =========================================================================
    #[error("tag {tag} cannot encode or decode {requested} values")]
    TagMismatch {
        tag: ColumnTag,
        requested: &'static str,
    },

    #[error("internal encoding overflow: value {value} does not fit tag {tag}")]
    EncodingOverflow { tag: ColumnTag, value: i64 },

    #[error("bit width {0} exceeds 64")]
    InvalidBitWidth(u32),

    #[error("value {value} does not fit in {bits} bits")]
    ValueOutOfRange { value: u64, bits: u32 },

    #[error("buffer length mismatch: expected {expected}, got {got}")]
    BufferLengthMismatch { expected: usize, got: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, HalopackError>;
