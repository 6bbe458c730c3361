//! This module defines the canonical, closed type vocabulary of the
//! on-disk formats: the 14-tag column representation set and the logical
//! column kinds callers declare at ingest time.
//!
//! The tag set is deliberately closed. Encoders and decoders dispatch on
//! the tag with `match`; there is no runtime polymorphism over column
//! kinds, because the classifier needs fast numerical tests and the
//! codec needs specialisation per width.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{HalopackError, Result};

/// How one column of a block is represented on disk.
///
/// Discriminants are the stored `i64` values of the per-block tag array,
/// so the numbering is part of the file format and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum ColumnTag {
    Float64 = 0,
    Float32 = 1,
    Int64 = 2,
    Int32 = 3,
    Int16 = 4,
    Int8 = 5,
    QFloat64 = 6,
    QFloat32 = 7,
    QFloat16 = 8,
    QFloat8 = 9,
    QLogFloat64 = 10,
    QLogFloat32 = 11,
    QLogFloat16 = 12,
    QLogFloat8 = 13,
}

impl ColumnTag {
    /// The fixed element size of this representation, in bytes.
    pub fn size(self) -> usize {
        match self {
            Self::Float64 | Self::Int64 | Self::QFloat64 | Self::QLogFloat64 => 8,
            Self::Float32 | Self::Int32 | Self::QFloat32 | Self::QLogFloat32 => 4,
            Self::Int16 | Self::QFloat16 | Self::QLogFloat16 => 2,
            Self::Int8 | Self::QFloat8 | Self::QLogFloat8 => 1,
        }
    }

    /// True for the plain signed-integer tags.
    pub fn is_int(self) -> bool {
        matches!(self, Self::Int64 | Self::Int32 | Self::Int16 | Self::Int8)
    }

    /// True for every float representation, quantized or not.
    pub fn is_float(self) -> bool {
        !self.is_int()
    }

    /// Maps a log-quantized tag to the plain quantized tag of the same
    /// width. Identity for everything else.
    pub fn without_log(self) -> Self {
        match self {
            Self::QLogFloat64 => Self::QFloat64,
            Self::QLogFloat32 => Self::QFloat32,
            Self::QLogFloat16 => Self::QFloat16,
            Self::QLogFloat8 => Self::QFloat8,
            other => other,
        }
    }

    /// Parses a stored tag value read back from a file.
    pub fn from_i64(raw: i64) -> Result<Self> {
        Ok(match raw {
            0 => Self::Float64,
            1 => Self::Float32,
            2 => Self::Int64,
            3 => Self::Int32,
            4 => Self::Int16,
            5 => Self::Int8,
            6 => Self::QFloat64,
            7 => Self::QFloat32,
            8 => Self::QFloat16,
            9 => Self::QFloat8,
            10 => Self::QLogFloat64,
            11 => Self::QLogFloat32,
            12 => Self::QLogFloat16,
            13 => Self::QLogFloat8,
            _ => return Err(HalopackError::UnknownTag(raw)),
        })
    }
}

impl fmt::Display for ColumnTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The logical kind a caller declares for a column at ingest time.
///
/// `Int` columns round-trip exactly. `Float` columns are quantized to an
/// absolute tolerance, `LogFloat` columns to a tolerance in log10 space
/// (falling back to plain `f32` storage whenever quantization cannot
/// help or the data contains non-positive values).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Int,
    Float,
    #[serde(rename = "log")]
    LogFloat,
}

impl ColumnKind {
    /// Parses the `kind` token of a `"name : kind [: delta]"` column
    /// annotation. Tokens are matched lower-case.
    pub fn parse(token: &str) -> Result<Self> {
        match token {
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "log" => Ok(Self::LogFloat),
            other => Err(HalopackError::ConfigInvalid(format!(
                "unrecognized column kind '{}'",
                other
            ))),
        }
    }
}
