//! This module collects the pure, stateless kernels the file codecs are
//! built from: range classification, per-column encode/decode, interval
//! bounding on a torus, and the deterministic dither streams used by
//! dequantization.
//!
//! Kernels never touch files; they read slices and write to sinks or
//! caller buffers, and every failure is reported through the crate-wide
//! error type.

/// Chooses the narrowest representation for a column of values.
pub mod classify;

/// Encodes and decodes one column for a chosen tag.
pub mod column;

/// Minimum covering intervals, plain and periodic.
pub mod bound;

/// Deterministic uniform dither sub-streams.
pub mod dither;
