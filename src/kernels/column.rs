//! The per-column codec: encodes one column of integers or floats for a
//! chosen tag, and decodes it back.
//!
//! Integer columns store `x - key + MIN_k`, where `MIN_k` is the signed
//! minimum of the chosen width. The shift re-centres the stored range so
//! the full width of the narrow integer is usable and the representation
//! is symmetric across widths; decode inverts it with a single add.
//! Quantized float columns apply the same shift to `floor(x / delta)`
//! (or `floor(log10(x) / delta)` for log tags) and add one uniform
//! deviate per scalar at decode time, so reconstructions are unbiased
//! within their bins.
//!
//! The encoder owns grow-only typed scratch buffers that are reused
//! across blocks; callers must not retain decoded buffers across calls.

use std::io::{Read, Write};

use crate::error::{HalopackError, Result};
use crate::kernels::dither::Dither;
use crate::types::ColumnTag;
use crate::utils::{typed_slice_to_bytes, typed_slice_to_bytes_mut};

/// Grows `buf` to at least `n` elements and returns the first `n`.
/// Never shrinks, so one allocation serves a whole file.
fn scratch<T: Default + Clone>(buf: &mut Vec<T>, n: usize) -> &mut [T] {
    if buf.len() < n {
        buf.resize(n, T::default());
    }
    &mut buf[..n]
}

/// Encoder/decoder for single columns. One instance per file.
#[derive(Default)]
pub struct ColumnEncoder {
    i64_buf: Vec<i64>,
    i32_buf: Vec<i32>,
    i16_buf: Vec<i16>,
    i8_buf: Vec<i8>,
    f64_buf: Vec<f64>,
    f32_buf: Vec<f32>,
}

impl ColumnEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes an integer column, writing exactly `x.len() * tag.size()`
    /// bytes. Returns the key (`min(x)`) the decoder will need.
    ///
    /// Fails with `TagMismatch` for float tags and `EncodingOverflow` if
    /// a value does not fit the tag width (a classifier or buffer-reuse
    /// bug, treated as fatal).
    pub fn encode_ints(&mut self, tag: ColumnTag, x: &[i64], wr: &mut impl Write) -> Result<i64> {
        if x.is_empty() {
            return Ok(0);
        }
        let key = x.iter().fold(i64::MAX, |m, &v| m.min(v));

        match tag {
            ColumnTag::Int64 => {
                let buf = scratch(&mut self.i64_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    *slot = v.wrapping_sub(key).wrapping_add(i64::MIN);
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::Int32 => {
                let buf = scratch(&mut self.i32_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    *slot = rebias::<4>(tag, v, key)? as i32;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::Int16 => {
                let buf = scratch(&mut self.i16_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    *slot = rebias::<2>(tag, v, key)? as i16;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::Int8 => {
                let buf = scratch(&mut self.i8_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    *slot = rebias::<1>(tag, v, key)? as i8;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            _ => {
                return Err(HalopackError::TagMismatch {
                    tag,
                    requested: "integer",
                })
            }
        }

        Ok(key)
    }

    /// Decodes an integer column of `out.len()` values.
    pub fn decode_ints(
        &mut self,
        tag: ColumnTag,
        key: i64,
        rd: &mut impl Read,
        out: &mut [i64],
    ) -> Result<()> {
        match tag {
            ColumnTag::Int64 => {
                let buf = scratch(&mut self.i64_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    *slot = s.wrapping_sub(i64::MIN).wrapping_add(key);
                }
            }
            ColumnTag::Int32 => {
                let buf = scratch(&mut self.i32_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    *slot = (s as i64 - i32::MIN as i64).wrapping_add(key);
                }
            }
            ColumnTag::Int16 => {
                let buf = scratch(&mut self.i16_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    *slot = (s as i64 - i16::MIN as i64).wrapping_add(key);
                }
            }
            ColumnTag::Int8 => {
                let buf = scratch(&mut self.i8_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    *slot = (s as i64 - i8::MIN as i64).wrapping_add(key);
                }
            }
            _ => {
                return Err(HalopackError::TagMismatch {
                    tag,
                    requested: "integer",
                })
            }
        }
        Ok(())
    }

    /// Encodes a float column, writing exactly `x.len() * tag.size()`
    /// bytes. Returns the key (`floor(min / delta)`, or 0 for the plain
    /// tags).
    pub fn encode_floats(
        &mut self,
        tag: ColumnTag,
        delta: f64,
        x: &[f64],
        wr: &mut impl Write,
    ) -> Result<i64> {
        if x.is_empty() {
            return Ok(0);
        }

        match tag {
            ColumnTag::Float64 => {
                wr.write_all(typed_slice_to_bytes(x))?;
                Ok(0)
            }
            ColumnTag::Float32 => {
                let buf = scratch(&mut self.f32_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    *slot = v as f32;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
                Ok(0)
            }
            ColumnTag::QFloat64
            | ColumnTag::QFloat32
            | ColumnTag::QFloat16
            | ColumnTag::QFloat8 => self.encode_quantized(tag, delta, x, wr),
            ColumnTag::QLogFloat64
            | ColumnTag::QLogFloat32
            | ColumnTag::QLogFloat16
            | ColumnTag::QLogFloat8 => {
                // Taking the scratch buffer out sidesteps the aliasing
                // with the recursive call, which only uses the integer
                // buffers.
                let mut logs = std::mem::take(&mut self.f64_buf);
                logs.clear();
                logs.extend(x.iter().map(|v| v.log10()));
                let key = self.encode_floats(tag.without_log(), delta, &logs, wr);
                self.f64_buf = logs;
                key
            }
            _ => Err(HalopackError::TagMismatch {
                tag,
                requested: "float",
            }),
        }
    }

    fn encode_quantized(
        &mut self,
        tag: ColumnTag,
        delta: f64,
        x: &[f64],
        wr: &mut impl Write,
    ) -> Result<i64> {
        let lo = x.iter().fold(f64::INFINITY, |m, &v| m.min(v));
        let key = (lo / delta).floor() as i64;

        match tag {
            ColumnTag::QFloat64 => {
                let buf = scratch(&mut self.i64_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    let q = (v / delta).floor() as i64;
                    *slot = q.wrapping_sub(key).wrapping_add(i64::MIN);
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::QFloat32 => {
                let buf = scratch(&mut self.i32_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    let q = (v / delta).floor() as i64;
                    *slot = rebias::<4>(tag, q, key)? as i32;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::QFloat16 => {
                let buf = scratch(&mut self.i16_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    let q = (v / delta).floor() as i64;
                    *slot = rebias::<2>(tag, q, key)? as i16;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            ColumnTag::QFloat8 => {
                let buf = scratch(&mut self.i8_buf, x.len());
                for (slot, &v) in buf.iter_mut().zip(x) {
                    let q = (v / delta).floor() as i64;
                    *slot = rebias::<1>(tag, q, key)? as i8;
                }
                wr.write_all(typed_slice_to_bytes(buf))?;
            }
            _ => unreachable!("encode_quantized is only called with quantized tags"),
        }

        Ok(key)
    }

    /// Decodes a float column of `out.len()` values, drawing one dither
    /// deviate per quantized scalar.
    pub fn decode_floats(
        &mut self,
        tag: ColumnTag,
        delta: f64,
        key: i64,
        dither: &mut Dither,
        rd: &mut impl Read,
        out: &mut [f64],
    ) -> Result<()> {
        match tag {
            ColumnTag::Float64 => {
                rd.read_exact(typed_slice_to_bytes_mut(out))?;
            }
            ColumnTag::Float32 => {
                let buf = scratch(&mut self.f32_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    *slot = s as f64;
                }
            }
            ColumnTag::QFloat64 => {
                let buf = scratch(&mut self.i64_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    let q = s.wrapping_sub(i64::MIN).wrapping_add(key);
                    *slot = delta * q as f64 + dither.next_unit() * delta;
                }
            }
            ColumnTag::QFloat32 => {
                let buf = scratch(&mut self.i32_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    let q = (s as i64 - i32::MIN as i64).wrapping_add(key);
                    *slot = delta * q as f64 + dither.next_unit() * delta;
                }
            }
            ColumnTag::QFloat16 => {
                let buf = scratch(&mut self.i16_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    let q = (s as i64 - i16::MIN as i64).wrapping_add(key);
                    *slot = delta * q as f64 + dither.next_unit() * delta;
                }
            }
            ColumnTag::QFloat8 => {
                let buf = scratch(&mut self.i8_buf, out.len());
                rd.read_exact(typed_slice_to_bytes_mut(buf))?;
                for (slot, &s) in out.iter_mut().zip(&*buf) {
                    let q = (s as i64 - i8::MIN as i64).wrapping_add(key);
                    *slot = delta * q as f64 + dither.next_unit() * delta;
                }
            }
            ColumnTag::QLogFloat64
            | ColumnTag::QLogFloat32
            | ColumnTag::QLogFloat16
            | ColumnTag::QLogFloat8 => {
                self.decode_floats(tag.without_log(), delta, key, dither, rd, out)?;
                for slot in out.iter_mut() {
                    *slot = 10f64.powf(*slot);
                }
            }
            _ => {
                return Err(HalopackError::TagMismatch {
                    tag,
                    requested: "float",
                })
            }
        }
        Ok(())
    }

    /// Decodes a float column into an `f32` buffer by narrowing through
    /// the `f64` path.
    pub fn decode_floats_f32(
        &mut self,
        tag: ColumnTag,
        delta: f64,
        key: i64,
        dither: &mut Dither,
        rd: &mut impl Read,
        out: &mut [f32],
    ) -> Result<()> {
        let mut wide = std::mem::take(&mut self.f64_buf);
        if wide.len() < out.len() {
            wide.resize(out.len(), 0.0);
        }
        let result = self.decode_floats(tag, delta, key, dither, rd, &mut wide[..out.len()]);
        if result.is_ok() {
            let len = out.len();
            for (slot, &v) in out.iter_mut().zip(&wide[..len]) {
                *slot = v as f32;
            }
        }
        self.f64_buf = wide;
        result
    }
}

/// Shifts `v` by `-key + MIN` for a width of `SIZE` bytes, verifying the
/// result fits.
#[inline]
fn rebias<const SIZE: u32>(tag: ColumnTag, v: i64, key: i64) -> Result<i64> {
    let shifted = v as i128 - key as i128;
    if shifted < 0 || shifted >= 1i128 << (8 * SIZE) {
        return Err(HalopackError::EncodingOverflow { tag, value: v });
    }
    let min: i128 = match SIZE {
        1 => i8::MIN as i128,
        2 => i16::MIN as i128,
        _ => i32::MIN as i128,
    };
    Ok((shifted + min) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn dither() -> Dither {
        Dither::substream(1337, 0, 0)
    }

    #[test]
    fn test_int_roundtrip_all_widths() {
        let data: Vec<i64> = vec![-10, 0, -20, 200];
        let mut enc = ColumnEncoder::new();

        let cases = [
            (ColumnTag::Int64, 32usize),
            (ColumnTag::Int32, 16),
            (ColumnTag::Int16, 8),
            (ColumnTag::Int8, 4),
        ];

        for (tag, size) in cases {
            let mut bytes = Vec::new();
            let key = enc.encode_ints(tag, &data, &mut bytes).unwrap();
            assert_eq!(bytes.len(), size, "payload size for {}", tag);
            assert_eq!(key, -20);

            let mut out = vec![0i64; data.len()];
            enc.decode_ints(tag, key, &mut Cursor::new(&bytes), &mut out)
                .unwrap();
            assert_eq!(out, data, "roundtrip for {}", tag);
        }
    }

    #[test]
    fn test_int_extremes_roundtrip() {
        let data: Vec<i64> = vec![i64::MIN, i64::MAX, 0, -1];
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        let key = enc.encode_ints(ColumnTag::Int64, &data, &mut bytes).unwrap();

        let mut out = vec![0i64; data.len()];
        enc.decode_ints(ColumnTag::Int64, key, &mut Cursor::new(&bytes), &mut out)
            .unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_int_overflow_is_fatal() {
        let data: Vec<i64> = vec![0, 1 << 20];
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        assert!(matches!(
            enc.encode_ints(ColumnTag::Int8, &data, &mut bytes),
            Err(HalopackError::EncodingOverflow { .. })
        ));
    }

    #[test]
    fn test_float_roundtrip_all_tags() {
        let data: Vec<f64> = vec![1.0, 2.0, 4.0, 8.0];
        let delta = 0.25;
        let mut enc = ColumnEncoder::new();

        let cases = [
            (ColumnTag::Float64, 32usize),
            (ColumnTag::Float32, 16),
            (ColumnTag::QFloat64, 32),
            (ColumnTag::QFloat32, 16),
            (ColumnTag::QFloat16, 8),
            (ColumnTag::QFloat8, 4),
            (ColumnTag::QLogFloat64, 32),
            (ColumnTag::QLogFloat32, 16),
            (ColumnTag::QLogFloat16, 8),
            (ColumnTag::QLogFloat8, 4),
        ];

        for (tag, size) in cases {
            let mut bytes = Vec::new();
            let key = enc.encode_floats(tag, delta, &data, &mut bytes).unwrap();
            assert_eq!(bytes.len(), size, "payload size for {}", tag);

            let mut out = vec![0f64; data.len()];
            enc.decode_floats(tag, delta, key, &mut dither(), &mut Cursor::new(&bytes), &mut out)
                .unwrap();

            if tag.without_log() != tag {
                for (o, d) in out.iter().zip(&data) {
                    assert!(
                        (o.log10() - d.log10()).abs() <= delta,
                        "{}: log10({}) vs log10({})",
                        tag,
                        o,
                        d
                    );
                }
            } else {
                for (o, d) in out.iter().zip(&data) {
                    assert!((o - d).abs() <= delta, "{}: {} vs {}", tag, o, d);
                }
            }
        }
    }

    #[test]
    fn test_f64_is_bit_exact() {
        let data: Vec<f64> = vec![1.0, -0.0, f64::MIN_POSITIVE, 1e300];
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        enc.encode_floats(ColumnTag::Float64, 0.0, &data, &mut bytes)
            .unwrap();

        let mut out = vec![0f64; data.len()];
        enc.decode_floats(
            ColumnTag::Float64,
            0.0,
            0,
            &mut dither(),
            &mut Cursor::new(&bytes),
            &mut out,
        )
        .unwrap();
        for (o, d) in out.iter().zip(&data) {
            assert_eq!(o.to_bits(), d.to_bits());
        }
    }

    #[test]
    fn test_f32_roundtrip_narrows() {
        let data: Vec<f64> = vec![1.5, 2.25, -3.75];
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        enc.encode_floats(ColumnTag::Float32, 0.0, &data, &mut bytes)
            .unwrap();

        let mut out = vec![0f32; data.len()];
        enc.decode_floats_f32(
            ColumnTag::Float32,
            0.0,
            0,
            &mut dither(),
            &mut Cursor::new(&bytes),
            &mut out,
        )
        .unwrap();
        assert_eq!(out, vec![1.5f32, 2.25, -3.75]);
    }

    #[test]
    fn test_quantized_decode_is_deterministic() {
        let data: Vec<f64> = vec![1.0, 1.1, 1.9, 2.0];
        let delta = 0.1;
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        let key = enc
            .encode_floats(ColumnTag::QFloat8, delta, &data, &mut bytes)
            .unwrap();

        let mut out1 = vec![0f64; data.len()];
        let mut out2 = vec![0f64; data.len()];
        enc.decode_floats(
            ColumnTag::QFloat8,
            delta,
            key,
            &mut Dither::substream(1337, 2, 5),
            &mut Cursor::new(&bytes),
            &mut out1,
        )
        .unwrap();
        enc.decode_floats(
            ColumnTag::QFloat8,
            delta,
            key,
            &mut Dither::substream(1337, 2, 5),
            &mut Cursor::new(&bytes),
            &mut out2,
        )
        .unwrap();
        assert_eq!(out1, out2);
    }

    #[test]
    fn test_tag_mismatch() {
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        assert!(matches!(
            enc.encode_ints(ColumnTag::Float32, &[1, 2], &mut bytes),
            Err(HalopackError::TagMismatch { .. })
        ));
        assert!(matches!(
            enc.encode_floats(ColumnTag::Int16, 0.1, &[1.0], &mut bytes),
            Err(HalopackError::TagMismatch { .. })
        ));

        let payload = vec![0u8; 8];
        let mut out = vec![0i64; 1];
        assert!(matches!(
            enc.decode_ints(ColumnTag::QFloat64, 0, &mut Cursor::new(&payload), &mut out),
            Err(HalopackError::TagMismatch { .. })
        ));
        let mut fout = vec![0f64; 1];
        assert!(matches!(
            enc.decode_floats(
                ColumnTag::Int64,
                0.0,
                0,
                &mut dither(),
                &mut Cursor::new(&payload),
                &mut fout
            ),
            Err(HalopackError::TagMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_column_writes_nothing() {
        let mut enc = ColumnEncoder::new();
        let mut bytes = Vec::new();
        assert_eq!(enc.encode_ints(ColumnTag::Int8, &[], &mut bytes).unwrap(), 0);
        assert_eq!(
            enc.encode_floats(ColumnTag::QFloat8, 0.1, &[], &mut bytes)
                .unwrap(),
            0
        );
        assert!(bytes.is_empty());
    }
}
