//! Range classification: choosing the narrowest tag that represents one
//! column of a block within its tolerance.
//!
//! Integer columns always get one of the four signed widths. Float
//! columns with a positive tolerance get an 8- or 16-bit quantized tag
//! when the quantized range fits; if the range would need 32 or 64 bits
//! the quantized encoding gives no savings over plain `f32`, so the
//! classifier falls back to `Float32`. Log-float columns apply the same
//! rule to `log10(x)` and additionally fall back whenever any value is
//! non-positive.
//!
//! The returned key is the pre-bias minimum (`min(x)` for integers,
//! `floor(min/delta)` for quantized floats); the column codec re-biases
//! by the width's signed minimum on write.

use crate::types::ColumnTag;

/// The narrowest signed-integer tag whose range covers `[lo, hi]` after
/// subtracting `lo`. Done in `i128` so full-range `i64` columns cannot
/// overflow the difference.
fn range_to_int_tag(lo: i64, hi: i64) -> ColumnTag {
    let range = hi as i128 - lo as i128;
    if range < 1 << 8 {
        ColumnTag::Int8
    } else if range < 1 << 16 {
        ColumnTag::Int16
    } else if range < 1 << 32 {
        ColumnTag::Int32
    } else {
        ColumnTag::Int64
    }
}

/// Classifies an integer column. Returns `(tag, key)` with
/// `key = min(x)`.
pub fn classify_ints(x: &[i64]) -> (ColumnTag, i64) {
    if x.is_empty() {
        return (ColumnTag::Int8, 0);
    }
    let mut lo = x[0];
    let mut hi = x[0];
    for &v in x {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }
    (range_to_int_tag(lo, hi), lo)
}

/// Classifies a plain-float column with tolerance `delta`.
pub fn classify_floats(x: &[f64], delta: f64) -> (ColumnTag, i64) {
    if delta <= 0.0 || x.is_empty() {
        return (ColumnTag::Float32, 0);
    }

    let mut lo = x[0];
    let mut hi = x[0];
    for &v in x {
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }

    quantized_tag(lo, hi, delta)
}

/// Classifies a log-float column with tolerance `delta` in log10 space.
/// Any non-positive value forces the `Float32` fallback.
pub fn classify_log_floats(x: &[f64], delta: f64) -> (ColumnTag, i64) {
    if delta <= 0.0 || x.is_empty() {
        return (ColumnTag::Float32, 0);
    }

    let mut lo = x[0];
    let mut hi = x[0];
    for &v in x {
        if v <= 0.0 {
            return (ColumnTag::Float32, 0);
        }
        if v < lo {
            lo = v;
        }
        if v > hi {
            hi = v;
        }
    }

    let (tag, key) = quantized_tag(lo.log10(), hi.log10(), delta);
    (
        match tag {
            ColumnTag::QFloat8 => ColumnTag::QLogFloat8,
            ColumnTag::QFloat16 => ColumnTag::QLogFloat16,
            other => other,
        },
        key,
    )
}

fn quantized_tag(lo: f64, hi: f64, delta: f64) -> (ColumnTag, i64) {
    // `as` saturates, so an absurdly small delta lands in the 32/64-bit
    // branches and falls back to Float32.
    let qlo = (lo / delta).floor() as i64;
    let qhi = (hi / delta).floor() as i64;

    match range_to_int_tag(qlo, qhi) {
        ColumnTag::Int8 => (ColumnTag::QFloat8, qlo),
        ColumnTag::Int16 => (ColumnTag::QFloat16, qlo),
        _ => (ColumnTag::Float32, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_boundaries() {
        let cases: &[(&[i64], ColumnTag, i64)] = &[
            (&[0, 1], ColumnTag::Int8, 0),
            (&[10, 11], ColumnTag::Int8, 10),
            (&[-10, -9], ColumnTag::Int8, -10),
            (&[i8::MIN as i64, i8::MAX as i64], ColumnTag::Int8, i8::MIN as i64),
            (&[0, (i8::MAX as i64) - (i8::MIN as i64)], ColumnTag::Int8, 0),
            (
                &[i8::MIN as i64, i8::MAX as i64 + 1],
                ColumnTag::Int16,
                i8::MIN as i64,
            ),
            (&[0, (i8::MAX as i64) - (i8::MIN as i64) + 1], ColumnTag::Int16, 0),
            (
                &[i16::MIN as i64, i16::MAX as i64],
                ColumnTag::Int16,
                i16::MIN as i64,
            ),
            (
                &[i16::MIN as i64, i16::MAX as i64 + 1],
                ColumnTag::Int32,
                i16::MIN as i64,
            ),
            (
                &[i32::MIN as i64, i32::MAX as i64],
                ColumnTag::Int32,
                i32::MIN as i64,
            ),
            (
                &[i32::MIN as i64, i32::MAX as i64 + 1],
                ColumnTag::Int64,
                i32::MIN as i64,
            ),
            (&[0, (i32::MAX as i64) - (i32::MIN as i64) + 1], ColumnTag::Int64, 0),
            (&[i64::MIN, i64::MAX], ColumnTag::Int64, i64::MIN),
        ];

        for (i, (x, tag, key)) in cases.iter().enumerate() {
            let (got_tag, got_key) = classify_ints(x);
            assert_eq!(got_tag, *tag, "case {}", i);
            assert_eq!(got_key, *key, "case {}", i);
        }
    }

    #[test]
    fn test_single_value_column() {
        assert_eq!(classify_ints(&[42]), (ColumnTag::Int8, 42));
        assert_eq!(classify_floats(&[1.5, 1.5], 0.1), (ColumnTag::QFloat8, 15));
    }

    #[test]
    fn test_float_tolerances() {
        let x = [1.0, 2.0];
        assert_eq!(classify_floats(&x, 0.0), (ColumnTag::Float32, 0));
        assert_eq!(classify_floats(&x, 0.1), (ColumnTag::QFloat8, 10));
        assert_eq!(classify_floats(&x, 1e-3), (ColumnTag::QFloat16, 1000));
        assert_eq!(classify_floats(&x, 1e-6), (ColumnTag::Float32, 0));
        assert_eq!(classify_floats(&x, 1e-10), (ColumnTag::Float32, 0));
    }

    #[test]
    fn test_log_float_tolerances() {
        let x = [10.0, 100.0];
        assert_eq!(classify_log_floats(&x, 0.0), (ColumnTag::Float32, 0));
        assert_eq!(
            classify_log_floats(&[10.0, 100.0, 0.0], 0.1),
            (ColumnTag::Float32, 0)
        );
        assert_eq!(classify_log_floats(&x, 0.1), (ColumnTag::QLogFloat8, 10));
        assert_eq!(classify_log_floats(&x, 1e-3), (ColumnTag::QLogFloat16, 1000));
        assert_eq!(classify_log_floats(&x, 1e-6), (ColumnTag::Float32, 0));
        assert_eq!(classify_log_floats(&x, 1e-10), (ColumnTag::Float32, 0));
    }

    #[test]
    fn test_negative_values_force_log_fallback() {
        assert_eq!(
            classify_log_floats(&[1.0, -2.0], 0.1),
            (ColumnTag::Float32, 0)
        );
    }
}
