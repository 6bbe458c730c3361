//! Shared low-level utilities: safe, validated conversions between raw
//! byte slices and typed slices.
//!
//! These are the only places the crate reinterprets memory, and they go
//! through `bytemuck`'s checked casts so alignment and length problems
//! surface as errors instead of undefined behaviour. The on-disk formats
//! are little-endian; bulk payloads are cast directly, which matches the
//! single-endian contract of the formats.

use crate::error::{HalopackError, Result};

/// Reinterprets a byte slice as a slice of a plain-old-data type.
///
/// Fails with `InvalidArgument` if the byte length is not a multiple of
/// `size_of::<T>()` or the slice is misaligned for `T`.
pub fn bytes_to_typed_slice<T: bytemuck::Pod>(bytes: &[u8]) -> Result<&[T]> {
    bytemuck::try_cast_slice(bytes)
        .map_err(|e| HalopackError::InvalidArgument(format!("failed to cast byte slice: {}", e)))
}

/// Views a typed slice as its raw bytes.
pub fn typed_slice_to_bytes<T: bytemuck::Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Views a mutable typed slice as its raw bytes, e.g. as a read target.
pub fn typed_slice_to_bytes_mut<T: bytemuck::Pod>(data: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_slice_roundtrip() {
        let original: Vec<i32> = vec![1, -2, 1_000_000];
        let bytes = typed_slice_to_bytes(&original).to_vec();
        let back = bytes_to_typed_slice::<i32>(&bytes).unwrap();
        assert_eq!(back, original.as_slice());
    }

    #[test]
    fn test_bad_length_is_an_error() {
        let bytes: Vec<u8> = vec![0, 1, 2, 3, 4];
        assert!(bytes_to_typed_slice::<i32>(&bytes).is_err());
        assert!(bytes_to_typed_slice::<i16>(&bytes).is_err());
    }

    #[test]
    fn test_mutable_view_writes_through() {
        let mut data: Vec<u16> = vec![0, 0];
        {
            let bytes = typed_slice_to_bytes_mut(&mut data);
            bytes[0] = 0x02;
            bytes[1] = 0x01;
        }
        if cfg!(target_endian = "little") {
            assert_eq!(data[0], 258);
        }
    }
}
