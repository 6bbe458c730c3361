//! A dense array of fixed-bit-width unsigned integers, stored in a
//! compact byte buffer.
//!
//! Element `i` occupies bits `[i*bits, (i+1)*bits)` of the byte stream in
//! little-endian bit order, low bit first. Values may cross byte
//! boundaries; any padding bits in the final byte are zero. The payload
//! is exactly `ceil(bits * length / 8)` bytes. A width of zero is legal
//! and represents an all-zero array with an empty payload.
//!
//! This is the storage unit underneath the vector-grid format: one dense
//! array per `(sub-cell, component)` payload, plus one each for the
//! packed sub-cell origin and bit-width tables.

use bitvec::prelude::*;

use crate::error::{HalopackError, Result};

/// A bit-packed sequence of `length` unsigned integers, each below
/// `2^bits`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseArray {
    bits: u32,
    length: usize,
    data: Vec<u8>,
}

impl DenseArray {
    /// The packed payload size in bytes for a given shape.
    pub fn packed_len(bits: u32, length: usize) -> usize {
        (bits as usize * length + 7) / 8
    }

    /// Packs `values` at the given width.
    ///
    /// Fails with `InvalidBitWidth` if `bits > 64`, or `ValueOutOfRange`
    /// if any value needs more than `bits` bits.
    pub fn new(bits: u32, values: &[u64]) -> Result<Self> {
        if bits > 64 {
            return Err(HalopackError::InvalidBitWidth(bits));
        }

        let max = if bits >= 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let mut bv = BitVec::<u8, Lsb0>::with_capacity(bits as usize * values.len());
        for &v in values {
            if v > max {
                return Err(HalopackError::ValueOutOfRange { value: v, bits });
            }
            bv.extend_from_bitslice(&v.view_bits::<Lsb0>()[..bits as usize]);
        }

        let mut data = bv.into_vec();
        data.resize(Self::packed_len(bits, values.len()), 0);

        Ok(DenseArray {
            bits,
            length: values.len(),
            data,
        })
    }

    /// Rebuilds an array from a payload read back from disk.
    ///
    /// Fails with `BufferLengthMismatch` if `data` is not exactly the
    /// packed length of the declared shape.
    pub fn from_bytes(bits: u32, length: usize, data: Vec<u8>) -> Result<Self> {
        if bits > 64 {
            return Err(HalopackError::InvalidBitWidth(bits));
        }
        let expected = Self::packed_len(bits, length);
        if data.len() != expected {
            return Err(HalopackError::BufferLengthMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(DenseArray { bits, length, data })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// The packed payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Bulk-decodes every element into `out`, which must hold exactly
    /// `len()` slots.
    pub fn decode_into(&self, out: &mut [u64]) -> Result<()> {
        if out.len() != self.length {
            return Err(HalopackError::BufferLengthMismatch {
                expected: self.length,
                got: out.len(),
            });
        }
        if self.bits == 0 {
            out.fill(0);
            return Ok(());
        }

        let bits = self.bits as usize;
        let stream = self.data.view_bits::<Lsb0>();
        for (i, slot) in out.iter_mut().enumerate() {
            let mut v = 0u64;
            for (k, bit) in stream[i * bits..(i + 1) * bits].iter().by_vals().enumerate() {
                if bit {
                    v |= 1 << k;
                }
            }
            *slot = v;
        }
        Ok(())
    }
}
