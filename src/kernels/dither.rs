//! Deterministic dither streams for dequantization.
//!
//! Quantized values are stored as integer bin indices; adding a uniform
//! deviate in `[0, 1)` at decode time keeps the reconstructed
//! distribution unbiased within each bin. The deviates must be
//! reproducible: a per-file seed is stored in every file header, and each
//! `(block, column)` or `(sub-cell, component)` decode owns an
//! independent sub-stream derived from that seed, so a parallel decode
//! produces identical bytes regardless of schedule.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// The seed written into file headers by the writers in this crate.
pub const DEFAULT_SEED: i64 = 1337;

/// One finalization round of SplitMix64. Enough mixing to decorrelate
/// sub-streams whose keys differ in a single bit.
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// A deterministic stream of uniform `[0, 1)` deviates.
pub struct Dither {
    rng: SmallRng,
}

impl Dither {
    /// Derives the sub-stream for `(lane, slot)` under a file seed.
    ///
    /// Catalogue decodes use `(block, column)`; vector-grid decodes use
    /// `(sub-cell, component)`.
    pub fn substream(seed: i64, lane: u64, slot: u64) -> Self {
        let mut s = splitmix64(seed as u64);
        s = splitmix64(s ^ lane);
        s = splitmix64(s ^ slot);
        Dither {
            rng: SmallRng::seed_from_u64(s),
        }
    }

    /// The next deviate in `[0, 1)`.
    #[inline]
    pub fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substreams_are_deterministic() {
        let mut a = Dither::substream(1337, 3, 1);
        let mut b = Dither::substream(1337, 3, 1);
        for _ in 0..100 {
            assert_eq!(a.next_unit(), b.next_unit());
        }
    }

    #[test]
    fn test_substreams_are_independent() {
        let mut a = Dither::substream(1337, 0, 0);
        let mut b = Dither::substream(1337, 0, 1);
        let mut c = Dither::substream(1337, 1, 0);
        let xa: Vec<f64> = (0..8).map(|_| a.next_unit()).collect();
        let xb: Vec<f64> = (0..8).map(|_| b.next_unit()).collect();
        let xc: Vec<f64> = (0..8).map(|_| c.next_unit()).collect();
        assert_ne!(xa, xb);
        assert_ne!(xa, xc);
        assert_ne!(xb, xc);
    }

    #[test]
    fn test_deviates_are_unit_interval() {
        let mut d = Dither::substream(42, 7, 2);
        for _ in 0..1000 {
            let u = d.next_unit();
            assert!((0.0..1.0).contains(&u));
        }
    }
}
