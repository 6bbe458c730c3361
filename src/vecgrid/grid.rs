//! The two-level cubic lattice: maps particle IDs to `(cell,
//! within-cell)` positions and buffers one single-precision 3-vector per
//! lattice point.
//!
//! IDs encode lattice coordinates as `ix + iy*N + iz*N^2` with
//! `N = n_cell * n_side`. Exactly one vector lives at each lattice
//! point, so a grid built from a complete snapshot is dense by
//! construction.

use crate::error::{HalopackError, Result};

/// Geometry of a cube split into cubic cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeGrid {
    /// Cells on one side of the grid.
    pub n_cell: u64,
    /// Elements on one side of a cell.
    pub n_side: u64,
}

impl LatticeGrid {
    /// Splits a lattice ID into `(cell index, index within the cell)`.
    pub fn index(&self, id: i64) -> Result<(u64, u64)> {
        let n_all = self.n_cell * self.n_side;
        let total = n_all * n_all * n_all;
        if id < 0 || id as u64 >= total {
            return Err(HalopackError::InvalidArgument(format!(
                "ID {} is not valid for n_cell = {}, n_side = {}",
                id, self.n_cell, self.n_side
            )));
        }

        let id = id as u64;
        let idx = id % n_all;
        let idy = (id / n_all) % n_all;
        let idz = id / (n_all * n_all);

        let (ex, ey, ez) = (idx % self.n_side, idy % self.n_side, idz % self.n_side);
        let within = ex + ey * self.n_side + ez * self.n_side * self.n_side;

        let (cx, cy, cz) = (idx / self.n_side, idy / self.n_side, idz / self.n_side);
        let cell = cx + cy * self.n_cell + cz * self.n_cell * self.n_cell;

        Ok((cell, within))
    }
}

/// A segmented cubic grid storing one `f32` 3-vector per lattice point.
#[derive(Debug, Clone)]
pub struct VectorGrid {
    geometry: LatticeGrid,
    cells: Vec<Vec<[f32; 3]>>,
}

impl VectorGrid {
    /// Creates a grid with `cells` cells per side over a lattice of
    /// `n_side_total` points per side. `cells` must divide
    /// `n_side_total` evenly.
    pub fn new(cells: u64, n_side_total: u64) -> Result<Self> {
        if cells == 0 || n_side_total % cells != 0 {
            return Err(HalopackError::InvalidArgument(format!(
                "cells = {} does not evenly divide n_side_total = {}",
                cells, n_side_total
            )));
        }
        let n_side = n_side_total / cells;
        let n_elem = (n_side * n_side * n_side) as usize;
        let n_cells = (cells * cells * cells) as usize;

        Ok(VectorGrid {
            geometry: LatticeGrid {
                n_cell: cells,
                n_side,
            },
            cells: vec![vec![[0f32; 3]; n_elem]; n_cells],
        })
    }

    pub fn geometry(&self) -> &LatticeGrid {
        &self.geometry
    }

    /// Elements on one side of a cell.
    pub fn n_elem(&self) -> u64 {
        self.geometry.n_side
    }

    /// The vectors of cell `c`, in within-cell lattice order.
    pub fn cell(&self, c: usize) -> &[[f32; 3]] {
        &self.cells[c]
    }

    /// Places a vector at its lattice point.
    pub fn insert(&mut self, id: i64, v: [f32; 3]) -> Result<()> {
        let (cell, within) = self.geometry.index(id)?;
        self.cells[cell as usize][within as usize] = v;
        Ok(())
    }

    /// The minimum and maximum value taken by any component of any
    /// vector in the grid.
    pub fn limits(&self) -> [f64; 2] {
        let mut lo = self.cells[0][0][0];
        let mut hi = lo;
        for cell in &self.cells {
            for v in cell {
                for &x in v {
                    if x < lo {
                        lo = x;
                    }
                    if x > hi {
                        hi = x;
                    }
                }
            }
        }
        [lo as f64, hi as f64]
    }

    /// Allocates one quantization target per component, each sized to a
    /// cell.
    pub fn int_buffer(&self) -> [Vec<u64>; 3] {
        let n = (self.n_elem() * self.n_elem() * self.n_elem()) as usize;
        [vec![0u64; n], vec![0u64; n], vec![0u64; n]]
    }

    /// Quantizes cell `c` onto a grid of `pix` pixels spanning `lim`,
    /// one output array per component. Values are clamped to
    /// `[0, pix - 1]` to absorb floating-point drift at the edges.
    pub fn quantize(
        &self,
        c: usize,
        pix: u64,
        lim: [f64; 2],
        out: &mut [Vec<u64>; 3],
    ) -> Result<()> {
        let n = (self.n_elem() * self.n_elem() * self.n_elem()) as usize;
        for (j, buf) in out.iter().enumerate() {
            if buf.len() != n {
                return Err(HalopackError::BufferLengthMismatch {
                    expected: n,
                    got: out[j].len(),
                });
            }
        }
        if pix == 0 {
            return Err(HalopackError::InvalidArgument(
                "quantization needs at least one pixel".to_string(),
            ));
        }

        let span = lim[1] - lim[0];
        let dx = (span / pix as f64) as f32;
        let low = lim[0] as f32;
        let hi = pix as i64 - 1;

        for (i, v) in self.cells[c].iter().enumerate() {
            for j in 0..3 {
                let q = ((v[j] - low) / dx) as i64;
                out[j][i] = q.clamp(0, hi) as u64;
            }
        }
        Ok(())
    }
}

/// The minimum number of pixels that stores points in
/// `[lim[0], lim[1])` with accuracy `delta` or better.
pub fn min_pix(lim: [f64; 2], delta: f64) -> Result<u64> {
    if delta <= 0.0 {
        return Err(HalopackError::InvalidArgument(format!(
            "tolerance {} must be positive",
            delta
        )));
    }
    Ok((((lim[1] - lim[0]) / delta).ceil() as u64).max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lattice_index() {
        let grid = LatticeGrid {
            n_cell: 3,
            n_side: 2,
        };
        // N = 6. The first point of the second cell along x is
        // ix = 2 -> cell (1, 0, 0), within (0, 0, 0).
        assert_eq!(grid.index(2).unwrap(), (1, 0));
        // ix=1, iy=1 -> cell 0, within 1 + 1*2 = 3.
        assert_eq!(grid.index(1 + 6).unwrap(), (0, 3));
        // iz=2 -> cell layer z=1: cell = 9, within z-offset = 0.
        assert_eq!(grid.index(2 * 36).unwrap(), (9, 0));

        assert!(grid.index(-1).is_err());
        assert!(grid.index(6 * 6 * 6).is_err());
    }

    #[test]
    fn test_insert_places_vectors() {
        let mut grid = VectorGrid::new(2, 4).unwrap();
        assert_eq!(grid.n_elem(), 2);

        grid.insert(0, [1.0, 2.0, 3.0]).unwrap();
        grid.insert(3, [4.0, 5.0, 6.0]).unwrap();
        assert_eq!(grid.cell(0)[0], [1.0, 2.0, 3.0]);
        // ix=3 -> cell x=1, within x=1.
        assert_eq!(grid.cell(1)[1], [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_uneven_cells_rejected() {
        assert!(VectorGrid::new(3, 10).is_err());
        assert!(VectorGrid::new(0, 10).is_err());
    }

    #[test]
    fn test_limits() {
        let mut grid = VectorGrid::new(1, 2).unwrap();
        grid.insert(0, [-5.0, 0.0, 1.0]).unwrap();
        grid.insert(7, [0.5, 9.0, -2.0]).unwrap();
        assert_eq!(grid.limits(), [-5.0, 9.0]);
    }

    #[test]
    fn test_quantize_clamps_to_pixel_range() {
        let mut grid = VectorGrid::new(1, 1).unwrap();
        grid.insert(0, [10.0, -1.0, 4.999]).unwrap();

        let mut out = grid.int_buffer();
        // lim [0, 10), pix 10: 10.0 lands exactly on the upper edge and
        // must clamp to 9; -1.0 clamps to 0.
        grid.quantize(0, 10, [0.0, 10.0], &mut out).unwrap();
        assert_eq!(out[0][0], 9);
        assert_eq!(out[1][0], 0);
        assert_eq!(out[2][0], 4);
    }

    #[test]
    fn test_quantize_checks_buffer_lengths() {
        let grid = VectorGrid::new(1, 2).unwrap();
        let mut out = [vec![0u64; 8], vec![0u64; 8], vec![0u64; 7]];
        assert!(grid.quantize(0, 10, [0.0, 1.0], &mut out).is_err());
    }

    #[test]
    fn test_min_pix() {
        assert_eq!(min_pix([0.0, 10.0], 0.1).unwrap(), 100);
        assert_eq!(min_pix([0.0, 1.0], 0.3).unwrap(), 4);
        assert_eq!(min_pix([5.0, 5.0], 1.0).unwrap(), 1);
        assert!(min_pix([0.0, 1.0], 0.0).is_err());
    }
}
