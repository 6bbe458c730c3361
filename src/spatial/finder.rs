//! The periodic radius-query finder.
//!
//! `Finder::find` walks the cell-aligned bounding box of the query
//! sphere with periodic index wrapping and tests candidates with the
//! minimum-image squared distance. It is tuned for very many points and
//! many small-radius queries per halo: no host identification, no
//! memoization, and the returned slices are internal buffers that are
//! invalidated by the next call.
//!
//! For sharded queries, build one shared `PointGrid` and give each
//! worker thread its own `Finder`; the grid is read-only, so there is no
//! lock contention.

use rayon::prelude::*;

use super::grid::{CellBounds, PointGrid};

/// Runs many radius queries across the rayon pool and returns the hits
/// in query order. The grid is shared read-only; every worker owns a
/// `Finder` with private scratch, so there is nothing to contend on.
pub fn find_all(grid: &PointGrid, queries: &[([f64; 3], f64)]) -> Vec<Vec<usize>> {
    queries
        .par_iter()
        .map_init(
            || Finder::new(grid),
            |finder, &(pos, r)| finder.find(pos, r).to_vec(),
        )
        .collect()
}

/// A radius-query cursor over a shared `PointGrid`.
pub struct Finder<'a> {
    grid: &'a PointGrid,
    idx_buf: Vec<usize>,
    dr2_buf: Vec<f64>,
}

impl<'a> Finder<'a> {
    pub fn new(grid: &'a PointGrid) -> Self {
        Finder {
            grid,
            idx_buf: Vec::new(),
            dr2_buf: Vec::new(),
        }
    }

    /// Indices of all points within `r` of `pos` under periodic
    /// boundary conditions (inclusive). The returned slice is an
    /// internal buffer, valid until the next `find`.
    pub fn find(&mut self, pos: [f64; 3], r: f64) -> &[usize] {
        self.idx_buf.clear();
        self.dr2_buf.clear();

        let cells = self.grid.cells() as i64;
        let bounds = CellBounds::sphere(pos, r, self.grid.cell_width(), self.grid.box_width());
        // A radius larger than half the box would revisit cells.
        let span = [
            bounds.span[0].min(cells),
            bounds.span[1].min(cells),
            bounds.span[2].min(cells),
        ];

        for dz in 0..span[2] {
            let z = (bounds.origin[2] + dz).rem_euclid(cells);
            let z_off = z * cells * cells;
            for dy in 0..span[1] {
                let y = (bounds.origin[1] + dy).rem_euclid(cells);
                let y_off = y * cells;
                for dx in 0..span[0] {
                    let x = (bounds.origin[0] + dx).rem_euclid(cells);
                    let cell = (z_off + y_off + x) as usize;
                    self.collect_cell(cell, pos, r);
                }
            }
        }

        &self.idx_buf
    }

    /// Squared distances of the last `find`'s results, in the same
    /// order.
    pub fn distances2(&self) -> &[f64] {
        &self.dr2_buf
    }

    fn collect_cell(&mut self, cell: usize, pos: [f64; 3], r: f64) {
        let l = self.grid.box_width();
        let half = l / 2.0;
        let points = self.grid.points();

        for j in self.grid.bucket(cell) {
            let p = points[j];
            let mut dx = pos[0] - p[0];
            let mut dy = pos[1] - p[1];
            let mut dz = pos[2] - p[2];

            if dx > half {
                dx -= l;
            }
            if dx < -half {
                dx += l;
            }
            if dy > half {
                dy -= l;
            }
            if dy < -half {
                dy += l;
            }
            if dz > half {
                dz -= l;
            }
            if dz < -half {
                dz += l;
            }

            let dr2 = dx * dx + dy * dy + dz * dz;
            if dr2 <= r * r {
                self.idx_buf.push(j);
                self.dr2_buf.push(dr2);
            }
        }
    }
}
