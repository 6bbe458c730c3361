//! A linked-list bucket grid over a periodic cube, plus the
//! cell-aligned bounding boxes used to walk it.
//!
//! Each cell owns a singly linked chain of point indices (`heads` into
//! `next`), so building the grid is one pass and costs no per-cell
//! allocations. The grid is immutable once built and can be shared by
//! any number of finders.

use crate::error::{HalopackError, Result};

/// Grid cells per side when the caller does not choose.
pub const DEFAULT_FINDER_CELLS: usize = 250;

const EMPTY: usize = usize::MAX;

/// An immutable spatial hash of points in a periodic cube of side
/// `box_width`.
pub struct PointGrid {
    cells: usize,
    cell_width: f64,
    box_width: f64,
    points: Vec<[f64; 3]>,
    heads: Vec<usize>,
    next: Vec<usize>,
}

impl PointGrid {
    /// Builds a grid with the default cell count.
    pub fn new(box_width: f64, points: &[[f64; 3]]) -> Result<Self> {
        Self::with_cells(DEFAULT_FINDER_CELLS, box_width, points)
    }

    /// Builds a grid with `cells` cells per side.
    pub fn with_cells(cells: usize, box_width: f64, points: &[[f64; 3]]) -> Result<Self> {
        if cells == 0 {
            return Err(HalopackError::InvalidArgument(
                "finder grid needs at least one cell".to_string(),
            ));
        }
        if box_width <= 0.0 {
            return Err(HalopackError::InvalidArgument(format!(
                "box width {} must be positive",
                box_width
            )));
        }

        let cell_width = box_width / cells as f64;
        let mut grid = PointGrid {
            cells,
            cell_width,
            box_width,
            points: points.to_vec(),
            heads: vec![EMPTY; cells * cells * cells],
            next: vec![EMPTY; points.len()],
        };

        for (i, p) in grid.points.iter().enumerate() {
            let cx = grid.cell_of(p[0]);
            let cy = grid.cell_of(p[1]);
            let cz = grid.cell_of(p[2]);
            let cell = cx + cy * cells + cz * cells * cells;
            grid.next[i] = grid.heads[cell];
            grid.heads[cell] = i;
        }

        Ok(grid)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn cells(&self) -> usize {
        self.cells
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn box_width(&self) -> f64 {
        self.box_width
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// The cell coordinate of a position along one axis, wrapped into
    /// the grid.
    fn cell_of(&self, x: f64) -> usize {
        ((x / self.cell_width).floor() as i64).rem_euclid(self.cells as i64) as usize
    }

    /// Walks the point chain of one cell.
    pub(crate) fn bucket(&self, cell: usize) -> Bucket<'_> {
        Bucket {
            grid: self,
            cursor: self.heads[cell],
        }
    }
}

/// Iterator over the point indices of one grid cell.
pub(crate) struct Bucket<'a> {
    grid: &'a PointGrid,
    cursor: usize,
}

impl Iterator for Bucket<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.cursor == EMPTY {
            return None;
        }
        let current = self.cursor;
        self.cursor = self.grid.next[current];
        Some(current)
    }
}

/// A cell-aligned bounding box around a region of the periodic cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellBounds {
    pub origin: [i64; 3],
    pub span: [i64; 3],
}

impl CellBounds {
    /// The cell-aligned box around the sphere `(pos, r)`; `origin` may
    /// need wrapping when walked.
    pub fn sphere(pos: [f64; 3], r: f64, cell_width: f64, box_width: f64) -> Self {
        let mut origin = [0i64; 3];
        let mut span = [0i64; 3];
        for i in 0..3 {
            let mut min = pos[i] - r;
            let mut max = pos[i] + r;
            if min < 0.0 {
                min += box_width;
                max += box_width;
            }

            let min_cell = (min / cell_width) as i64;
            let max_cell = (max / cell_width) as i64;
            origin[i] = min_cell;
            span[i] = max_cell - min_cell + 1;
        }
        CellBounds { origin, span }
    }
}
