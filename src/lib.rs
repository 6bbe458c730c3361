//! `halopack` stores the output of cosmological N-body simulations in
//! compact, block-structured binary files and reads it back losslessly
//! within per-column tolerances.
//!
//! The crate has three public surfaces:
//! 1.  The catalogue codec (`catalogue`): converts tabular halo
//!     catalogues into a blocked columnar file, choosing the narrowest
//!     integer or quantized representation per column per block.
//! 2.  The vector-grid codec (`vecgrid`): converts particle positions
//!     and velocities on a cubic lattice into one bit-packed file per
//!     super-cell, with per-sub-cell bit widths and periodic bounding.
//! 3.  The spatial finder (`spatial`): region queries over a periodic
//!     cube, used to collect subhalo-candidate sets from decoded
//!     coordinate arrays.
//!
//! The shared machinery lives underneath: the bit-packed dense array
//! (`container`), the classification/encoding/bounding kernels
//! (`kernels`), the closed column-tag set (`types`), and the unified
//! error type (`error`).

pub mod catalogue;
pub mod config;
pub mod container;
pub mod error;
pub mod kernels;
pub mod spatial;
pub mod types;
pub mod utils;
pub mod vecgrid;

pub use crate::catalogue::{reader::CatalogueReader, source::BlockSource, writer::write_catalogue};
pub use crate::config::{CatalogueConfig, ColumnSpec};
pub use crate::container::dense_array::DenseArray;
pub use crate::error::{HalopackError, Result};
pub use crate::spatial::{
    finder::{find_all, Finder},
    grid::PointGrid,
};
pub use crate::types::{ColumnKind, ColumnTag};
pub use crate::vecgrid::{
    grid::VectorGrid, reader::VecGridReader, snapshot::ParticleSource,
    writer::convert_to_grid_files,
};
