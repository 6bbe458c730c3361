//! The vector-grid read path: validate the framed records, unpack the
//! origin and bit-width tables, and reconstruct vectors with dithered
//! dequantization.
//!
//! Each `(sub-cell, component)` decode draws its deviates from its own
//! sub-stream of the header seed, so the reconstruction is identical no
//! matter how the work is scheduled or which order cells are read in.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;

use log::debug;

use crate::container::dense_array::DenseArray;
use crate::error::{HalopackError, Result};
use crate::kernels::bound::unbound;
use crate::kernels::dither::Dither;

use super::{read_record, GridFileHeader, VarKind, GRID_HEADER_LEN};

/// A reader over one vector-grid file, holding its unpacked tables.
pub struct VecGridReader {
    header: GridFileHeader,
    raw_header: Vec<u8>,
    n_elem: u64,
    /// Per-(sub-cell, component) origins, row-major over `(s, j)`.
    origins: Vec<u64>,
    arrays: Vec<DenseArray>,
    sub_cell_buf: Vec<u64>,
}

impl VecGridReader {
    /// Opens a vector-grid file, checking the magic number, version,
    /// frame markers and stored offsets.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let mut rd = BufReader::new(file);

        let record0 = read_record(&mut rd)?;
        if record0.len() < GRID_HEADER_LEN {
            return Err(HalopackError::Corrupt(format!(
                "header record is {} bytes, expected at least {}",
                record0.len(),
                GRID_HEADER_LEN
            )));
        }
        let header = GridFileHeader::read_from(&mut Cursor::new(&record0[..GRID_HEADER_LEN]))?;
        if record0.len() != GRID_HEADER_LEN + header.raw_header_len as usize {
            return Err(HalopackError::Corrupt(format!(
                "header record is {} bytes, expected {} of fixed header plus {} of raw header",
                record0.len(),
                GRID_HEADER_LEN,
                header.raw_header_len
            )));
        }
        let raw_header = record0[GRID_HEADER_LEN..].to_vec();

        if header.method != super::BOX_METHOD {
            return Err(HalopackError::Corrupt(format!(
                "unrecognized storage method {}",
                header.method
            )));
        }

        let n_elem = header.n_elem()?;
        let n_sub = header.n_sub() as usize;
        let n_per_cell = (n_elem * n_elem * n_elem) as usize;

        let origins_record = read_record(&mut rd)?;
        let origins_array =
            DenseArray::from_bytes(header.origins_bits as u32, 3 * n_sub, origins_record)?;
        let mut origins = vec![0u64; 3 * n_sub];
        origins_array.decode_into(&mut origins)?;
        unbound(header.origins_min, &mut origins);

        let bits_record = read_record(&mut rd)?;
        let bits_array = DenseArray::from_bytes(header.bits_bits as u32, 3 * n_sub, bits_record)?;
        let mut bits = vec![0u64; 3 * n_sub];
        bits_array.decode_into(&mut bits)?;
        unbound(header.bits_min, &mut bits);
        for (k, &b) in bits.iter().enumerate() {
            if b > 64 {
                return Err(HalopackError::Corrupt(format!(
                    "payload array {} declares {} bits",
                    k, b
                )));
            }
        }

        let payload_record = read_record(&mut rd)?;
        let mut arrays = Vec::with_capacity(3 * n_sub);
        let mut consumed = 0usize;
        for &b in &bits {
            let len = DenseArray::packed_len(b as u32, n_per_cell);
            let end = consumed + len;
            if end > payload_record.len() {
                return Err(HalopackError::Corrupt(
                    "payload record is shorter than its bit widths require".to_string(),
                ));
            }
            arrays.push(DenseArray::from_bytes(
                b as u32,
                n_per_cell,
                payload_record[consumed..end].to_vec(),
            )?);
            consumed = end;
        }
        if consumed != payload_record.len() {
            return Err(HalopackError::Corrupt(format!(
                "payload record has {} trailing bytes",
                payload_record.len() - consumed
            )));
        }

        // The stored offsets are the record starts plus end-of-file;
        // recompute and verify them.
        let expected = [
            0,
            8 + record0.len() as u64,
            8 + record0.len() as u64 + 8 + origins_array.data().len() as u64,
            8 + record0.len() as u64
                + 8
                + origins_array.data().len() as u64
                + 8
                + bits_array.data().len() as u64,
            file_len,
        ];
        if header.offsets != expected {
            return Err(HalopackError::Corrupt(format!(
                "stored offsets {:?} do not match record layout {:?}",
                header.offsets, expected
            )));
        }

        debug!(
            "opened {} grid file {}: cell {} of {}^3, {} sub-cells",
            header.var_kind.label(),
            path.display(),
            header.cell_index,
            header.cells,
            header.sub_cells
        );

        Ok(VecGridReader {
            header,
            raw_header,
            n_elem,
            origins,
            arrays,
            sub_cell_buf: Vec::new(),
        })
    }

    pub fn header(&self) -> &GridFileHeader {
        &self.header
    }

    pub fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    /// Vectors stored in this file: `(sub_cells * n_elem)^3`.
    pub fn len(&self) -> usize {
        let side = self.header.sub_cells * self.n_elem;
        (side * side * side) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reconstructs every vector of the file into `out`, in within-file
    /// lattice order. Each component is within the stored tolerance of
    /// the original in the periodic metric.
    pub fn read_vectors(&mut self, out: &mut Vec<[f32; 3]>) -> Result<()> {
        let total = self.len();
        out.clear();
        out.resize(total, [0f32; 3]);

        let Self {
            header,
            n_elem,
            origins,
            arrays,
            sub_cell_buf,
            ..
        } = self;
        let n_elem = *n_elem;
        let side = header.sub_cells * n_elem;
        let n_sub = header.n_sub();
        let n_per_cell = (n_elem * n_elem * n_elem) as usize;
        let low = header.limits[0];
        let width = (header.limits[1] - header.limits[0]) / header.pix as f64;
        let periodic = header.var_kind == VarKind::Position;

        sub_cell_buf.resize(n_per_cell, 0);

        for s in 0..n_sub {
            let sx = s % header.sub_cells;
            let sy = (s / header.sub_cells) % header.sub_cells;
            let sz = s / (header.sub_cells * header.sub_cells);

            for j in 0..3usize {
                let k = (3 * s) as usize + j;
                let pix = if periodic { header.pix } else { 0 };
                super::load_values(pix, origins[k], &arrays[k], sub_cell_buf)?;

                let mut dither = Dither::substream(header.seed, s, j as u64);
                for (e, &q) in sub_cell_buf.iter().enumerate() {
                    let e = e as u64;
                    let ex = e % n_elem;
                    let ey = (e / n_elem) % n_elem;
                    let ez = e / (n_elem * n_elem);

                    let lattice = (sx * n_elem + ex)
                        + (sy * n_elem + ey) * side
                        + (sz * n_elem + ez) * side * side;
                    out[lattice as usize][j] =
                        (low + (q as f64 + dither.next_unit()) * width) as f32;
                }
            }
        }

        Ok(())
    }

    /// The 0-based lattice IDs of this file's particles, in the same
    /// order `read_vectors` fills.
    pub fn read_ids(&self, out: &mut Vec<i64>) {
        let side = self.header.sub_cells * self.n_elem;
        let n = self.header.cells * side;

        let cx = self.header.cell_index % self.header.cells;
        let cy = (self.header.cell_index / self.header.cells) % self.header.cells;
        let cz = self.header.cell_index / (self.header.cells * self.header.cells);

        out.clear();
        out.reserve(self.len());
        for iz in 0..side {
            for iy in 0..side {
                for ix in 0..side {
                    let gx = cx * side + ix;
                    let gy = cy * side + iy;
                    let gz = cz * side + iz;
                    out.push((gx + gy * n + gz * n * n) as i64);
                }
            }
        }
    }

    /// The (uniform) particle masses of this file.
    pub fn read_masses(&self, out: &mut Vec<f32>) {
        out.clear();
        out.resize(self.len(), self.header.sim.uniform_mp as f32);
    }
}
