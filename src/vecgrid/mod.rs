//! The vector-grid file format and its codec: particle positions and
//! velocities on a cubic lattice, stored as one bit-packed file per
//! super-cell.
//!
//! A file is four length-framed records, each bracketed by a leading and
//! trailing little-endian `i32` byte-length marker (the record-framed
//! convention shared with legacy Fortran readers, which is why every
//! record is size-checked against `i32::MAX` before write):
//!
//! ```text
//! record 0: [fixed header (256 bytes)] [raw text header]
//! record 1: packed sub-cell origin array (3 * sub_cells^3 values)
//! record 2: packed per-(sub-cell, component) bit-width array
//! record 3: concatenated payload arrays, row-major over (s, j)
//! ```
//!
//! The header stores five cumulative offsets (the start positions of the
//! four records plus end-of-file) so every record's extent is checkable.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::container::dense_array::DenseArray;
use crate::error::{HalopackError, Result};
use crate::kernels::bound::{bound, min_bits, periodic_bound, periodic_unbound, unbound};

pub mod grid;
pub mod reader;
pub mod snapshot;
pub mod writer;


use self::snapshot::SimulationHeader;

/// Magic number identifying a vector-grid file.
pub const GRID_MAGIC: u64 = 0x0BAD_F00D;

/// Version of the vector-grid format this crate reads and writes.
pub const GRID_VERSION: u64 = 1;

/// The box quantization method (currently the only one).
pub const BOX_METHOD: u64 = 0;

/// Byte length of the fixed header at the start of record 0.
pub const GRID_HEADER_LEN: usize = 256;

/// Which variable a vector-grid file stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Position,
    Velocity,
}

impl VarKind {
    /// The `{var}` substitution used in file-name templates.
    pub fn label(self) -> &'static str {
        match self {
            Self::Position => "X",
            Self::Velocity => "V",
        }
    }

    pub fn as_u64(self) -> u64 {
        match self {
            Self::Position => 0,
            Self::Velocity => 1,
        }
    }

    pub fn from_u64(raw: u64) -> Result<Self> {
        match raw {
            0 => Ok(Self::Position),
            1 => Ok(Self::Velocity),
            other => Err(HalopackError::Corrupt(format!(
                "unrecognized variable kind {}",
                other
            ))),
        }
    }
}

/// The fixed-width header of a vector-grid file.
#[derive(Debug, Clone, PartialEq)]
pub struct GridFileHeader {
    pub var_kind: VarKind,
    pub method: u64,
    /// Seed for the dither sub-streams used at decode time.
    pub seed: i64,
    /// Index of this file's super-cell in the super-cell grid.
    pub cell_index: u64,
    /// Super-cells on one side of the full box.
    pub cells: u64,
    /// Sub-cells on one side of a super-cell.
    pub sub_cells: u64,
    pub raw_header_len: u64,
    pub origins_min: u64,
    pub origins_bits: u64,
    pub bits_min: u64,
    pub bits_bits: u64,
    /// Quantization pixels across `[limits[0], limits[1])`.
    pub pix: u64,
    pub limits: [f64; 2],
    /// The user-specified tolerance each component is stored to.
    pub delta: f64,
    /// Start positions of records 0..3, then end-of-file.
    pub offsets: [u64; 5],
    pub sim: SimulationHeader,
}

impl GridFileHeader {
    /// Elements on one side of a sub-cell.
    pub fn n_elem(&self) -> Result<u64> {
        let span = self.cells * self.sub_cells;
        let n_side = self.sim.n_side;
        if span == 0 || n_side <= 0 || n_side as u64 % span != 0 {
            return Err(HalopackError::Corrupt(format!(
                "cells = {}, sub_cells = {} do not divide n_side = {}",
                self.cells, self.sub_cells, n_side
            )));
        }
        Ok(n_side as u64 / span)
    }

    /// Sub-cells per super-cell.
    pub fn n_sub(&self) -> u64 {
        self.sub_cells * self.sub_cells * self.sub_cells
    }

    pub fn write_to(&self, wr: &mut impl Write) -> Result<()> {
        wr.write_u64::<LittleEndian>(GRID_MAGIC)?;
        wr.write_u64::<LittleEndian>(GRID_VERSION)?;
        wr.write_u64::<LittleEndian>(self.var_kind.as_u64())?;
        wr.write_u64::<LittleEndian>(self.method)?;
        wr.write_i64::<LittleEndian>(self.seed)?;
        wr.write_u64::<LittleEndian>(self.cell_index)?;
        wr.write_u64::<LittleEndian>(self.cells)?;
        wr.write_u64::<LittleEndian>(self.sub_cells)?;
        wr.write_u64::<LittleEndian>(self.raw_header_len)?;
        wr.write_u64::<LittleEndian>(self.origins_min)?;
        wr.write_u64::<LittleEndian>(self.origins_bits)?;
        wr.write_u64::<LittleEndian>(self.bits_min)?;
        wr.write_u64::<LittleEndian>(self.bits_bits)?;
        wr.write_u64::<LittleEndian>(self.pix)?;
        wr.write_f64::<LittleEndian>(self.limits[0])?;
        wr.write_f64::<LittleEndian>(self.limits[1])?;
        wr.write_f64::<LittleEndian>(self.delta)?;
        for &offset in &self.offsets {
            wr.write_u64::<LittleEndian>(offset)?;
        }
        self.sim.write_to(wr)?;
        Ok(())
    }

    pub fn read_from(rd: &mut impl Read) -> Result<Self> {
        let magic = rd.read_u64::<LittleEndian>()?;
        if magic != GRID_MAGIC {
            return Err(HalopackError::BadMagic {
                expected: GRID_MAGIC,
                found: magic,
            });
        }
        let version = rd.read_u64::<LittleEndian>()?;
        if version != GRID_VERSION {
            return Err(HalopackError::VersionMismatch {
                expected: GRID_VERSION as i64,
                found: version as i64,
            });
        }

        let var_kind = VarKind::from_u64(rd.read_u64::<LittleEndian>()?)?;
        let method = rd.read_u64::<LittleEndian>()?;
        let seed = rd.read_i64::<LittleEndian>()?;
        let cell_index = rd.read_u64::<LittleEndian>()?;
        let cells = rd.read_u64::<LittleEndian>()?;
        let sub_cells = rd.read_u64::<LittleEndian>()?;
        let raw_header_len = rd.read_u64::<LittleEndian>()?;
        let origins_min = rd.read_u64::<LittleEndian>()?;
        let origins_bits = rd.read_u64::<LittleEndian>()?;
        let bits_min = rd.read_u64::<LittleEndian>()?;
        let bits_bits = rd.read_u64::<LittleEndian>()?;
        let pix = rd.read_u64::<LittleEndian>()?;
        let limits = [
            rd.read_f64::<LittleEndian>()?,
            rd.read_f64::<LittleEndian>()?,
        ];
        let delta = rd.read_f64::<LittleEndian>()?;
        let mut offsets = [0u64; 5];
        for offset in offsets.iter_mut() {
            *offset = rd.read_u64::<LittleEndian>()?;
        }
        let sim = SimulationHeader::read_from(rd)?;

        Ok(GridFileHeader {
            var_kind,
            method,
            seed,
            cell_index,
            cells,
            sub_cells,
            raw_header_len,
            origins_min,
            origins_bits,
            bits_min,
            bits_bits,
            pix,
            limits,
            delta,
            offsets,
            sim,
        })
    }
}

/// Checks a record payload against the 31-bit frame limit.
pub(crate) fn frame_marker(len: usize) -> Result<i32> {
    if len > i32::MAX as usize {
        return Err(HalopackError::FrameSizeOverflow { size: len as u64 });
    }
    Ok(len as i32)
}

/// Writes one length-framed record.
pub(crate) fn write_record(wr: &mut impl Write, payload: &[u8]) -> Result<()> {
    let marker = frame_marker(payload.len())?;
    wr.write_i32::<LittleEndian>(marker)?;
    wr.write_all(payload)?;
    wr.write_i32::<LittleEndian>(marker)?;
    Ok(())
}

/// Reads one length-framed record, verifying the trailing marker.
pub(crate) fn read_record(rd: &mut impl Read) -> Result<Vec<u8>> {
    let leading = rd.read_i32::<LittleEndian>()?;
    if leading < 0 {
        return Err(HalopackError::Corrupt(format!(
            "negative record length {}",
            leading
        )));
    }
    let mut payload = vec![0u8; leading as usize];
    rd.read_exact(&mut payload)?;
    let trailing = rd.read_i32::<LittleEndian>()?;
    if trailing != leading {
        return Err(HalopackError::FrameMarkerMismatch {
            leading: leading as i64,
            trailing: trailing as i64,
        });
    }
    Ok(payload)
}

/// Bounds `x` (periodically for positions), rewrites it into the bounded
/// range and packs it. Returns `(bits, origin, array)`.
pub(crate) fn pack_values(
    pix: u64,
    periodic: bool,
    x: &mut [u64],
) -> Result<(u64, u64, DenseArray)> {
    let (origin, width) = if periodic {
        periodic_bound(pix, x)
    } else {
        bound(x)
    };
    let bits = min_bits(width);
    let array = DenseArray::new(bits, x)?;
    Ok((bits as u64, origin, array))
}

/// Inverts `pack_values`: decodes `array` into `out` and restores the
/// original values. `pix == 0` means the data was bounded without
/// periodicity; plain-bounded data never wraps, so the periodic restore
/// is also correct whenever `pix` is known.
pub(crate) fn load_values(pix: u64, origin: u64, array: &DenseArray, out: &mut [u64]) -> Result<()> {
    array.decode_into(out)?;
    if pix == 0 {
        unbound(origin, out);
    } else {
        periodic_unbound(pix, origin, out);
    }
    Ok(())
}
