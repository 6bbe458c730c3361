//! The particle-source seam of the vector-grid writer, plus the
//! simulation header embedded in every grid file.
//!
//! Engine-specific snapshot readers live outside this crate; they only
//! need to deliver positions, velocities and lattice IDs per file. The
//! in-memory implementation below backs the round-trip tests and small
//! embedded uses.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HalopackError, Result};

use super::grid::VectorGrid;

/// Basic information about a snapshot, carried verbatim into every
/// vector-grid file. Not all simulation formats provide every field; the
/// caller is responsible for filling gaps before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SimulationHeader {
    /// Redshift and scale factor.
    pub z: f64,
    pub scale: f64,
    /// Omega_m(z=0), Omega_L(z=0), little-h(z=0).
    pub omega_m: f64,
    pub omega_l: f64,
    pub h100: f64,
    /// Box side length and force softening.
    pub box_len: f64,
    pub epsilon: f64,
    /// Particles on one side, total particles.
    pub n_side: i64,
    pub n_total: i64,
    /// If all particle masses are the same, this is m_p.
    pub uniform_mp: f64,
}

impl SimulationHeader {
    pub fn write_to(&self, wr: &mut impl Write) -> Result<()> {
        wr.write_f64::<LittleEndian>(self.z)?;
        wr.write_f64::<LittleEndian>(self.scale)?;
        wr.write_f64::<LittleEndian>(self.omega_m)?;
        wr.write_f64::<LittleEndian>(self.omega_l)?;
        wr.write_f64::<LittleEndian>(self.h100)?;
        wr.write_f64::<LittleEndian>(self.box_len)?;
        wr.write_f64::<LittleEndian>(self.epsilon)?;
        wr.write_i64::<LittleEndian>(self.n_side)?;
        wr.write_i64::<LittleEndian>(self.n_total)?;
        wr.write_f64::<LittleEndian>(self.uniform_mp)?;
        Ok(())
    }

    pub fn read_from(rd: &mut impl Read) -> Result<Self> {
        Ok(SimulationHeader {
            z: rd.read_f64::<LittleEndian>()?,
            scale: rd.read_f64::<LittleEndian>()?,
            omega_m: rd.read_f64::<LittleEndian>()?,
            omega_l: rd.read_f64::<LittleEndian>()?,
            h100: rd.read_f64::<LittleEndian>()?,
            box_len: rd.read_f64::<LittleEndian>()?,
            epsilon: rd.read_f64::<LittleEndian>()?,
            n_side: rd.read_i64::<LittleEndian>()?,
            n_total: rd.read_i64::<LittleEndian>()?,
            uniform_mp: rd.read_f64::<LittleEndian>()?,
        })
    }
}

/// A producer of particle data, one batch per snapshot file.
///
/// The read methods return internal buffers: do not append to them or
/// expect them to survive the next read call. IDs are 1-based, as the
/// common snapshot formats store them; the grid builders shift to
/// 0-based lattice IDs.
pub trait ParticleSource {
    /// Number of files in the snapshot.
    fn files(&self) -> usize;

    fn header(&self) -> &SimulationHeader;

    /// Whether every particle has the same mass. Conversion requires it.
    fn uniform_mass(&self) -> bool;

    /// A raw text header copied verbatim into each output file.
    fn raw_header(&self) -> &[u8] {
        &[]
    }

    /// Positions for file `file`.
    fn read_positions(&mut self, file: usize) -> Result<&[[f32; 3]]>;

    /// Velocities for file `file`.
    fn read_velocities(&mut self, file: usize) -> Result<&[[f32; 3]]>;

    /// Particle IDs for file `file`.
    fn read_ids(&mut self, file: usize) -> Result<&[i64]>;
}

/// Builds the position grid of a snapshot with `cells` grid cells per
/// side.
pub fn position_grid(source: &mut dyn ParticleSource, cells: u64) -> Result<VectorGrid> {
    fill_grid(source, cells, true)
}

/// Builds the velocity grid of a snapshot with `cells` grid cells per
/// side.
pub fn velocity_grid(source: &mut dyn ParticleSource, cells: u64) -> Result<VectorGrid> {
    fill_grid(source, cells, false)
}

fn fill_grid(source: &mut dyn ParticleSource, cells: u64, positions: bool) -> Result<VectorGrid> {
    let n_side = source.header().n_side;
    if n_side <= 0 {
        return Err(HalopackError::InvalidArgument(format!(
            "snapshot header has n_side = {}",
            n_side
        )));
    }
    let mut grid = VectorGrid::new(cells, n_side as u64)?;

    // The ID batch is copied out so the source's vector buffer can stay
    // borrowed while the file is inserted.
    let mut ids: Vec<i64> = Vec::new();
    for file in 0..source.files() {
        ids.clear();
        ids.extend_from_slice(source.read_ids(file)?);

        let vectors = if positions {
            source.read_positions(file)?
        } else {
            source.read_velocities(file)?
        };
        if vectors.len() != ids.len() {
            return Err(HalopackError::InvalidArgument(format!(
                "file {}: {} vectors but {} IDs",
                file,
                vectors.len(),
                ids.len()
            )));
        }

        for (&id, &v) in ids.iter().zip(vectors) {
            grid.insert(id - 1, v)?;
        }
    }

    Ok(grid)
}

/// A `ParticleSource` over data already in memory.
#[derive(Debug, Clone, Default)]
pub struct MockParticleSource {
    header: SimulationHeader,
    raw_header: Vec<u8>,
    positions: Vec<Vec<[f32; 3]>>,
    velocities: Vec<Vec<[f32; 3]>>,
    ids: Vec<Vec<i64>>,
}

impl MockParticleSource {
    pub fn new(
        header: SimulationHeader,
        positions: Vec<Vec<[f32; 3]>>,
        velocities: Vec<Vec<[f32; 3]>>,
        ids: Vec<Vec<i64>>,
    ) -> Self {
        MockParticleSource {
            header,
            raw_header: Vec::new(),
            positions,
            velocities,
            ids,
        }
    }

    pub fn with_raw_header(mut self, raw_header: impl Into<Vec<u8>>) -> Self {
        self.raw_header = raw_header.into();
        self
    }
}

impl ParticleSource for MockParticleSource {
    fn files(&self) -> usize {
        self.ids.len()
    }

    fn header(&self) -> &SimulationHeader {
        &self.header
    }

    fn uniform_mass(&self) -> bool {
        self.header.uniform_mp > 0.0
    }

    fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    fn read_positions(&mut self, file: usize) -> Result<&[[f32; 3]]> {
        batch(&self.positions, file)
    }

    fn read_velocities(&mut self, file: usize) -> Result<&[[f32; 3]]> {
        batch(&self.velocities, file)
    }

    fn read_ids(&mut self, file: usize) -> Result<&[i64]> {
        batch(&self.ids, file)
    }
}

fn batch<T>(data: &[Vec<T>], file: usize) -> Result<&[T]> {
    data.get(file).map(|v| v.as_slice()).ok_or_else(|| {
        HalopackError::InvalidArgument(format!("file {} out of range for {} files", file, data.len()))
    })
}
