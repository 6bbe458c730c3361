//! The vector-grid write path: build a grid per variable, then emit one
//! framed file per super-cell.
//!
//! Super-cells are processed sequentially so the memory high-water mark
//! stays bounded to one super-cell's quantization buffers; within a
//! super-cell the per-(sub-cell, component) quantize/bound/pack work is
//! fanned across the rayon pool with one scratch buffer per worker.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};
use log::info;
use rayon::prelude::*;

use crate::container::dense_array::DenseArray;
use crate::error::{HalopackError, Result};
use crate::kernels::dither::DEFAULT_SEED;

use super::grid::{min_pix, VectorGrid};
use super::snapshot::{position_grid, velocity_grid, ParticleSource, SimulationHeader};
use super::{
    frame_marker, pack_values, write_record, GridFileHeader, VarKind, BOX_METHOD, GRID_HEADER_LEN,
};

/// The bounded, packed form of one sub-cell: per-component origins, bit
/// widths and payload arrays.
struct SubCellPack {
    origins: [u64; 3],
    bits: [u64; 3],
    arrays: Vec<DenseArray>,
}

/// Substitutes `{var}` and `{idx}` in a file-name template.
pub fn grid_file_name(template: &str, var: VarKind, cell_index: u64) -> String {
    template
        .replace("{var}", var.label())
        .replace("{idx}", &cell_index.to_string())
}

/// Converts a snapshot into vector-grid files: one position file and one
/// velocity file per super-cell, named by `template` under `dir`.
///
/// Positions are stored to tolerance `dx` on `[0, box_len)` per
/// component (periodic); velocities to tolerance `dv` on their global
/// range. `cancel` is checked between super-cells.
pub fn convert_to_grid_files(
    source: &mut dyn ParticleSource,
    cells: u64,
    sub_cells: u64,
    dx: f64,
    dv: f64,
    dir: &Path,
    template: &str,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let sim = *source.header();
    let span = cells * sub_cells;
    if span == 0 || sim.n_side <= 0 || sim.n_side as u64 % span != 0 {
        return Err(HalopackError::InvalidArgument(format!(
            "cells = {}, sub_cells = {} do not divide n_side = {}",
            cells, sub_cells, sim.n_side
        )));
    }
    if !source.uniform_mass() {
        return Err(HalopackError::InvalidArgument(
            "non-uniform particle masses are not supported".to_string(),
        ));
    }
    let raw_header = source.raw_header().to_vec();

    let grid = position_grid(source, span)?;
    write_grid_files(
        &grid,
        &sim,
        &raw_header,
        VarKind::Position,
        sub_cells,
        dx,
        [0.0, sim.box_len],
        dir,
        template,
        cancel,
    )?;
    drop(grid);

    let grid = velocity_grid(source, span)?;
    let limits = grid.limits();
    write_grid_files(
        &grid,
        &sim,
        &raw_header,
        VarKind::Velocity,
        sub_cells,
        dv,
        limits,
        dir,
        template,
        cancel,
    )
}

/// Writes one framed file per super-cell of an already-built grid.
#[allow(clippy::too_many_arguments)]
pub fn write_grid_files(
    grid: &VectorGrid,
    sim: &SimulationHeader,
    raw_header: &[u8],
    var: VarKind,
    sub_cells: u64,
    delta: f64,
    limits: [f64; 2],
    dir: &Path,
    template: &str,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let n_cell = grid.geometry().n_cell;
    if sub_cells == 0 || n_cell % sub_cells != 0 {
        return Err(HalopackError::InvalidArgument(format!(
            "sub_cells = {} does not evenly divide the {} grid cells per side",
            sub_cells, n_cell
        )));
    }
    let cells = n_cell / sub_cells;
    let pix = min_pix(limits, delta)?;
    let n_sub = sub_cells * sub_cells * sub_cells;
    let n_super = cells * cells * cells;

    info!(
        "writing {} {} files to {}: pix = {}, limits = [{}, {}]",
        n_super,
        var.label(),
        dir.display(),
        pix,
        limits[0],
        limits[1]
    );

    for c in 0..n_super {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(HalopackError::Cancelled);
            }
        }

        let packs: Vec<SubCellPack> = (0..n_sub)
            .into_par_iter()
            .map_init(
                || grid.int_buffer(),
                |quant, s| pack_sub_cell(grid, var, cells, sub_cells, c, s, pix, limits, quant),
            )
            .collect::<Result<Vec<_>>>()?;

        let path = dir.join(grid_file_name(template, var, c));
        write_one_file(
            &path, sim, raw_header, var, c, cells, sub_cells, pix, limits, delta, &packs,
        )?;
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn pack_sub_cell(
    grid: &VectorGrid,
    var: VarKind,
    cells: u64,
    sub_cells: u64,
    c: u64,
    s: u64,
    pix: u64,
    limits: [f64; 2],
    quant: &mut [Vec<u64>; 3],
) -> Result<SubCellPack> {
    let cell = lattice_cell(cells, sub_cells, c, s);
    grid.quantize(cell as usize, pix, limits, quant)?;

    let mut origins = [0u64; 3];
    let mut bits = [0u64; 3];
    let mut arrays = Vec::with_capacity(3);
    for (j, component) in quant.iter_mut().enumerate() {
        let (b, origin, array) = pack_values(pix, var == VarKind::Position, component)?;
        origins[j] = origin;
        bits[j] = b;
        arrays.push(array);
    }

    Ok(SubCellPack {
        origins,
        bits,
        arrays,
    })
}

/// Index of sub-cell `s` of super-cell `c` in the flat grid of
/// `cells * sub_cells` cells per side.
fn lattice_cell(cells: u64, sub_cells: u64, c: u64, s: u64) -> u64 {
    let cx = c % cells;
    let cy = (c / cells) % cells;
    let cz = c / (cells * cells);

    let sx = s % sub_cells;
    let sy = (s / sub_cells) % sub_cells;
    let sz = s / (sub_cells * sub_cells);

    let n = cells * sub_cells;
    let ix = cx * sub_cells + sx;
    let iy = cy * sub_cells + sy;
    let iz = cz * sub_cells + sz;

    ix + iy * n + iz * n * n
}

#[allow(clippy::too_many_arguments)]
fn write_one_file(
    path: &Path,
    sim: &SimulationHeader,
    raw_header: &[u8],
    var: VarKind,
    cell_index: u64,
    cells: u64,
    sub_cells: u64,
    pix: u64,
    limits: [f64; 2],
    delta: f64,
    packs: &[SubCellPack],
) -> Result<()> {
    let mut origins_flat: Vec<u64> = Vec::with_capacity(3 * packs.len());
    let mut bits_flat: Vec<u64> = Vec::with_capacity(3 * packs.len());
    for pack in packs {
        origins_flat.extend_from_slice(&pack.origins);
        bits_flat.extend_from_slice(&pack.bits);
    }

    // The origin and bit-width tables are bounded and packed on their
    // own, independently of each other and of the payload arrays.
    let (origins_bits, origins_min, origins_array) = pack_values(0, false, &mut origins_flat)?;
    let (bits_bits, bits_min, bits_array) = pack_values(0, false, &mut bits_flat)?;

    let payload_total: usize = packs
        .iter()
        .map(|p| p.arrays.iter().map(|a| a.data().len()).sum::<usize>())
        .sum();

    let record0_len = GRID_HEADER_LEN + raw_header.len();
    let mut offsets = [0u64; 5];
    offsets[1] = offsets[0] + 8 + record0_len as u64;
    offsets[2] = offsets[1] + 8 + origins_array.data().len() as u64;
    offsets[3] = offsets[2] + 8 + bits_array.data().len() as u64;
    offsets[4] = offsets[3] + 8 + payload_total as u64;

    let header = GridFileHeader {
        var_kind: var,
        method: BOX_METHOD,
        seed: DEFAULT_SEED,
        cell_index,
        cells,
        sub_cells,
        raw_header_len: raw_header.len() as u64,
        origins_min,
        origins_bits,
        bits_min,
        bits_bits,
        pix,
        limits,
        delta,
        offsets,
        sim: *sim,
    };

    let mut wr = BufWriter::new(File::create(path)?);

    let mut record0 = Vec::with_capacity(record0_len);
    header.write_to(&mut record0)?;
    record0.extend_from_slice(raw_header);
    write_record(&mut wr, &record0)?;

    write_record(&mut wr, origins_array.data())?;
    write_record(&mut wr, bits_array.data())?;

    // The payload record is streamed array by array instead of being
    // concatenated in memory first.
    let marker = frame_marker(payload_total)?;
    wr.write_i32::<LittleEndian>(marker)?;
    for pack in packs {
        for array in &pack.arrays {
            wr.write_all(array.data())?;
        }
    }
    wr.write_i32::<LittleEndian>(marker)?;

    wr.flush()?;
    Ok(())
}
