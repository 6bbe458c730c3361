//! The catalogue write path: pull blocks from a row producer, cut and
//! optionally order them by mass, choose each column's narrowest
//! representation, and stream the encoded blocks to disk.
//!
//! Blocks are processed strictly in order with one producer and one
//! consumer of the output stream; the encoder scratch buffers are
//! single-threaded and reused across blocks.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, info};

use crate::config::{CatalogueConfig, ColumnSpec};
use crate::error::{HalopackError, Result};
use crate::kernels::classify::{classify_floats, classify_ints, classify_log_floats};
use crate::kernels::column::ColumnEncoder;
use crate::kernels::dither::DEFAULT_SEED;
use crate::types::{ColumnKind, ColumnTag};

use super::source::BlockSource;
use super::{FixedHeader, CATALOGUE_VERSION};

/// Splits the declared columns into integer and float groups and maps
/// every column to its index within its group.
fn group_columns(specs: &[ColumnSpec]) -> (Vec<usize>, Vec<usize>, Vec<usize>) {
    let mut buf_idx = vec![0usize; specs.len()];
    let mut icols = Vec::new();
    let mut fcols = Vec::new();

    for (i, spec) in specs.iter().enumerate() {
        if spec.kind == ColumnKind::Int {
            buf_idx[i] = icols.len();
            icols.push(i);
        } else {
            buf_idx[i] = fcols.len();
            fcols.push(i);
        }
    }

    (buf_idx, icols, fcols)
}

/// Converts the producer's table into a catalogue file at `path`.
pub fn write_catalogue<S: BlockSource + ?Sized>(
    source: &mut S,
    path: &Path,
    config: &CatalogueConfig,
) -> Result<()> {
    write_catalogue_with_cancel(source, path, config, None)
}

/// Like `write_catalogue`, checking `cancel` between blocks. A partial
/// file left behind after cancellation is the caller's to delete.
pub fn write_catalogue_with_cancel<S: BlockSource + ?Sized>(
    source: &mut S,
    path: &Path,
    config: &CatalogueConfig,
    cancel: Option<&AtomicBool>,
) -> Result<()> {
    let specs = config.column_specs()?;
    let skipped = config.skip_flags(&specs);
    let (buf_idx, icols, fcols) = group_columns(&specs);

    let columns = specs.len();
    let blocks = source.blocks();
    let names_blob: Vec<u8> = specs
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(",")
        .into_bytes();
    let raw_header = source.raw_header().to_vec();
    let min_mass = config.min_mass();

    let fixed = FixedHeader {
        version: CATALOGUE_VERSION,
        seed: DEFAULT_SEED,
        columns: columns as i64,
        mass_column: config.mass_column,
        blocks: blocks as i64,
        raw_header_len: raw_header.len() as i64,
        names_len: names_blob.len() as i64,
        min_mass,
    };

    let mut wr = BufWriter::new(File::create(path)?);
    fixed.write_to(&mut wr)?;
    for spec in &specs {
        wr.write_f64::<LittleEndian>(spec.delta)?;
    }
    wr.write_all(&skipped)?;
    wr.write_all(&raw_header)?;
    wr.write_all(&names_blob)?;

    info!(
        "writing catalogue {}: {} columns, {} blocks, min mass {:.4e}",
        path.display(),
        columns,
        blocks,
        min_mass
    );

    let mut enc = ColumnEncoder::new();
    let mut ibuf: Vec<Vec<i64>> = Vec::new();
    let mut fbuf: Vec<Vec<f64>> = Vec::new();
    let mut ivals: Vec<i64> = Vec::new();
    let mut fvals: Vec<f64> = Vec::new();
    let mut order: Vec<usize> = Vec::new();
    let mut tags = vec![ColumnTag::Float32; columns];
    let mut keys = vec![0i64; columns];

    for block in 0..blocks {
        if let Some(flag) = cancel {
            if flag.load(Ordering::Relaxed) {
                return Err(HalopackError::Cancelled);
            }
        }

        source.read_int_block(&icols, block, &mut ibuf)?;
        source.read_float_block(&fcols, block, &mut fbuf)?;

        let mass = &fbuf[buf_idx[config.mass_column as usize]];
        let total = mass.len();
        for (k, &col) in icols.iter().enumerate() {
            if ibuf[k].len() != total {
                return Err(HalopackError::InvalidArgument(format!(
                    "block {}: column {} has {} rows, expected {}",
                    block,
                    col,
                    ibuf[k].len(),
                    total
                )));
            }
        }
        for (k, &col) in fcols.iter().enumerate() {
            if fbuf[k].len() != total {
                return Err(HalopackError::InvalidArgument(format!(
                    "block {}: column {} has {} rows, expected {}",
                    block,
                    col,
                    fbuf[k].len(),
                    total
                )));
            }
        }

        order.clear();
        order.extend((0..total).filter(|&r| mass[r] >= min_mass));
        if config.sort {
            order.sort_by(|&a, &b| mass[b].total_cmp(&mass[a]));
        }

        wr.write_i64::<LittleEndian>(order.len() as i64)?;

        for (col, spec) in specs.iter().enumerate() {
            let (tag, key) = match spec.kind {
                ColumnKind::Int => {
                    gather_ints(&ibuf[buf_idx[col]], &order, &mut ivals);
                    classify_ints(&ivals)
                }
                ColumnKind::Float => {
                    gather_floats(&fbuf[buf_idx[col]], &order, &mut fvals);
                    classify_floats(&fvals, spec.delta)
                }
                ColumnKind::LogFloat => {
                    gather_floats(&fbuf[buf_idx[col]], &order, &mut fvals);
                    classify_log_floats(&fvals, spec.delta)
                }
            };
            tags[col] = tag;
            keys[col] = key;
        }

        for &tag in &tags {
            wr.write_i64::<LittleEndian>(tag as i64)?;
        }
        for &key in &keys {
            wr.write_i64::<LittleEndian>(key)?;
        }

        for (col, spec) in specs.iter().enumerate() {
            if skipped[col] == 1 {
                continue;
            }
            let written_key = match spec.kind {
                ColumnKind::Int => {
                    gather_ints(&ibuf[buf_idx[col]], &order, &mut ivals);
                    enc.encode_ints(tags[col], &ivals, &mut wr)?
                }
                ColumnKind::Float | ColumnKind::LogFloat => {
                    gather_floats(&fbuf[buf_idx[col]], &order, &mut fvals);
                    enc.encode_floats(tags[col], spec.delta, &fvals, &mut wr)?
                }
            };
            debug_assert_eq!(written_key, keys[col], "column {} key drift", col);
        }

        debug!(
            "block {}/{}: kept {} of {} rows",
            block + 1,
            blocks,
            order.len(),
            total
        );
    }

    wr.flush()?;
    Ok(())
}

fn gather_ints(src: &[i64], order: &[usize], out: &mut Vec<i64>) {
    out.clear();
    out.extend(order.iter().map(|&r| src[r]));
}

fn gather_floats(src: &[f64], order: &[usize], out: &mut Vec<f64>) {
    out.clear();
    out.extend(order.iter().map(|&r| src[r]));
}
