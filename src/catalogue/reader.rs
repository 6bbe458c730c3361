//! The catalogue read path: parse the header, walk the per-block
//! descriptors once, then serve random-access column reads by index or
//! by name.
//!
//! Schema errors (`UnknownColumn`, `ColumnTypeMismatch`,
//! `SkippedColumnRead`) leave the reader untouched and reusable. Decoded
//! quantized floats are dithered with the sub-stream of their
//! `(block, column)` pair, so any read order reconstructs identical
//! values.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use log::debug;

use crate::error::{HalopackError, Result};
use crate::kernels::column::ColumnEncoder;
use crate::kernels::dither::Dither;
use crate::types::ColumnTag;

use super::{BlockMeta, CatalogueHeader, FixedHeader, CATALOGUE_VERSION};

/// A random-access reader over one catalogue file.
pub struct CatalogueReader {
    file: File,
    header: CatalogueHeader,
    block_meta: Vec<BlockMeta>,
    total_rows: usize,
    enc: ColumnEncoder,
}

impl CatalogueReader {
    /// Opens a catalogue and walks its block descriptors.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;

        let fixed = FixedHeader::read_from(&mut file)?;
        if fixed.version != CATALOGUE_VERSION {
            return Err(HalopackError::VersionMismatch {
                expected: CATALOGUE_VERSION,
                found: fixed.version,
            });
        }
        if fixed.columns < 0
            || fixed.blocks < 0
            || fixed.raw_header_len < 0
            || fixed.names_len < 0
        {
            return Err(HalopackError::Corrupt(
                "negative count in fixed header".to_string(),
            ));
        }

        let columns = fixed.columns as usize;
        let mut deltas = vec![0f64; columns];
        for delta in deltas.iter_mut() {
            *delta = file.read_f64::<LittleEndian>()?;
        }
        let mut skipped = vec![0u8; columns];
        file.read_exact(&mut skipped)?;
        let mut raw_header = vec![0u8; fixed.raw_header_len as usize];
        file.read_exact(&mut raw_header)?;
        let mut names_blob = vec![0u8; fixed.names_len as usize];
        file.read_exact(&mut names_blob)?;

        let names: Vec<String> = String::from_utf8_lossy(&names_blob)
            .split(',')
            .map(|n| n.trim().to_lowercase())
            .collect();
        if !names_blob.is_empty() && names.len() != columns {
            return Err(HalopackError::Corrupt(format!(
                "{} column names for {} columns",
                names.len(),
                columns
            )));
        }

        let header = CatalogueHeader::new(fixed, deltas, skipped, raw_header, names);

        let file_len = file.metadata()?.len();
        let mut block_meta = Vec::with_capacity(header.fixed.blocks as usize);
        let mut total_rows = 0usize;
        let mut offset = header.len();

        for block in 0..header.fixed.blocks {
            file.seek(SeekFrom::Start(offset))?;
            let rows = file.read_i64::<LittleEndian>()?;
            if rows < 0 {
                return Err(HalopackError::Corrupt(format!(
                    "block {} has negative row count {}",
                    block, rows
                )));
            }

            let mut tags = Vec::with_capacity(columns);
            for _ in 0..columns {
                tags.push(ColumnTag::from_i64(file.read_i64::<LittleEndian>()?)?);
            }
            let mut keys = vec![0i64; columns];
            for key in keys.iter_mut() {
                *key = file.read_i64::<LittleEndian>()?;
            }

            let meta = BlockMeta {
                rows,
                tags,
                keys,
                payload_offset: offset + 8 + 16 * columns as u64,
            };
            offset = meta.payload_offset + meta.payload_len(&header.skipped);
            if offset > file_len {
                return Err(HalopackError::Corrupt(format!(
                    "block {} extends past end of file",
                    block
                )));
            }

            total_rows += rows as usize;
            block_meta.push(meta);
        }

        debug!(
            "opened catalogue {}: {} rows in {} blocks",
            path.display(),
            total_rows,
            block_meta.len()
        );

        Ok(CatalogueReader {
            file,
            header,
            block_meta,
            total_rows,
            enc: ColumnEncoder::new(),
        })
    }

    pub fn blocks(&self) -> usize {
        self.block_meta.len()
    }

    /// Total rows across all blocks.
    pub fn rows(&self) -> usize {
        self.total_rows
    }

    pub fn block_rows(&self, block: usize) -> usize {
        self.block_meta[block].rows as usize
    }

    pub fn raw_header(&self) -> &[u8] {
        &self.header.raw_header
    }

    pub fn names(&self) -> &[String] {
        &self.header.names
    }

    pub fn delta(&self, col: usize) -> f64 {
        self.header.deltas[col]
    }

    pub fn min_mass(&self) -> f64 {
        self.header.fixed.min_mass
    }

    pub fn is_skipped(&self, col: usize) -> bool {
        self.header.skipped[col] == 1
    }

    /// Whether `col` stores integers. Tags never mix kinds across
    /// blocks, so the first block decides.
    pub fn is_int(&self, col: usize) -> Result<bool> {
        let meta = self.block_meta.first().ok_or_else(|| {
            HalopackError::InvalidArgument("catalogue has no blocks".to_string())
        })?;
        Ok(meta.tags[col].is_int())
    }

    /// Resolves a column name (trimmed, case-insensitive).
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.header.column_index(name)
    }

    /// Reads integer columns across every block, concatenated in block
    /// order. `bufs` is resized to `cols.len()` vectors of `rows()`.
    pub fn read_ints(&mut self, cols: &[usize], bufs: &mut Vec<Vec<i64>>) -> Result<()> {
        self.check_columns(cols, true)?;
        prepare(bufs, cols.len(), self.total_rows, 0i64);

        let mut start = 0usize;
        for block in 0..self.block_meta.len() {
            let end = start + self.block_meta[block].rows as usize;
            for (i, &col) in cols.iter().enumerate() {
                self.read_int_segment(block, col, &mut bufs[i][start..end])?;
            }
            start = end;
        }
        Ok(())
    }

    /// Reads float columns across every block as `f64`.
    pub fn read_floats(&mut self, cols: &[usize], bufs: &mut Vec<Vec<f64>>) -> Result<()> {
        self.check_columns(cols, false)?;
        prepare(bufs, cols.len(), self.total_rows, 0f64);

        let mut start = 0usize;
        for block in 0..self.block_meta.len() {
            let end = start + self.block_meta[block].rows as usize;
            for (i, &col) in cols.iter().enumerate() {
                self.read_float_segment(block, col, &mut bufs[i][start..end])?;
            }
            start = end;
        }
        Ok(())
    }

    /// Reads float columns across every block, narrowed to `f32`.
    pub fn read_floats_f32(&mut self, cols: &[usize], bufs: &mut Vec<Vec<f32>>) -> Result<()> {
        self.check_columns(cols, false)?;
        prepare(bufs, cols.len(), self.total_rows, 0f32);

        let mut start = 0usize;
        for block in 0..self.block_meta.len() {
            let end = start + self.block_meta[block].rows as usize;
            for (i, &col) in cols.iter().enumerate() {
                self.read_float_segment_f32(block, col, &mut bufs[i][start..end])?;
            }
            start = end;
        }
        Ok(())
    }

    /// Reads integer columns of a single block.
    pub fn read_int_block(
        &mut self,
        cols: &[usize],
        block: usize,
        bufs: &mut Vec<Vec<i64>>,
    ) -> Result<()> {
        self.check_columns(cols, true)?;
        prepare(bufs, cols.len(), self.block_rows(block), 0i64);
        for (i, &col) in cols.iter().enumerate() {
            self.read_int_segment(block, col, &mut bufs[i][..])?;
        }
        Ok(())
    }

    /// Reads float columns of a single block as `f64`.
    pub fn read_float_block(
        &mut self,
        cols: &[usize],
        block: usize,
        bufs: &mut Vec<Vec<f64>>,
    ) -> Result<()> {
        self.check_columns(cols, false)?;
        prepare(bufs, cols.len(), self.block_rows(block), 0f64);
        for (i, &col) in cols.iter().enumerate() {
            self.read_float_segment(block, col, &mut bufs[i][..])?;
        }
        Ok(())
    }

    /// Reads float columns of a single block, narrowed to `f32`.
    pub fn read_float_block_f32(
        &mut self,
        cols: &[usize],
        block: usize,
        bufs: &mut Vec<Vec<f32>>,
    ) -> Result<()> {
        self.check_columns(cols, false)?;
        prepare(bufs, cols.len(), self.block_rows(block), 0f32);
        for (i, &col) in cols.iter().enumerate() {
            self.read_float_segment_f32(block, col, &mut bufs[i][..])?;
        }
        Ok(())
    }

    /// `read_ints` with columns given by name.
    pub fn read_ints_by_name(&mut self, names: &[&str], bufs: &mut Vec<Vec<i64>>) -> Result<()> {
        let cols = self.resolve(names)?;
        self.read_ints(&cols, bufs)
    }

    /// `read_floats` with columns given by name.
    pub fn read_floats_by_name(&mut self, names: &[&str], bufs: &mut Vec<Vec<f64>>) -> Result<()> {
        let cols = self.resolve(names)?;
        self.read_floats(&cols, bufs)
    }

    /// `read_floats_f32` with columns given by name.
    pub fn read_floats_f32_by_name(
        &mut self,
        names: &[&str],
        bufs: &mut Vec<Vec<f32>>,
    ) -> Result<()> {
        let cols = self.resolve(names)?;
        self.read_floats_f32(&cols, bufs)
    }

    fn resolve(&self, names: &[&str]) -> Result<Vec<usize>> {
        names
            .iter()
            .map(|name| self.header.column_index(name))
            .collect()
    }

    /// Validates skip flags and column kinds before any byte is read, so
    /// failed queries leave caller buffers untouched.
    fn check_columns(&self, cols: &[usize], want_int: bool) -> Result<()> {
        for &col in cols {
            if col >= self.header.names.len() {
                return Err(HalopackError::UnknownColumn(format!("#{}", col)));
            }
            if self.is_skipped(col) {
                return Err(HalopackError::SkippedColumnRead(col));
            }
            let stored_int = self.is_int(col)?;
            if stored_int != want_int {
                return Err(HalopackError::ColumnTypeMismatch {
                    column: col,
                    stored: if stored_int { "integer" } else { "float" },
                    requested: if want_int { "integer" } else { "float" },
                });
            }
        }
        Ok(())
    }

    fn read_int_segment(&mut self, block: usize, col: usize, out: &mut [i64]) -> Result<()> {
        let meta = &self.block_meta[block];
        let offset = meta.column_offset(col, &self.header.skipped);
        let (tag, key) = (meta.tags[col], meta.keys[col]);

        self.file.seek(SeekFrom::Start(offset))?;
        let Self { file, enc, .. } = self;
        enc.decode_ints(tag, key, file, out)
    }

    fn read_float_segment(&mut self, block: usize, col: usize, out: &mut [f64]) -> Result<()> {
        let meta = &self.block_meta[block];
        let offset = meta.column_offset(col, &self.header.skipped);
        let (tag, key) = (meta.tags[col], meta.keys[col]);
        let delta = self.header.deltas[col];
        let mut dither = Dither::substream(self.header.fixed.seed, block as u64, col as u64);

        self.file.seek(SeekFrom::Start(offset))?;
        let Self { file, enc, .. } = self;
        enc.decode_floats(tag, delta, key, &mut dither, file, out)
    }

    fn read_float_segment_f32(&mut self, block: usize, col: usize, out: &mut [f32]) -> Result<()> {
        let meta = &self.block_meta[block];
        let offset = meta.column_offset(col, &self.header.skipped);
        let (tag, key) = (meta.tags[col], meta.keys[col]);
        let delta = self.header.deltas[col];
        let mut dither = Dither::substream(self.header.fixed.seed, block as u64, col as u64);

        self.file.seek(SeekFrom::Start(offset))?;
        let Self { file, enc, .. } = self;
        enc.decode_floats_f32(tag, delta, key, &mut dither, file, out)
    }
}

/// Grows or shrinks `bufs` to `cols` vectors of exactly `n` elements.
fn prepare<T: Clone>(bufs: &mut Vec<Vec<T>>, cols: usize, n: usize, fill: T) {
    bufs.resize(cols, Vec::new());
    for buf in bufs.iter_mut() {
        buf.resize(n, fill.clone());
    }
}
