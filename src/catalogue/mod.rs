//! The block-structured halo-catalogue format and its codec.
//!
//! This is the single source of truth for the on-disk layout (version 3,
//! little-endian):
//!
//! ```text
//! [FixedHeader (64 bytes)]
//! [deltas: f64 x columns] [skip: u8 x columns]
//! [raw text header] [column names, comma separated]
//! [block 0] [block 1] ... [block B-1]
//!
//! block = [rows: i64] [tag: i64 x columns] [key: i64 x columns]
//!         [payloads of the non-skipped columns, in column order]
//! ```
//!
//! Each block carries its own column tags and keys, so the narrowest
//! representation is chosen per block. A skipped column still occupies a
//! tag/key slot but contributes zero payload bytes.

use std::collections::HashMap;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{HalopackError, Result};
use crate::types::ColumnTag;

pub mod reader;
pub mod source;
pub mod writer;

#[cfg(test)]
mod tests;

/// Version of the catalogue format this crate reads and writes.
pub const CATALOGUE_VERSION: i64 = 3;

/// Size of the fixed-width header in bytes.
pub const FIXED_HEADER_LEN: u64 = 64;

/// The fixed-width portion of a catalogue header.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedHeader {
    pub version: i64,
    /// Seed for the dither streams used when dequantizing floats.
    pub seed: i64,
    pub columns: i64,
    pub mass_column: i64,
    pub blocks: i64,
    pub raw_header_len: i64,
    pub names_len: i64,
    /// Approximate smallest mass stored in the file,
    /// `min_particles * particle_mass`.
    pub min_mass: f64,
}

impl FixedHeader {
    pub fn write_to(&self, wr: &mut impl Write) -> Result<()> {
        wr.write_i64::<LittleEndian>(self.version)?;
        wr.write_i64::<LittleEndian>(self.seed)?;
        wr.write_i64::<LittleEndian>(self.columns)?;
        wr.write_i64::<LittleEndian>(self.mass_column)?;
        wr.write_i64::<LittleEndian>(self.blocks)?;
        wr.write_i64::<LittleEndian>(self.raw_header_len)?;
        wr.write_i64::<LittleEndian>(self.names_len)?;
        wr.write_f64::<LittleEndian>(self.min_mass)?;
        Ok(())
    }

    pub fn read_from(rd: &mut impl Read) -> Result<Self> {
        Ok(FixedHeader {
            version: rd.read_i64::<LittleEndian>()?,
            seed: rd.read_i64::<LittleEndian>()?,
            columns: rd.read_i64::<LittleEndian>()?,
            mass_column: rd.read_i64::<LittleEndian>()?,
            blocks: rd.read_i64::<LittleEndian>()?,
            raw_header_len: rd.read_i64::<LittleEndian>()?,
            names_len: rd.read_i64::<LittleEndian>()?,
            min_mass: rd.read_f64::<LittleEndian>()?,
        })
    }
}

/// The full parsed header: fixed fields plus the variable-length tables.
#[derive(Debug, Clone)]
pub struct CatalogueHeader {
    pub fixed: FixedHeader,
    pub deltas: Vec<f64>,
    pub skipped: Vec<u8>,
    pub raw_header: Vec<u8>,
    pub names: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl CatalogueHeader {
    pub fn new(
        fixed: FixedHeader,
        deltas: Vec<f64>,
        skipped: Vec<u8>,
        raw_header: Vec<u8>,
        names: Vec<String>,
    ) -> Self {
        let lookup = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();
        CatalogueHeader {
            fixed,
            deltas,
            skipped,
            raw_header,
            names,
            lookup,
        }
    }

    /// Byte offset of the first block.
    pub fn len(&self) -> u64 {
        let columns = self.fixed.columns as u64;
        FIXED_HEADER_LEN
            + 8 * columns
            + columns
            + self.fixed.raw_header_len as u64
            + self.fixed.names_len as u64
    }

    /// Resolves a column name (trimmed, case-insensitive) to its index.
    pub fn column_index(&self, name: &str) -> Result<usize> {
        let key = name.trim().to_lowercase();
        self.lookup
            .get(&key)
            .copied()
            .ok_or_else(|| HalopackError::UnknownColumn(name.to_string()))
    }
}

/// Per-block metadata gathered while walking the file at open time.
#[derive(Debug, Clone)]
pub struct BlockMeta {
    pub rows: i64,
    pub tags: Vec<ColumnTag>,
    pub keys: Vec<i64>,
    /// Byte offset of the first column payload of this block.
    pub payload_offset: u64,
}

impl BlockMeta {
    /// Byte offset of column `col`'s payload within this block's data,
    /// skipping the payloads skipped columns never wrote.
    pub fn column_offset(&self, col: usize, skipped: &[u8]) -> u64 {
        let mut stride = 0usize;
        for j in 0..col {
            if skipped[j] == 0 {
                stride += self.tags[j].size();
            }
        }
        self.payload_offset + self.rows as u64 * stride as u64
    }

    /// Total payload bytes of this block.
    pub fn payload_len(&self, skipped: &[u8]) -> u64 {
        let stride: usize = self
            .tags
            .iter()
            .zip(skipped)
            .filter(|(_, &s)| s == 0)
            .map(|(t, _)| t.size())
            .sum();
        self.rows as u64 * stride as u64
    }
}
