//! The row-producer seam of the catalogue writer.
//!
//! Text tokenizers and other external readers deliver rows in blocks of
//! pre-split integer and float column groups. The writer only depends on
//! this trait, so any producer that can enumerate blocks works; the
//! in-memory implementation below serves tests and embedding callers
//! that already hold their table in RAM.

use crate::error::{HalopackError, Result};

/// A producer of blocked tabular data.
///
/// Column indices refer to the full table, in declaration order; the
/// writer asks for the integer and float column groups separately. `out`
/// is resized to `cols.len()` vectors of the block's row count; vectors
/// are reused across calls.
pub trait BlockSource {
    /// Number of blocks the producer will deliver.
    fn blocks(&self) -> usize;

    /// The raw text header copied verbatim into the output file.
    fn raw_header(&self) -> &[u8];

    /// Reads the given integer columns of one block.
    fn read_int_block(
        &mut self,
        cols: &[usize],
        block: usize,
        out: &mut Vec<Vec<i64>>,
    ) -> Result<()>;

    /// Reads the given float columns of one block.
    fn read_float_block(
        &mut self,
        cols: &[usize],
        block: usize,
        out: &mut Vec<Vec<f64>>,
    ) -> Result<()>;
}

/// One column of an in-memory block.
#[derive(Debug, Clone)]
pub enum MemoryColumn {
    Int(Vec<i64>),
    Float(Vec<f64>),
}

/// One in-memory block: every column of the table, in column order.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlock {
    pub columns: Vec<MemoryColumn>,
}

/// A `BlockSource` over data already in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockSource {
    raw_header: Vec<u8>,
    blocks: Vec<MemoryBlock>,
}

impl MemoryBlockSource {
    pub fn new(raw_header: impl Into<Vec<u8>>, blocks: Vec<MemoryBlock>) -> Self {
        MemoryBlockSource {
            raw_header: raw_header.into(),
            blocks,
        }
    }

    fn block(&self, block: usize) -> Result<&MemoryBlock> {
        self.blocks.get(block).ok_or_else(|| {
            HalopackError::InvalidArgument(format!(
                "block {} out of range for {} blocks",
                block,
                self.blocks.len()
            ))
        })
    }
}

impl BlockSource for MemoryBlockSource {
    fn blocks(&self) -> usize {
        self.blocks.len()
    }

    fn raw_header(&self) -> &[u8] {
        &self.raw_header
    }

    fn read_int_block(
        &mut self,
        cols: &[usize],
        block: usize,
        out: &mut Vec<Vec<i64>>,
    ) -> Result<()> {
        let data = &self.block(block)?.columns;
        out.resize(cols.len(), Vec::new());
        for (slot, &col) in out.iter_mut().zip(cols) {
            match data.get(col) {
                Some(MemoryColumn::Int(values)) => {
                    slot.clear();
                    slot.extend_from_slice(values);
                }
                Some(MemoryColumn::Float(_)) => {
                    return Err(HalopackError::ColumnTypeMismatch {
                        column: col,
                        stored: "float",
                        requested: "integer",
                    })
                }
                None => {
                    return Err(HalopackError::InvalidArgument(format!(
                        "column {} out of range",
                        col
                    )))
                }
            }
        }
        Ok(())
    }

    fn read_float_block(
        &mut self,
        cols: &[usize],
        block: usize,
        out: &mut Vec<Vec<f64>>,
    ) -> Result<()> {
        let data = &self.block(block)?.columns;
        out.resize(cols.len(), Vec::new());
        for (slot, &col) in out.iter_mut().zip(cols) {
            match data.get(col) {
                Some(MemoryColumn::Float(values)) => {
                    slot.clear();
                    slot.extend_from_slice(values);
                }
                Some(MemoryColumn::Int(_)) => {
                    return Err(HalopackError::ColumnTypeMismatch {
                        column: col,
                        stored: "integer",
                        requested: "float",
                    })
                }
                None => {
                    return Err(HalopackError::InvalidArgument(format!(
                        "column {} out of range",
                        col
                    )))
                }
            }
        }
        Ok(())
    }
}
