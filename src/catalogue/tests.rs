//! End-to-end catalogue scenarios: write a small two-block table through
//! the full pipeline and read it back every way the reader allows.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::config::CatalogueConfig;
use crate::error::HalopackError;

use super::reader::CatalogueReader;
use super::source::{MemoryBlock, MemoryBlockSource, MemoryColumn};
use super::writer::write_catalogue;

const RAW_HEADER: &str = "# Header line 1....\n# Header line 2....\n# Header line 3....\n";

fn test_config() -> CatalogueConfig {
    CatalogueConfig {
        particle_mass: 5e7,
        min_particles: 200,
        columns: 4,
        mass_column: 1,
        header_lines: 3,
        column_info: vec![
            "id : int".to_string(),
            "mvir : log : 0.01".to_string(),
            "m200m : log : 0.01".to_string(),
            "x : float : 1.0".to_string(),
        ],
        skip_columns: vec!["m200m".to_string()],
        sort: false,
    }
}

/// The 4-row, 4-column table split into blocks of 1 and 3 rows.
fn test_source() -> MemoryBlockSource {
    let block0 = MemoryBlock {
        columns: vec![
            MemoryColumn::Int(vec![0]),
            MemoryColumn::Float(vec![1e12]),
            MemoryColumn::Float(vec![2e12]),
            MemoryColumn::Float(vec![150.0]),
        ],
    };
    let block1 = MemoryBlock {
        columns: vec![
            MemoryColumn::Int(vec![1, 2, 3]),
            MemoryColumn::Float(vec![1e10, 1e11, 1e13]),
            MemoryColumn::Float(vec![2e10, 2e11, 2e13]),
            MemoryColumn::Float(vec![125.0, 130.0, 100.0]),
        ],
    };
    MemoryBlockSource::new(RAW_HEADER, vec![block0, block1])
}

fn write_test_file(dir: &TempDir, config: &CatalogueConfig) -> PathBuf {
    let path = dir.path().join("catalogue.bin");
    let mut source = test_source();
    write_catalogue(&mut source, &path, config).unwrap();
    path
}

fn assert_within(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        assert!((g - w).abs() <= tol, "{} vs {} (tol {})", g, w, tol);
    }
}

fn assert_log_within(got: &[f64], want: &[f64], tol: f64) {
    assert_eq!(got.len(), want.len());
    for (g, w) in got.iter().zip(want) {
        assert!(
            (g.log10() - w.log10()).abs() <= tol,
            "log10({}) vs log10({}) (tol {})",
            g,
            w,
            tol
        );
    }
}

#[test]
fn test_header_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());
    let reader = CatalogueReader::open(&path).unwrap();

    assert_eq!(reader.blocks(), 2);
    assert_eq!(reader.rows(), 4);
    assert_eq!(reader.block_rows(0), 1);
    assert_eq!(reader.block_rows(1), 3);
    assert_eq!(reader.names(), ["id", "mvir", "m200m", "x"]);
    assert_eq!(reader.raw_header(), RAW_HEADER.as_bytes());
    assert_eq!(reader.min_mass(), 1e10);
    assert_eq!(reader.delta(1), 0.01);
    assert_eq!(reader.delta(3), 1.0);
    assert!(reader.is_skipped(2));
    assert!(!reader.is_skipped(1));
    assert!(reader.is_int(0).unwrap());
    assert!(!reader.is_int(3).unwrap());
}

#[test]
fn test_read_whole_columns() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());
    let mut reader = CatalogueReader::open(&path).unwrap();

    let mut ints = Vec::new();
    reader.read_ints_by_name(&["id"], &mut ints).unwrap();
    assert_eq!(ints[0], vec![0, 1, 2, 3]);

    let mut floats = Vec::new();
    reader
        .read_floats_by_name(&["mvir", "x"], &mut floats)
        .unwrap();
    assert_log_within(&floats[0], &[1e12, 1e10, 1e11, 1e13], 0.01);
    assert_within(&floats[1], &[150.0, 125.0, 130.0, 100.0], 1.0);
}

#[test]
fn test_read_single_blocks() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());
    let mut reader = CatalogueReader::open(&path).unwrap();

    let mut floats = Vec::new();
    reader
        .read_float_block(&[3, 1], 0, &mut floats)
        .unwrap();
    assert_within(&floats[0], &[150.0], 1.0);
    assert_log_within(&floats[1], &[1e12], 0.01);

    reader
        .read_float_block(&[3, 1], 1, &mut floats)
        .unwrap();
    assert_within(&floats[0], &[125.0, 130.0, 100.0], 1.0);
    assert_log_within(&floats[1], &[1e10, 1e11, 1e13], 0.01);

    let mut ints = Vec::new();
    reader.read_int_block(&[0], 1, &mut ints).unwrap();
    assert_eq!(ints[0], vec![1, 2, 3]);
}

#[test]
fn test_f32_reads_match_f64_reads() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());
    let mut reader = CatalogueReader::open(&path).unwrap();

    let mut wide = Vec::new();
    reader.read_floats_by_name(&["x"], &mut wide).unwrap();
    let mut narrow = Vec::new();
    reader.read_floats_f32_by_name(&["x"], &mut narrow).unwrap();

    for (w, n) in wide[0].iter().zip(&narrow[0]) {
        assert_eq!(*n, *w as f32);
    }
}

#[test]
fn test_schema_errors_leave_reader_usable() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());
    let mut reader = CatalogueReader::open(&path).unwrap();

    let mut floats = Vec::new();
    assert!(matches!(
        reader.read_floats_by_name(&["m200m"], &mut floats),
        Err(HalopackError::SkippedColumnRead(2))
    ));
    assert!(matches!(
        reader.read_floats_by_name(&["id"], &mut floats),
        Err(HalopackError::ColumnTypeMismatch { column: 0, .. })
    ));
    assert!(matches!(
        reader.read_floats_by_name(&["rs"], &mut floats),
        Err(HalopackError::UnknownColumn(_))
    ));
    let mut ints = Vec::new();
    assert!(matches!(
        reader.read_ints_by_name(&["x"], &mut ints),
        Err(HalopackError::ColumnTypeMismatch { column: 3, .. })
    ));

    // The failed queries must not have poisoned anything.
    reader.read_floats_by_name(&["mvir"], &mut floats).unwrap();
    assert_log_within(&floats[0], &[1e12, 1e10, 1e11, 1e13], 0.01);
}

#[test]
fn test_decode_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());

    let mut first = Vec::new();
    CatalogueReader::open(&path)
        .unwrap()
        .read_floats_by_name(&["mvir", "x"], &mut first)
        .unwrap();

    let mut second = Vec::new();
    let mut reader = CatalogueReader::open(&path).unwrap();
    // Different access order, same sub-streams.
    reader.read_floats_by_name(&["x"], &mut second).unwrap();
    let x_alone = second[0].clone();
    reader
        .read_floats_by_name(&["mvir", "x"], &mut second)
        .unwrap();

    assert_eq!(first[0], second[0]);
    assert_eq!(first[1], second[1]);
    assert_eq!(first[1], x_alone);
}

#[test]
fn test_mass_cut_drops_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalogue.bin");

    let block = MemoryBlock {
        columns: vec![
            MemoryColumn::Int(vec![0, 1, 2]),
            MemoryColumn::Float(vec![1e12, 1e9, 1e11]),
            MemoryColumn::Float(vec![2e12, 2e9, 2e11]),
            MemoryColumn::Float(vec![10.0, 20.0, 30.0]),
        ],
    };
    let mut source = MemoryBlockSource::new("", vec![block]);
    write_catalogue(&mut source, &path, &test_config()).unwrap();

    let mut reader = CatalogueReader::open(&path).unwrap();
    assert_eq!(reader.rows(), 2);

    let mut ints = Vec::new();
    reader.read_ints_by_name(&["id"], &mut ints).unwrap();
    assert_eq!(ints[0], vec![0, 2]);
}

#[test]
fn test_sort_orders_blocks_by_descending_mass() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.sort = true;
    let path = write_test_file(&dir, &config);

    let mut reader = CatalogueReader::open(&path).unwrap();
    let mut ints = Vec::new();
    reader.read_ints_by_name(&["id"], &mut ints).unwrap();
    // Block 0 is a single row; block 1 masses are {1e10, 1e11, 1e13}.
    assert_eq!(ints[0], vec![0, 3, 2, 1]);

    let mut floats = Vec::new();
    reader.read_floats_by_name(&["x"], &mut floats).unwrap();
    assert_within(&floats[0], &[150.0, 100.0, 130.0, 125.0], 1.0);
}

#[test]
fn test_version_mismatch_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = write_test_file(&dir, &test_config());

    let mut bytes = std::fs::read(&path).unwrap();
    bytes[0] = 2; // version 3 -> 2 in the little-endian header field
    std::fs::write(&path, &bytes).unwrap();

    assert!(matches!(
        CatalogueReader::open(&path),
        Err(HalopackError::VersionMismatch {
            expected: 3,
            found: 2
        })
    ));
}
