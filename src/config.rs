//! The catalogue ingest configuration: an options bag describing the
//! source table, which columns to keep, and the per-column tolerance.
//!
//! Column annotations use the `"name : kind [: delta]"` form with
//! `kind` one of `int`, `float` or `log` and `delta` defaulting to 0
//! (no quantization). Names are lower-cased and trimmed everywhere, so
//! lookups are case-insensitive.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HalopackError, Result};
use crate::types::ColumnKind;

fn default_min_particles() -> i64 {
    200
}

/// Options controlling a catalogue conversion.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CatalogueConfig {
    /// Mass of a single simulation particle.
    pub particle_mass: f64,

    /// Rows below `min_particles * particle_mass` are cut.
    #[serde(default = "default_min_particles")]
    pub min_particles: i64,

    /// Number of columns in the source table.
    pub columns: i64,

    /// Index of the column holding halo masses. Must be a float or log
    /// column; it drives the mass cut and the optional within-block
    /// ordering.
    pub mass_column: i64,

    /// Number of raw-text header lines copied verbatim into the output.
    #[serde(default)]
    pub header_lines: i64,

    /// One `"name : kind [: delta]"` annotation per column.
    pub column_info: Vec<String>,

    /// Names of columns whose payloads are omitted from the output.
    #[serde(default)]
    pub skip_columns: Vec<String>,

    /// Order each block's surviving rows by descending mass.
    #[serde(default)]
    pub sort: bool,
}

/// One parsed column annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub delta: f64,
}

impl CatalogueConfig {
    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: CatalogueConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| HalopackError::ConfigInvalid(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Parses and validates the column annotations together with the
    /// scalar options. All `ConfigInvalid` cases surface here, before
    /// any file is touched.
    pub fn column_specs(&self) -> Result<Vec<ColumnSpec>> {
        if self.particle_mass < 0.0 {
            return Err(HalopackError::ConfigInvalid(
                "particleMass not given".to_string(),
            ));
        }
        if self.columns < 0 {
            return Err(HalopackError::ConfigInvalid("columns not given".to_string()));
        }
        if self.mass_column < 0 {
            return Err(HalopackError::ConfigInvalid(
                "massColumn not given".to_string(),
            ));
        }
        if self.min_particles < 0 {
            return Err(HalopackError::ConfigInvalid(format!(
                "minParticles = {} must not be negative",
                self.min_particles
            )));
        }
        if self.header_lines < 0 {
            return Err(HalopackError::ConfigInvalid(format!(
                "headerLines = {} must not be negative",
                self.header_lines
            )));
        }
        if self.column_info.len() != self.columns as usize {
            return Err(HalopackError::ConfigInvalid(format!(
                "columns = {}, but columnInfo has {} entries",
                self.columns,
                self.column_info.len()
            )));
        }

        let specs = self
            .column_info
            .iter()
            .map(|info| parse_column_info(info))
            .collect::<Result<Vec<_>>>()?;

        let mass_column = self.mass_column as usize;
        if mass_column >= specs.len() {
            return Err(HalopackError::ConfigInvalid(format!(
                "massColumn = {} is out of range for {} columns",
                mass_column,
                specs.len()
            )));
        }
        if specs[mass_column].kind == ColumnKind::Int {
            return Err(HalopackError::ConfigInvalid(format!(
                "massColumn = {} ('{}') must be a float or log column",
                mass_column, specs[mass_column].name
            )));
        }

        for skip in &self.skip_columns {
            let name = skip.trim().to_lowercase();
            if !specs.iter().any(|s| s.name == name) {
                return Err(HalopackError::ConfigInvalid(format!(
                    "skipColumns entry '{}' is not a column name",
                    skip
                )));
            }
            if name == specs[mass_column].name {
                return Err(HalopackError::ConfigInvalid(format!(
                    "the mass column '{}' cannot be skipped",
                    name
                )));
            }
        }

        Ok(specs)
    }

    /// The mass threshold written into the header.
    pub fn min_mass(&self) -> f64 {
        self.min_particles as f64 * self.particle_mass
    }

    /// The skip flag for each column, in column order.
    pub fn skip_flags(&self, specs: &[ColumnSpec]) -> Vec<u8> {
        let skipped: Vec<String> = self
            .skip_columns
            .iter()
            .map(|s| s.trim().to_lowercase())
            .collect();
        specs
            .iter()
            .map(|s| u8::from(skipped.contains(&s.name)))
            .collect()
    }
}

fn parse_column_info(info: &str) -> Result<ColumnSpec> {
    let tokens: Vec<&str> = info.split(':').collect();
    match tokens.len() {
        2 | 3 => {
            let name = tokens[0].trim().to_lowercase();
            if name.is_empty() {
                return Err(HalopackError::ConfigInvalid(format!(
                    "column '{}' has an empty name",
                    info
                )));
            }
            let kind = ColumnKind::parse(&tokens[1].trim().to_lowercase())?;
            let delta = if tokens.len() == 3 {
                tokens[2].trim().parse::<f64>().map_err(|e| {
                    HalopackError::ConfigInvalid(format!("column '{}': {}", info, e))
                })?
            } else {
                0.0
            };
            Ok(ColumnSpec { name, kind, delta })
        }
        0 | 1 => Err(HalopackError::ConfigInvalid(format!(
            "column '{}' not given a kind",
            info
        ))),
        _ => Err(HalopackError::ConfigInvalid(format!(
            "column '{}' has too many annotations",
            info
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> CatalogueConfig {
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

    #[test]
    fn test_column_info_parsing() {
        let specs = base_config().column_specs().unwrap();
        assert_eq!(
            specs,
            vec![
                ColumnSpec {
                    name: "id".to_string(),
                    kind: ColumnKind::Int,
                    delta: 0.0
                },
                ColumnSpec {
                    name: "mvir".to_string(),
                    kind: ColumnKind::LogFloat,
                    delta: 0.01
                },
                ColumnSpec {
                    name: "m200m".to_string(),
                    kind: ColumnKind::LogFloat,
                    delta: 0.01
                },
                ColumnSpec {
                    name: "x".to_string(),
                    kind: ColumnKind::Float,
                    delta: 1.0
                },
            ]
        );
    }

    #[test]
    fn test_names_are_lowercased_and_trimmed() {
        let spec = parse_column_info(" Mvir : Log : 2.0 ").unwrap();
        assert_eq!(spec.name, "mvir");
        assert_eq!(spec.kind, ColumnKind::LogFloat);
        assert_eq!(spec.delta, 2.0);
    }

    #[test]
    fn test_missing_kind_is_rejected() {
        assert!(parse_column_info("mvir").is_err());
        assert!(parse_column_info("mvir : log : 0.1 : extra").is_err());
        assert!(parse_column_info("mvir : complex").is_err());
    }

    #[test]
    fn test_required_options() {
        let mut config = base_config();
        config.particle_mass = -1.0;
        assert!(config.column_specs().is_err());

        let mut config = base_config();
        config.mass_column = -1;
        assert!(config.column_specs().is_err());

        let mut config = base_config();
        config.columns = 3;
        assert!(config.column_specs().is_err());
    }

    #[test]
    fn test_mass_column_must_be_float() {
        let mut config = base_config();
        config.mass_column = 0;
        assert!(config.column_specs().is_err());
    }

    #[test]
    fn test_unknown_skip_column_is_rejected() {
        let mut config = base_config();
        config.skip_columns = vec!["rs".to_string()];
        assert!(config.column_specs().is_err());
    }

    #[test]
    fn test_skip_flags() {
        let config = base_config();
        let specs = config.column_specs().unwrap();
        assert_eq!(config.skip_flags(&specs), vec![0, 0, 1, 0]);
    }

    #[test]
    fn test_min_mass() {
        assert_eq!(base_config().min_mass(), 200.0 * 5e7);
    }

    #[test]
    fn test_json_round_trip() {
        let config = base_config();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("particleMass"));
        let back: CatalogueConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.columns, 4);
        assert_eq!(back.mass_column, 1);
        assert_eq!(back.skip_columns, vec!["m200m".to_string()]);
    }
}
