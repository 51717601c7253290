//! Device calibration table of base placement costs per (cell type, BEL).
//!
//! The file format is TOML:
//!
//! ```toml
//! [costs.LUT6]
//! "SLICEL/A6LUT" = 0.5
//! "SLICEM/A6LUT" = 0.75
//! ```

use crate::types::BelKind;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Errors raised while loading a BEL cost table.
#[derive(Debug, thiserror::Error)]
pub enum CostTableError {
    /// The file could not be read.
    #[error("failed to read BEL cost table: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML content could not be parsed.
    #[error("failed to parse BEL cost table: {0}")]
    Parse(String),

    /// An entry key is not of the form `SITE/BEL`.
    #[error("invalid BEL '{bel}' for cell type '{cell}'")]
    InvalidBel {
        /// Library cell type of the entry.
        cell: String,
        /// The offending key.
        bel: String,
    },
}

#[derive(Deserialize)]
struct CostTableFile {
    #[serde(default)]
    costs: BTreeMap<String, BTreeMap<String, f64>>,
}

/// Base cost of placing a library cell type on a BEL kind.
#[derive(Debug, Clone, Default)]
pub struct BelCostTable {
    costs: HashMap<String, HashMap<BelKind, f64>>,
}

impl BelCostTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads and parses a cost table file.
    pub fn load(path: &Path) -> Result<Self, CostTableError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses a cost table from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, CostTableError> {
        let file: CostTableFile =
            toml::from_str(content).map_err(|e| CostTableError::Parse(e.to_string()))?;
        let mut table = Self::new();
        for (cell, entries) in file.costs {
            for (bel, cost) in entries {
                let kind = BelKind::parse(&bel).ok_or_else(|| CostTableError::InvalidBel {
                    cell: cell.clone(),
                    bel: bel.clone(),
                })?;
                table.insert(&cell, kind, cost);
            }
        }
        Ok(table)
    }

    /// Sets the cost of placing `cell_type` on `bel`.
    pub fn insert(&mut self, cell_type: &str, bel: BelKind, cost: f64) {
        self.costs
            .entry(cell_type.to_string())
            .or_default()
            .insert(bel, cost);
    }

    /// Returns the base cost, or `None` if the pair is not calibrated.
    pub fn get(&self, cell_type: &str, bel: &BelKind) -> Option<f64> {
        self.costs.get(cell_type)?.get(bel).copied()
    }

    /// Number of calibrated pairs.
    pub fn len(&self) -> usize {
        self.costs.values().map(HashMap::len).sum()
    }

    /// Returns `true` if nothing is calibrated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteType;

    const TABLE: &str = r#"
[costs.LUT6]
"SLICEL/A6LUT" = 0.5
"SLICEM/A6LUT" = 0.75

[costs.CARRY4]
"SLICEL/CARRY4" = 1.0
"#;

    #[test]
    fn parse_table() {
        let table = BelCostTable::from_toml_str(TABLE).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(
            table.get("LUT6", &BelKind::new(SiteType::Slicem, "A6LUT")),
            Some(0.75)
        );
        assert_eq!(
            table.get("LUT6", &BelKind::new(SiteType::Slicel, "B6LUT")),
            None
        );
        assert_eq!(
            table.get("FF_INIT", &BelKind::new(SiteType::Slicel, "AFF")),
            None
        );
    }

    #[test]
    fn invalid_bel_key() {
        let err = BelCostTable::from_toml_str("[costs.LUT6]\nA6LUT = 1.0\n").unwrap_err();
        assert!(matches!(err, CostTableError::InvalidBel { ref bel, .. } if bel == "A6LUT"));
    }

    #[test]
    fn malformed_toml() {
        let err = BelCostTable::from_toml_str("[costs.LUT6\n").unwrap_err();
        assert!(matches!(err, CostTableError::Parse(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("costs.toml");
        std::fs::write(&path, TABLE).unwrap();
        let table = BelCostTable::load(&path).unwrap();
        assert!(!table.is_empty());
        assert!(matches!(
            BelCostTable::load(&dir.path().join("missing.toml")).unwrap_err(),
            CostTableError::Io(_)
        ));
    }
}
