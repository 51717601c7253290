//! Summary of a packing run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// What a call to [`Packer::pack`](crate::Packer::pack) produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackReport {
    /// Number of clusters committed.
    pub clusters: usize,
    /// Number of cells placed into clusters.
    pub packed_cells: usize,
    /// Cells excluded from packing up front.
    pub unpackable_cells: Vec<String>,
    /// Packable cells still unclustered when packing stopped.
    pub unpacked_cells: Vec<String>,
    /// Committed clusters per template name.
    pub clusters_per_template: BTreeMap<String, usize>,
}

impl PackReport {
    /// Returns `true` if every packable cell ended up in a cluster.
    pub fn is_complete(&self) -> bool {
        self.unpacked_cells.is_empty()
    }
}

impl fmt::Display for PackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packed {} cells into {} clusters",
            self.packed_cells, self.clusters
        )?;
        if !self.unpackable_cells.is_empty() {
            write!(f, ", {} unpackable", self.unpackable_cells.len())?;
        }
        if !self.unpacked_cells.is_empty() {
            write!(f, ", {} left unpacked", self.unpacked_cells.len())?;
        }
        Ok(())
    }
}
