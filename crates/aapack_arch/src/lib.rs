//! Device and cell-library model consumed by the AAPack packer.
//!
//! A [`Device`] is a set of [`ClusterTemplate`]s, each describing the BELs of
//! one placeable cluster type, the intra-cluster connections between BEL pins
//! (with site-crossing flag and PIP distance) and the direct connections to
//! neighbouring clusters. A [`CellLibrary`] says which BELs each primitive
//! cell type may occupy, and a [`BelCostTable`] holds the device-calibrated
//! base cost of each (cell type, BEL) pairing.

#![warn(missing_docs)]

pub mod cost_table;
pub mod device;
pub mod ids;
pub mod library;
pub mod template;
pub mod types;

pub use cost_table::{BelCostTable, CostTableError};
pub use device::Device;
pub use ids::{BelId, LibCellId, TemplateId};
pub use library::{CellLibrary, LibraryCell};
pub use template::ClusterTemplate;
pub use types::{
    Bel, BelKind, BelPinRef, ClusterConnection, DirectConnection, LutSlot, PinDirection, SiteType,
};
