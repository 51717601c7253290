//! Opaque ID newtypes for device and library entities.
//!
//! Each ID is a thin `u32` wrapper that is `Copy`, ordered, and usable as an
//! [`ArenaId`]. BEL IDs are local to their [`ClusterTemplate`](crate::ClusterTemplate).

use aapack_common::ArenaId;
use serde::{Deserialize, Serialize};

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
        pub struct $name(u32);

        impl $name {
            /// Creates an ID from a raw `u32` index.
            pub fn from_raw(index: u32) -> Self {
                Self(index)
            }

            /// Returns the raw `u32` index.
            pub fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl ArenaId for $name {
            fn from_raw(index: u32) -> Self {
                Self(index)
            }

            fn as_raw(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// ID of a cluster template in a [`Device`](crate::Device).
    TemplateId
);

define_id!(
    /// ID of a BEL within one cluster template.
    BelId
);

define_id!(
    /// ID of a library cell type in a [`CellLibrary`](crate::CellLibrary).
    LibCellId
);
