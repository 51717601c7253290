//! Opaque ID newtypes for packing netlist entities.
//!
//! Each ID is a thin `u32` wrapper indexing into an [`Arena`](aapack_common::Arena)
//! owned by [`PackDesign`](crate::PackDesign).

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
    /// ID of a cell in the packing netlist.
    CellId
);

define_id!(
    /// ID of a cell pin.
    PinId
);

define_id!(
    /// ID of a net.
    NetId
);

define_id!(
    /// ID of a cluster. Candidate clusters receive the ID they will have once
    /// committed.
    ClusterId
);

define_id!(
    /// ID of a carry chain.
    CarryChainId
);

define_id!(
    /// ID of a carry-chain group (chains merged across clusters).
    CarryGroupId
);
