//! Shared foundational types used across the AAPack packing engine.
//!
//! This crate provides interned pin identifiers, the dense ID-indexed
//! [`Arena`] used for every netlist and device table, and the common
//! internal-error result type.

#![warn(missing_docs)]

pub mod arena;
pub mod ident;
pub mod result;

pub use arena::{Arena, ArenaId};
pub use ident::{Ident, Interner};
pub use result::{InternalError, PackResult};
