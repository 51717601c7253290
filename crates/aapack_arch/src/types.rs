//! Structural elements of a cluster template: site types, BELs, BEL pins and
//! the connections between them.

use crate::ids::BelId;
use aapack_common::Ident;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The variant of a physical site inside a cluster template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SiteType {
    /// Logic slice with plain LUTs.
    Slicel,
    /// Logic slice whose LUTs also work as distributed RAM and shift registers.
    Slicem,
    /// I/O block.
    Iob,
    /// Block RAM site.
    Bram,
    /// DSP site.
    Dsp,
}

impl SiteType {
    /// Returns the device name of this site type.
    pub fn as_str(self) -> &'static str {
        match self {
            SiteType::Slicel => "SLICEL",
            SiteType::Slicem => "SLICEM",
            SiteType::Iob => "IOB",
            SiteType::Bram => "BRAM",
            SiteType::Dsp => "DSP",
        }
    }

    /// Parses a device site type name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "SLICEL" => Some(SiteType::Slicel),
            "SLICEM" => Some(SiteType::Slicem),
            "IOB" => Some(SiteType::Iob),
            "BRAM" => Some(SiteType::Bram),
            "DSP" => Some(SiteType::Dsp),
            _ => None,
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A BEL identified by site type and name, independent of any template.
///
/// Library anchors and the BEL cost table are keyed by `BelKind`; displayed
/// and parsed as `SITE/BEL`, e.g. `SLICEM/D6LUT`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BelKind {
    /// Site variant that holds the BEL.
    pub site_type: SiteType,
    /// BEL name within the site (`A6LUT`, `CARRY4`, `AFF`, ...).
    pub name: String,
}

impl BelKind {
    /// Creates a BEL kind.
    pub fn new(site_type: SiteType, name: impl Into<String>) -> Self {
        Self {
            site_type,
            name: name.into(),
        }
    }

    /// Parses the `SITE/BEL` form.
    pub fn parse(text: &str) -> Option<Self> {
        let (site, bel) = text.split_once('/')?;
        if bel.is_empty() {
            return None;
        }
        Some(Self::new(SiteType::parse(site)?, bel))
    }
}

impl fmt::Display for BelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site_type, self.name)
    }
}

/// Direction of a cell or BEL pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinDirection {
    /// Signal flows into the element.
    Input,
    /// Signal flows out of the element.
    Output,
}

/// A 5- or 6-input LUT position inside a slice, parsed from names like `C5LUT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LutSlot {
    /// Column letter, `A` to `D`.
    pub letter: char,
    /// LUT size, 5 or 6.
    pub size: u8,
}

impl LutSlot {
    /// Parses `[A-D][56]LUT`.
    pub fn parse(name: &str) -> Option<Self> {
        let bytes = name.as_bytes();
        if bytes.len() != 5 || name.get(2..) != Some("LUT") {
            return None;
        }
        let letter = bytes[0] as char;
        let size = match bytes[1] {
            b'5' => 5,
            b'6' => 6,
            _ => return None,
        };
        matches!(letter, 'A'..='D').then_some(Self { letter, size })
    }

    /// Name of the other half of this LUT pair (`A6LUT` for `A5LUT`).
    pub fn partner_name(self) -> String {
        format!("{}{}LUT", self.letter, 11 - self.size)
    }
}

/// A basic element of logic inside a cluster template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bel {
    /// ID within the owning template.
    pub id: BelId,
    /// Site type and BEL name.
    pub kind: BelKind,
    /// Index of the site within the cluster (templates may span several sites).
    pub site_index: u32,
    /// Output pin names.
    pub sources: Vec<Ident>,
    /// Input pin names.
    pub sinks: Vec<Ident>,
}

impl Bel {
    /// The BEL name within its site.
    pub fn name(&self) -> &str {
        &self.kind.name
    }

    /// Site variant holding the BEL.
    pub fn site_type(&self) -> SiteType {
        self.kind.site_type
    }

    /// Number of pins, used as a complexity tie-break.
    pub fn pin_count(&self) -> usize {
        self.sources.len() + self.sinks.len()
    }

    /// Direction of the named pin, if the BEL has it.
    pub fn pin_direction(&self, pin: Ident) -> Option<PinDirection> {
        if self.sources.contains(&pin) {
            Some(PinDirection::Output)
        } else if self.sinks.contains(&pin) {
            Some(PinDirection::Input)
        } else {
            None
        }
    }

    /// LUT position, when this BEL is one half of a slice LUT pair.
    pub fn lut_slot(&self) -> Option<LutSlot> {
        LutSlot::parse(&self.kind.name)
    }
}

/// A pin on a specific BEL of a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BelPinRef {
    /// The BEL.
    pub bel: BelId,
    /// Pin name on the BEL.
    pub pin: Ident,
}

impl BelPinRef {
    /// Creates a BEL pin reference.
    pub fn new(bel: BelId, pin: Ident) -> Self {
        Self { bel, pin }
    }
}

/// One routable connection between two BEL pins of the same template.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClusterConnection {
    /// The pin at the far end of the connection.
    pub pin: BelPinRef,
    /// `false` when the route leaves the site through general interconnect.
    pub within_site: bool,
    /// Number of PIPs on the route.
    pub distance: u32,
}

/// A dedicated connection that leaves the cluster to a neighbouring one
/// (carry chains, cascades).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectConnection {
    /// Pin on this template's BEL.
    pub cluster_pin: BelPinRef,
    /// BEL kind at the far end.
    pub end_bel: BelKind,
    /// Pin name at the far end.
    pub end_pin: Ident,
    /// Site index of the far BEL within its own cluster.
    pub end_site_index: u32,
    /// Tile offset of the far cluster; `None` for connections that do not
    /// leave the tile.
    pub end_tile_offset: Option<i32>,
}
