//! The device as seen by the packer: the set of cluster templates.

use crate::ids::TemplateId;
use crate::template::ClusterTemplate;
use crate::types::{BelKind, BelPinRef};
use aapack_common::{Arena, Ident};

/// A device described by its placeable cluster types.
#[derive(Debug, Default)]
pub struct Device {
    /// Part name.
    pub name: String,
    templates: Arena<TemplateId, ClusterTemplate>,
}

impl Device {
    /// Creates a device with no templates.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            templates: Arena::new(),
        }
    }

    /// Adds a template and returns its ID.
    pub fn add_template(&mut self, mut template: ClusterTemplate) -> TemplateId {
        let id = self.templates.next_id();
        template.id = id;
        self.templates.alloc(template)
    }

    /// Returns the template with the given ID.
    pub fn template(&self, id: TemplateId) -> &ClusterTemplate {
        &self.templates[id]
    }

    /// Iterates over all templates in ID order.
    pub fn templates(&self) -> impl Iterator<Item = &ClusterTemplate> {
        self.templates.values()
    }

    /// Returns `true` if pin `pin` of any BEL of `kind`, in any template,
    /// connects to general interconnect.
    pub fn kind_pin_uses_fabric(&self, kind: &BelKind, pin: Ident) -> bool {
        self.templates().any(|t| {
            t.bels_of_kind(kind)
                .any(|bel| t.uses_fabric(BelPinRef::new(bel, pin)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SiteType;
    use aapack_common::Interner;

    #[test]
    fn templates_get_sequential_ids() {
        let mut device = Device::new("xc7a35t");
        let a = device.add_template(ClusterTemplate::new("SLICEL_TILE", 100));
        let b = device.add_template(ClusterTemplate::new("SLICEM_TILE", 50));
        assert_eq!(device.template(a).name, "SLICEL_TILE");
        assert_eq!(device.template(b).id, b);
        assert_eq!(device.templates().map(|t| t.instances).sum::<u32>(), 150);
    }

    #[test]
    fn fabric_lookup_by_kind_spans_templates() {
        let interner = Interner::new();
        let o6 = interner.get_or_intern("O6");
        let kind = BelKind::new(SiteType::Slicem, "A6LUT");
        let mut plain = ClusterTemplate::new("SLICEL_TILE", 1);
        plain.add_bel(BelKind::new(SiteType::Slicel, "A6LUT"), 0, vec![o6], vec![]);
        let mut ram = ClusterTemplate::new("SLICEM_TILE", 1);
        let lut = ram.add_bel(kind.clone(), 0, vec![o6], vec![]);
        ram.add_fabric_pin(BelPinRef::new(lut, o6));

        let mut device = Device::new("xc7a35t");
        device.add_template(plain);
        assert!(!device.kind_pin_uses_fabric(&kind, o6));
        device.add_template(ram);
        assert!(device.kind_pin_uses_fabric(&kind, o6));
        assert!(!device.kind_pin_uses_fabric(&BelKind::new(SiteType::Slicel, "A6LUT"), o6));
    }
}
