use std::rc::Rc;

use orchard_mem::BusTarget;
use orchard_types::{Addr, DeviceId, PagePerms, RegionTag, TargetCaps, PAGE_MASK, PAGE_SHIFT};

use crate::PageEntry;

/// A named, prioritised overlay. Activation toggles whether its mappings
/// participate in effective-mapping resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingLayer {
    pub name: String,
    pub priority: i32,
    pub active: bool,
}

/// One overlay mapping on a layer. Base and size are page-multiples.
#[derive(Clone)]
pub struct LayeredMapping {
    pub virtual_base: Addr,
    pub size: Addr,
    pub layer: String,
    pub device_id: DeviceId,
    pub region: RegionTag,
    pub perms: PagePerms,
    pub caps: TargetCaps,
    pub target: Rc<dyn BusTarget>,
    pub phys_base: Addr,
}

impl LayeredMapping {
    pub fn virtual_end(&self) -> Addr {
        self.virtual_base + self.size
    }

    pub fn contains(&self, addr: Addr) -> bool {
        addr >= self.virtual_base && addr < self.virtual_end()
    }

    pub fn first_page(&self) -> usize {
        (self.virtual_base >> PAGE_SHIFT) as usize
    }

    pub fn page_count(&self) -> usize {
        (self.size >> PAGE_SHIFT) as usize
    }

    /// The page entry this mapping imposes at `addr` while it is the
    /// winning overlay.
    pub(crate) fn compose_entry(&self, addr: Addr) -> PageEntry {
        let page_base = addr & !PAGE_MASK;
        PageEntry::new(
            self.device_id,
            self.region,
            self.perms,
            self.caps,
            self.target.clone(),
            self.phys_base + (page_base - self.virtual_base),
        )
    }
}

impl core::fmt::Debug for LayeredMapping {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LayeredMapping")
            .field("virtual_base", &self.virtual_base)
            .field("size", &self.size)
            .field("layer", &self.layer)
            .field("device_id", &self.device_id)
            .field("region", &self.region)
            .field("perms", &self.perms)
            .field("phys_base", &self.phys_base)
            .finish_non_exhaustive()
    }
}

/// A layer plus its mappings, in insertion order.
#[derive(Debug)]
pub(crate) struct Layer {
    pub(crate) meta: MappingLayer,
    pub(crate) mappings: Vec<LayeredMapping>,
}
