//! The paged memory bus: a software MMU translating virtual addresses to
//! byte storage through a page table, with layered overlays, bank-switching
//! swap groups, permission and privilege gates, and atomic-vs-decomposed
//! wide accesses.
//!
//! The effective mapping of every page is kept materialised in the page
//! table: layer and swap-group changes eagerly rewrite the affected
//! entries, so the per-byte hot path is a single array index, a permission
//! check, and a target call. Composition order when several sources claim a
//! page: highest-priority active layer, then the active swap variant, then
//! the saved base entry, then unmapped.
//!
//! [`MainBus`] is a cheap clone-able handle over shared state. I/O handlers
//! and scheduled events hold their own clone and may remap pages or toggle
//! layers mid-access; the bus drops its internal borrow before dispatching
//! into any target, so re-entrant mutation is safe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use orchard_mem::{BusTarget, MemoryBus};
use orchard_types::{
    AccessFlags, AccessIntent, Addr, BusAccess, BusAccessMode, BusFault, BusResult, Cycle,
    DeviceId, FaultKind, PagePerms, PrivilegeLevel, RegionTag, TargetCaps, FLOATING_BUS,
    PAGE_MASK, PAGE_SHIFT, PAGE_SIZE,
};

mod entry;
mod error;
mod layers;
mod swap;

pub use entry::PageEntry;
pub use error::{LayerError, MapError, SwapError};
pub use layers::{LayeredMapping, MappingLayer};
pub use swap::{SwapGroupId, SwapVariant};

use layers::Layer;
use swap::SwapGroup;

struct BusState {
    address_bits: u32,
    page_count: usize,
    pages: Vec<Option<PageEntry>>,
    saved_base: HashMap<usize, Option<PageEntry>>,
    layers: Vec<Layer>,
    layer_index: HashMap<String, usize>,
    swap_groups: Vec<SwapGroup>,
    mode: BusAccessMode,
    cycle: Cycle,
}

/// Handle to one bus. Clones share state; devices keep a clone so they can
/// rewire mappings from inside their own handlers.
#[derive(Clone)]
pub struct MainBus {
    state: Rc<RefCell<BusState>>,
}

struct Prepared {
    target: Rc<dyn BusTarget>,
    phys: Addr,
    device_id: DeviceId,
    region: RegionTag,
    caps: TargetCaps,
}

impl Prepared {
    fn fault(&self, address: Addr, intent: AccessIntent, kind: FaultKind) -> BusFault {
        BusFault {
            kind,
            address,
            device_id: self.device_id,
            region: self.region,
            intent,
        }
    }
}

fn crosses_page(addr: Addr, width_bytes: Addr) -> bool {
    (addr >> PAGE_SHIFT) != (addr.wrapping_add(width_bytes - 1) >> PAGE_SHIFT)
}

impl MainBus {
    /// A bus over a `1 << address_bits` byte address space, all pages
    /// unmapped. `address_bits` must be in `12..=32`.
    pub fn new(address_bits: u32) -> Result<Self, MapError> {
        if !(PAGE_SHIFT..=32).contains(&address_bits) {
            return Err(MapError::AddressSpaceBits(address_bits));
        }
        let page_count = 1usize << (address_bits - PAGE_SHIFT);
        Ok(MainBus {
            state: Rc::new(RefCell::new(BusState {
                address_bits,
                page_count,
                pages: vec![None; page_count],
                saved_base: HashMap::new(),
                layers: Vec::new(),
                layer_index: HashMap::new(),
                swap_groups: Vec::new(),
                mode: BusAccessMode::Decomposed,
                cycle: 0,
            })),
        })
    }

    pub fn address_bits(&self) -> u32 {
        self.state.borrow().address_bits
    }

    pub fn size(&self) -> usize {
        1usize << self.address_bits()
    }

    pub fn page_count(&self) -> usize {
        self.state.borrow().page_count
    }

    pub fn access_mode(&self) -> BusAccessMode {
        self.state.borrow().mode
    }

    pub fn set_access_mode(&self, mode: BusAccessMode) {
        self.state.borrow_mut().mode = mode;
    }

    pub fn cycle_count(&self) -> Cycle {
        self.state.borrow().cycle
    }

    pub fn reset_cycle_count(&self) {
        self.state.borrow_mut().cycle = 0;
    }

    /// A default access record for machine-originated traffic: current bus
    /// mode and cycle, ring 0, little-endian.
    pub fn access(&self, intent: AccessIntent, addr: Addr) -> BusAccess {
        let st = self.state.borrow();
        let mut a = BusAccess::new(intent, addr);
        a.mode = st.mode;
        a.cycle = st.cycle;
        a.privilege = PrivilegeLevel::Ring0;
        a
    }

    /// Both `address` and `size` must be multiples of the page size.
    pub fn validate_alignment(address: Addr, size: Addr) -> Result<(), MapError> {
        if address & PAGE_MASK != 0 {
            return Err(MapError::Unaligned {
                param: "address",
                value: address,
            });
        }
        if size & PAGE_MASK != 0 {
            return Err(MapError::Unaligned {
                param: "size",
                value: size,
            });
        }
        Ok(())
    }

    // ---- mapping primitives ----

    pub fn map_page(&self, index: usize, entry: PageEntry) -> Result<(), MapError> {
        let mut st = self.state.borrow_mut();
        st.check_page_index(index)?;
        st.check_unsealed(index)?;
        st.pages[index] = Some(entry);
        Ok(())
    }

    /// Identical to [`MainBus::map_page`].
    pub fn set_page_entry(&self, index: usize, entry: PageEntry) -> Result<(), MapError> {
        self.map_page(index, entry)
    }

    pub fn map_page_at(&self, virtual_addr: Addr, entry: PageEntry) -> Result<(), MapError> {
        if virtual_addr & PAGE_MASK != 0 {
            return Err(MapError::Unaligned {
                param: "virtualAddress",
                value: virtual_addr,
            });
        }
        self.map_page((virtual_addr >> PAGE_SHIFT) as usize, entry)
    }

    /// Maps `count` pages starting at `start`, advancing the physical base
    /// by one page per index.
    #[allow(clippy::too_many_arguments)]
    pub fn map_page_range(
        &self,
        start: usize,
        count: usize,
        device_id: DeviceId,
        region: RegionTag,
        perms: PagePerms,
        caps: TargetCaps,
        target: Rc<dyn BusTarget>,
        phys_base: Addr,
    ) -> Result<(), MapError> {
        let mut st = self.state.borrow_mut();
        if count == 0 {
            return Ok(());
        }
        st.check_page_index(start)?;
        st.check_page_index(start + count - 1)?;
        for i in 0..count {
            st.check_unsealed(start + i)?;
        }
        for i in 0..count {
            let entry = PageEntry::new(
                device_id,
                region,
                perms,
                caps,
                target.clone(),
                phys_base + (i as Addr) * (PAGE_SIZE as Addr),
            );
            st.pages[start + i] = Some(entry);
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn map_region(
        &self,
        virtual_base: Addr,
        size: Addr,
        device_id: DeviceId,
        region: RegionTag,
        perms: PagePerms,
        caps: TargetCaps,
        target: Rc<dyn BusTarget>,
        phys_base: Addr,
    ) -> Result<(), MapError> {
        if virtual_base & PAGE_MASK != 0 {
            return Err(MapError::Unaligned {
                param: "virtualAddress",
                value: virtual_base,
            });
        }
        if size & PAGE_MASK != 0 || size == 0 {
            return Err(MapError::Unaligned {
                param: "size",
                value: size,
            });
        }
        let space = 1u64 << self.address_bits();
        if u64::from(virtual_base) + u64::from(size) > space {
            return Err(MapError::RegionOutOfRange {
                param: "size",
                base: virtual_base,
                size,
            });
        }
        self.map_page_range(
            (virtual_base >> PAGE_SHIFT) as usize,
            (size >> PAGE_SHIFT) as usize,
            device_id,
            region,
            perms,
            caps,
            target,
            phys_base,
        )
    }

    /// Rebinds the target and physical base of a mapped page, preserving
    /// device id, region, permissions, and capabilities.
    pub fn remap_page(
        &self,
        index: usize,
        target: Rc<dyn BusTarget>,
        phys_base: Addr,
    ) -> Result<(), MapError> {
        let mut st = self.state.borrow_mut();
        st.check_page_index(index)?;
        st.check_unsealed(index)?;
        let entry = st.pages[index]
            .as_mut()
            .ok_or(MapError::PageNotMapped(index))?;
        entry.target = target;
        entry.physical_base = phys_base;
        Ok(())
    }

    /// Replaces the whole entry of a page. The existing entry's seal still
    /// applies.
    pub fn remap_page_entry(&self, index: usize, entry: PageEntry) -> Result<(), MapError> {
        let mut st = self.state.borrow_mut();
        st.check_page_index(index)?;
        st.check_unsealed(index)?;
        if st.pages[index].is_none() {
            return Err(MapError::PageNotMapped(index));
        }
        st.pages[index] = Some(entry);
        Ok(())
    }

    pub fn remap_page_range(
        &self,
        start: usize,
        count: usize,
        target: Rc<dyn BusTarget>,
        phys_base: Addr,
    ) -> Result<(), MapError> {
        for i in 0..count {
            self.remap_page(
                start + i,
                target.clone(),
                phys_base + (i as Addr) * (PAGE_SIZE as Addr),
            )?;
        }
        Ok(())
    }

    pub fn page_entry(&self, index: usize) -> Option<PageEntry> {
        self.state.borrow().pages.get(index)?.clone()
    }

    pub fn is_page_mapped(&self, index: usize) -> bool {
        self.page_entry(index).is_some()
    }

    // ---- saved base ----

    /// Snapshots the current entry at `index` as the fallback restored when
    /// no overlay or swap variant claims the page.
    pub fn save_base_mapping(&self, index: usize) -> Result<(), MapError> {
        let mut st = self.state.borrow_mut();
        st.check_page_index(index)?;
        let snapshot = st.pages[index].clone();
        st.saved_base.insert(index, snapshot);
        Ok(())
    }

    pub fn save_base_mapping_range(&self, start: usize, count: usize) -> Result<(), MapError> {
        for i in 0..count {
            self.save_base_mapping(start + i)?;
        }
        Ok(())
    }

    // ---- layers ----

    pub fn create_layer(&self, name: &str, priority: i32) -> Result<(), LayerError> {
        let mut st = self.state.borrow_mut();
        if st.layer_index.contains_key(name) {
            return Err(LayerError::DuplicateLayer(name.to_string()));
        }
        tracing::debug!(layer = name, priority, "create layer");
        let idx = st.layers.len();
        st.layers.push(Layer {
            meta: MappingLayer {
                name: name.to_string(),
                priority,
                active: false,
            },
            mappings: Vec::new(),
        });
        st.layer_index.insert(name.to_string(), idx);
        Ok(())
    }

    pub fn layer(&self, name: &str) -> Result<MappingLayer, LayerError> {
        let st = self.state.borrow();
        let idx = st.layer_idx(name)?;
        Ok(st.layers[idx].meta.clone())
    }

    pub fn is_layer_active(&self, name: &str) -> Result<bool, LayerError> {
        Ok(self.layer(name)?.active)
    }

    pub fn activate_layer(&self, name: &str) -> Result<(), LayerError> {
        self.set_layer_active(name, true)
    }

    pub fn deactivate_layer(&self, name: &str) -> Result<(), LayerError> {
        self.set_layer_active(name, false)
    }

    fn set_layer_active(&self, name: &str, active: bool) -> Result<(), LayerError> {
        let mut st = self.state.borrow_mut();
        let idx = st.layer_idx(name)?;
        if st.layers[idx].meta.active == active {
            return Ok(());
        }
        tracing::debug!(layer = name, active, "toggle layer");
        st.layers[idx].meta.active = active;
        let ranges: Vec<(usize, usize)> = st.layers[idx]
            .mappings
            .iter()
            .map(|m| (m.first_page(), m.page_count()))
            .collect();
        for (first, count) in ranges {
            st.refresh_range(first, count);
        }
        Ok(())
    }

    /// Adds an overlay mapping to a layer. If the layer is currently active
    /// the affected pages take effect immediately.
    pub fn add_layered_mapping(&self, mapping: LayeredMapping) -> Result<(), LayerError> {
        if mapping.virtual_base & PAGE_MASK != 0 {
            return Err(LayerError::Unaligned {
                param: "virtualAddress",
                value: mapping.virtual_base,
            });
        }
        if mapping.size & PAGE_MASK != 0 || mapping.size == 0 {
            return Err(LayerError::Unaligned {
                param: "size",
                value: mapping.size,
            });
        }
        let mut st = self.state.borrow_mut();
        let space = 1u64 << st.address_bits;
        if u64::from(mapping.virtual_base) + u64::from(mapping.size) > space {
            return Err(LayerError::RegionOutOfRange {
                param: "size",
                base: mapping.virtual_base,
                size: mapping.size,
            });
        }
        let idx = st.layer_idx(&mapping.layer)?;
        let first = mapping.first_page();
        let count = mapping.page_count();
        let active = st.layers[idx].meta.active;
        st.layers[idx].mappings.push(mapping);
        if active {
            st.refresh_range(first, count);
        }
        Ok(())
    }

    /// Rewrites the permissions of every mapping on the layer and
    /// re-resolves the touched pages.
    pub fn set_layer_permissions(&self, name: &str, perms: PagePerms) -> Result<(), LayerError> {
        let mut st = self.state.borrow_mut();
        let idx = st.layer_idx(name)?;
        tracing::debug!(layer = name, ?perms, "set layer permissions");
        let mut ranges = Vec::new();
        for m in &mut st.layers[idx].mappings {
            m.perms = perms;
            ranges.push((m.first_page(), m.page_count()));
        }
        for (first, count) in ranges {
            st.refresh_range(first, count);
        }
        Ok(())
    }

    /// The page entry the bus would use at `addr` right now.
    pub fn effective_mapping(&self, addr: Addr) -> Option<PageEntry> {
        self.page_entry((addr >> PAGE_SHIFT) as usize)
    }

    /// Every overlay mapping containing `addr`, on active and inactive
    /// layers alike.
    pub fn mappings_at(&self, addr: Addr) -> Vec<LayeredMapping> {
        let st = self.state.borrow();
        st.layers
            .iter()
            .flat_map(|l| l.mappings.iter())
            .filter(|m| m.contains(addr))
            .cloned()
            .collect()
    }

    /// Active layers with a mapping containing `addr`, highest priority
    /// first (insertion order breaks ties).
    pub fn layers_at(&self, addr: Addr) -> Vec<MappingLayer> {
        let st = self.state.borrow();
        let mut out: Vec<MappingLayer> = st
            .layers
            .iter()
            .filter(|l| l.meta.active && l.mappings.iter().any(|m| m.contains(addr)))
            .map(|l| l.meta.clone())
            .collect();
        out.sort_by_key(|l| core::cmp::Reverse(l.priority));
        out
    }

    // ---- swap groups ----

    pub fn create_swap_group(
        &self,
        name: &str,
        virtual_base: Addr,
        size: Addr,
    ) -> Result<SwapGroupId, SwapError> {
        if virtual_base & PAGE_MASK != 0 {
            return Err(SwapError::Unaligned {
                param: "virtualAddress",
                value: virtual_base,
            });
        }
        if size & PAGE_MASK != 0 || size == 0 {
            return Err(SwapError::Unaligned {
                param: "size",
                value: size,
            });
        }
        let mut st = self.state.borrow_mut();
        let space = 1u64 << st.address_bits;
        if u64::from(virtual_base) + u64::from(size) > space {
            return Err(SwapError::RegionOutOfRange {
                param: "size",
                base: virtual_base,
                size,
            });
        }
        let id = SwapGroupId(st.swap_groups.len() as u32);
        tracing::debug!(group = name, ?id, virtual_base, size, "create swap group");
        st.swap_groups.push(SwapGroup {
            id,
            name: name.to_string(),
            virtual_base,
            size,
            variants: Vec::new(),
            active: None,
        });
        Ok(id)
    }

    pub fn swap_group_id(&self, name: &str) -> Option<SwapGroupId> {
        let st = self.state.borrow();
        st.swap_groups.iter().find(|g| g.name == name).map(|g| g.id)
    }

    pub fn add_swap_variant(
        &self,
        group: SwapGroupId,
        name: &str,
        target: Rc<dyn BusTarget>,
        phys_base: Addr,
        perms: PagePerms,
    ) -> Result<(), SwapError> {
        let mut st = self.state.borrow_mut();
        let g = st.swap_group_mut(group)?;
        if g.variant_index(name).is_some() {
            return Err(SwapError::DuplicateVariant {
                group,
                name: name.to_string(),
            });
        }
        g.variants.push(SwapVariant {
            name: name.to_string(),
            target,
            phys_base,
            perms,
        });
        Ok(())
    }

    /// Atomically replaces every page in the group's range with the named
    /// variant. Variants are mutually exclusive.
    pub fn activate_swap_variant(&self, group: SwapGroupId, name: &str) -> Result<(), SwapError> {
        let mut st = self.state.borrow_mut();
        let g = st.swap_group_mut(group)?;
        let idx = g.variant_index(name).ok_or_else(|| SwapError::UnknownVariant {
            group,
            name: name.to_string(),
        })?;
        tracing::debug!(group = %g.name, variant = name, "activate swap variant");
        g.active = Some(idx);
        let first = (g.virtual_base >> PAGE_SHIFT) as usize;
        let count = (g.size >> PAGE_SHIFT) as usize;
        st.refresh_range(first, count);
        Ok(())
    }

    /// Leaves the group with no active variant; its range reverts to the
    /// saved base (or unmapped).
    pub fn deactivate_swap_group(&self, group: SwapGroupId) -> Result<(), SwapError> {
        let mut st = self.state.borrow_mut();
        let g = st.swap_group_mut(group)?;
        g.active = None;
        let first = (g.virtual_base >> PAGE_SHIFT) as usize;
        let count = (g.size >> PAGE_SHIFT) as usize;
        st.refresh_range(first, count);
        Ok(())
    }

    pub fn active_swap_variant(&self, group: SwapGroupId) -> Result<Option<String>, SwapError> {
        let st = self.state.borrow();
        let g = st
            .swap_groups
            .iter()
            .find(|g| g.id == group)
            .ok_or(SwapError::UnknownGroup(group))?;
        Ok(g.active_variant().map(|v| v.name.clone()))
    }

    // ---- access paths ----

    fn prepare(&self, addr: Addr, access: &BusAccess) -> BusResult<Prepared> {
        let st = self.state.borrow();
        let index = (addr >> PAGE_SHIFT) as usize;
        let entry = st
            .pages
            .get(index)
            .and_then(|e| e.as_ref())
            .ok_or_else(|| BusFault::unmapped(addr, access.intent))?;
        check_entry(entry, addr, access)?;
        Ok(Prepared {
            target: entry.target.clone(),
            phys: entry.physical_base + (addr & PAGE_MASK),
            device_id: entry.device_id,
            region: entry.region,
            caps: entry.caps,
        })
    }

    fn bump_cycle(&self) {
        self.state.borrow_mut().cycle += 1;
    }

    pub fn try_read8(&self, addr: Addr, access: &BusAccess) -> BusResult<u8> {
        let prep = self.prepare(addr, access)?;
        let mut acc = *access;
        acc.address = addr;
        acc.width_bits = 8;
        let res = prep.target.read8_checked(prep.phys, &acc);
        self.bump_cycle();
        res.map_err(|kind| prep.fault(addr, access.intent, kind))
    }

    pub fn try_write8(&self, addr: Addr, value: u8, access: &BusAccess) -> BusResult<()> {
        let prep = self.prepare(addr, access)?;
        let mut acc = *access;
        acc.address = addr;
        acc.value = u32::from(value);
        acc.width_bits = 8;
        let res = prep.target.write8_checked(prep.phys, value, &acc);
        self.bump_cycle();
        res.map_err(|kind| prep.fault(addr, access.intent, kind))
    }

    pub fn try_read16(&self, addr: Addr, access: &BusAccess) -> BusResult<u16> {
        self.try_read_wide(addr, 2, access).map(|v| v as u16)
    }

    pub fn try_read32(&self, addr: Addr, access: &BusAccess) -> BusResult<u32> {
        self.try_read_wide(addr, 4, access)
    }

    pub fn try_write16(&self, addr: Addr, value: u16, access: &BusAccess) -> BusResult<()> {
        self.try_write_wide(addr, 2, u32::from(value), access)
    }

    pub fn try_write32(&self, addr: Addr, value: u32, access: &BusAccess) -> BusResult<()> {
        self.try_write_wide(addr, 4, value, access)
    }

    /// Wide-read policy: a forced-decompose flag or a page crossing always
    /// decomposes; otherwise an atomic-mode access against a wide-capable
    /// target runs as one target operation; everything else decomposes into
    /// ascending byte reads (little-endian assembly), aborting on the first
    /// faulting byte.
    fn try_read_wide(&self, addr: Addr, width_bytes: Addr, access: &BusAccess) -> BusResult<u32> {
        if !access.is_decompose_forced()
            && !crosses_page(addr, width_bytes)
            && access.is_atomic_requested()
        {
            let prep = self.prepare(addr, access)?;
            if prep.caps.contains(TargetCaps::SUPPORTS_WIDE) {
                let mut acc = *access;
                acc.address = addr;
                acc.width_bits = (width_bytes * 8) as u8;
                let res = match width_bytes {
                    2 => prep.target.read16_checked(prep.phys, &acc).map(u32::from),
                    _ => prep.target.read32_checked(prep.phys, &acc),
                };
                self.bump_cycle();
                return res.map_err(|kind| prep.fault(addr, access.intent, kind));
            }
        }
        let mut value = 0u32;
        for i in 0..width_bytes {
            let byte = self.try_read8(addr.wrapping_add(i), access)?;
            value |= u32::from(byte) << (8 * i);
        }
        Ok(value)
    }

    fn try_write_wide(
        &self,
        addr: Addr,
        width_bytes: Addr,
        value: u32,
        access: &BusAccess,
    ) -> BusResult<()> {
        if !access.is_decompose_forced()
            && !crosses_page(addr, width_bytes)
            && access.is_atomic_requested()
        {
            let prep = self.prepare(addr, access)?;
            if prep.caps.contains(TargetCaps::SUPPORTS_WIDE) {
                let mut acc = *access;
                acc.address = addr;
                acc.value = value;
                acc.width_bits = (width_bytes * 8) as u8;
                let res = match width_bytes {
                    2 => prep.target.write16_checked(prep.phys, value as u16, &acc),
                    _ => prep.target.write32_checked(prep.phys, value, &acc),
                };
                self.bump_cycle();
                return res.map_err(|kind| prep.fault(addr, access.intent, kind));
            }
        }
        for i in 0..width_bytes {
            let byte = (value >> (8 * i)) as u8;
            self.try_write8(addr.wrapping_add(i), byte, access)?;
        }
        Ok(())
    }

    // ---- infallible surface ----

    pub fn read_u8(&self, addr: Addr) -> u8 {
        let acc = self.access(AccessIntent::DataRead, addr);
        match self.try_read8(addr, &acc) {
            Ok(v) => v,
            Err(fault) => panic!("{fault}"),
        }
    }

    pub fn write_u8(&self, addr: Addr, value: u8) {
        let mut acc = self.access(AccessIntent::DataWrite, addr);
        acc.value = u32::from(value);
        if let Err(fault) = self.try_write8(addr, value, &acc) {
            panic!("{fault}");
        }
    }

    pub fn read_u16(&self, addr: Addr) -> u16 {
        let acc = self.access(AccessIntent::DataRead, addr);
        match self.try_read16(addr, &acc) {
            Ok(v) => v,
            Err(fault) => panic!("{fault}"),
        }
    }

    pub fn write_u16(&self, addr: Addr, value: u16) {
        let mut acc = self.access(AccessIntent::DataWrite, addr);
        acc.value = u32::from(value);
        if let Err(fault) = self.try_write16(addr, value, &acc) {
            panic!("{fault}");
        }
    }

    pub fn read_u32(&self, addr: Addr) -> u32 {
        let acc = self.access(AccessIntent::DataRead, addr);
        match self.try_read32(addr, &acc) {
            Ok(v) => v,
            Err(fault) => panic!("{fault}"),
        }
    }

    pub fn write_u32(&self, addr: Addr, value: u32) {
        let mut acc = self.access(AccessIntent::DataWrite, addr);
        acc.value = value;
        if let Err(fault) = self.try_write32(addr, value, &acc) {
            panic!("{fault}");
        }
    }

    /// Side-effect-free debug read. Bytes that fault read as the floating
    /// bus value.
    pub fn inspect(&self, start: Addr, len: usize) -> Vec<u8> {
        let mut acc = self.access(AccessIntent::DebugRead, start);
        acc.flags |= AccessFlags::NO_SIDE_EFFECTS;
        (0..len)
            .map(|i| {
                self.try_read8(start.wrapping_add(i as Addr), &acc)
                    .unwrap_or(FLOATING_BUS)
            })
            .collect()
    }

    /// Debug wipe: zeroes the storage behind every RAM-tagged page. Other
    /// regions are untouched.
    pub fn clear_ram(&self) {
        let ram_pages: Vec<(Rc<dyn BusTarget>, Addr)> = {
            let st = self.state.borrow();
            st.pages
                .iter()
                .flatten()
                .filter(|e| e.region == RegionTag::Ram)
                .map(|e| (e.target.clone(), e.physical_base))
                .collect()
        };
        let mut acc = BusAccess::new(AccessIntent::DebugWrite, 0);
        acc.privilege = PrivilegeLevel::Ring0;
        for (target, phys_base) in ram_pages {
            for off in 0..PAGE_SIZE as Addr {
                target.write8(phys_base + off, 0, &acc);
            }
        }
    }
}

impl MemoryBus for MainBus {
    fn size(&self) -> usize {
        MainBus::size(self)
    }

    fn read_u8(&mut self, addr: Addr) -> u8 {
        MainBus::read_u8(self, addr)
    }

    fn write_u8(&mut self, addr: Addr, value: u8) {
        MainBus::write_u8(self, addr, value)
    }

    fn read_u16(&mut self, addr: Addr) -> u16 {
        MainBus::read_u16(self, addr)
    }

    fn write_u16(&mut self, addr: Addr, value: u16) {
        MainBus::write_u16(self, addr, value)
    }

    fn read_u32(&mut self, addr: Addr) -> u32 {
        MainBus::read_u32(self, addr)
    }

    fn write_u32(&mut self, addr: Addr, value: u32) {
        MainBus::write_u32(self, addr, value)
    }

    fn inspect(&mut self, start: Addr, len: usize) -> Vec<u8> {
        MainBus::inspect(self, start, len)
    }

    fn clear_ram(&mut self) {
        MainBus::clear_ram(self)
    }

    fn cycle_count(&self) -> Cycle {
        MainBus::cycle_count(self)
    }

    fn reset_cycle_count(&mut self) {
        MainBus::reset_cycle_count(self)
    }
}

fn check_entry(entry: &PageEntry, addr: Addr, access: &BusAccess) -> BusResult<()> {
    let fault = |kind| BusFault {
        kind,
        address: addr,
        device_id: entry.device_id,
        region: entry.region,
        intent: access.intent,
    };
    match access.intent {
        AccessIntent::InstructionFetch => {
            // Execute is only enforced for atomic-mode fetches; decomposed
            // fetches keep the historical no-NX behavior.
            if access.mode == BusAccessMode::Atomic && !entry.perms.contains(PagePerms::EXECUTE) {
                return Err(fault(FaultKind::Nx));
            }
            if access.privilege > entry.min_execute_privilege {
                return Err(fault(FaultKind::Permission));
            }
        }
        AccessIntent::DataRead | AccessIntent::DebugRead | AccessIntent::DmaRead => {
            if !entry.perms.contains(PagePerms::READ) {
                return Err(fault(FaultKind::Permission));
            }
            if access.privilege > entry.min_read_privilege {
                return Err(fault(FaultKind::Permission));
            }
        }
        AccessIntent::DataWrite | AccessIntent::DebugWrite | AccessIntent::DmaWrite => {
            if !entry.perms.contains(PagePerms::WRITE) {
                return Err(fault(FaultKind::Permission));
            }
            if access.privilege > entry.min_write_privilege {
                return Err(fault(FaultKind::Permission));
            }
        }
    }
    Ok(())
}

impl BusState {
    fn check_page_index(&self, index: usize) -> Result<(), MapError> {
        if index >= self.page_count {
            return Err(MapError::PageIndexOutOfRange {
                index,
                count: self.page_count,
            });
        }
        Ok(())
    }

    fn check_unsealed(&self, index: usize) -> Result<(), MapError> {
        if self.pages[index].as_ref().is_some_and(|e| e.sealed) {
            return Err(MapError::SealedPage(index));
        }
        Ok(())
    }

    fn layer_idx(&self, name: &str) -> Result<usize, LayerError> {
        self.layer_index
            .get(name)
            .copied()
            .ok_or_else(|| LayerError::UnknownLayer(name.to_string()))
    }

    fn swap_group_mut(&mut self, id: SwapGroupId) -> Result<&mut SwapGroup, SwapError> {
        self.swap_groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or(SwapError::UnknownGroup(id))
    }

    fn refresh_range(&mut self, first: usize, count: usize) {
        for page in first..(first + count).min(self.page_count) {
            self.refresh_page(page);
        }
    }

    /// Re-resolves the effective entry of one page: highest-priority active
    /// layer mapping first (insertion order breaks priority ties), then the
    /// active swap variant of the first group covering the page, then the
    /// saved base, then unmapped.
    fn refresh_page(&mut self, page: usize) {
        let v = (page as Addr) << PAGE_SHIFT;

        let mut winner: Option<(i32, &layers::LayeredMapping)> = None;
        for layer in &self.layers {
            if !layer.meta.active {
                continue;
            }
            for m in &layer.mappings {
                if !m.contains(v) {
                    continue;
                }
                match winner {
                    Some((best, _)) if layer.meta.priority <= best => {}
                    _ => winner = Some((layer.meta.priority, m)),
                }
            }
        }
        if let Some((_, m)) = winner {
            let entry = m.compose_entry(v);
            self.pages[page] = Some(entry);
            return;
        }

        for g in &self.swap_groups {
            if !g.contains(v) {
                continue;
            }
            if let Some(var) = g.active_variant() {
                let region = self
                    .saved_base
                    .get(&page)
                    .and_then(|o| o.as_ref())
                    .map_or(RegionTag::Unknown, |e| e.region);
                let entry = PageEntry::new(
                    0,
                    region,
                    var.perms,
                    var.target.caps(),
                    var.target.clone(),
                    var.phys_base + (v - g.virtual_base),
                );
                self.pages[page] = Some(entry);
                return;
            }
        }

        self.pages[page] = self.saved_base.get(&page).cloned().flatten();
    }
}
