use std::rc::Rc;

use orchard_types::{
    AccessIntent, Addr, BusAccess, FaultKind, RegionTag, TargetCaps, FLOATING_BUS,
};

use crate::{MemSlice, RoMemSlice};

/// Endpoint that handles reads and writes at physical offsets.
///
/// The byte methods are the required surface. The wide methods default to
/// little-endian decomposition inside the target; a target that can do
/// better (single borrow, device-atomic register access) overrides them and
/// advertises [`TargetCaps::SUPPORTS_WIDE`]. The `_checked` forms are how a
/// device-defined target reports [`FaultKind::DeviceFault`]; the built-in
/// targets never fault.
pub trait BusTarget {
    fn caps(&self) -> TargetCaps;

    fn read8(&self, phys: Addr, access: &BusAccess) -> u8;

    fn write8(&self, phys: Addr, value: u8, access: &BusAccess);

    fn read16(&self, phys: Addr, access: &BusAccess) -> u16 {
        let lo = self.read8(phys, access);
        let hi = self.read8(phys.wrapping_add(1), &access.with_address_offset(1));
        u16::from_le_bytes([lo, hi])
    }

    fn read32(&self, phys: Addr, access: &BusAccess) -> u32 {
        let mut bytes = [0u8; 4];
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = self.read8(
                phys.wrapping_add(i as Addr),
                &access.with_address_offset(i as Addr),
            );
        }
        u32::from_le_bytes(bytes)
    }

    fn write16(&self, phys: Addr, value: u16, access: &BusAccess) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(
                phys.wrapping_add(i as Addr),
                b,
                &access.with_address_offset(i as Addr),
            );
        }
    }

    fn write32(&self, phys: Addr, value: u32, access: &BusAccess) {
        for (i, b) in value.to_le_bytes().into_iter().enumerate() {
            self.write8(
                phys.wrapping_add(i as Addr),
                b,
                &access.with_address_offset(i as Addr),
            );
        }
    }

    fn read8_checked(&self, phys: Addr, access: &BusAccess) -> Result<u8, FaultKind> {
        Ok(self.read8(phys, access))
    }

    fn write8_checked(&self, phys: Addr, value: u8, access: &BusAccess) -> Result<(), FaultKind> {
        self.write8(phys, value, access);
        Ok(())
    }

    fn read16_checked(&self, phys: Addr, access: &BusAccess) -> Result<u16, FaultKind> {
        Ok(self.read16(phys, access))
    }

    fn read32_checked(&self, phys: Addr, access: &BusAccess) -> Result<u32, FaultKind> {
        Ok(self.read32(phys, access))
    }

    fn write16_checked(&self, phys: Addr, value: u16, access: &BusAccess) -> Result<(), FaultKind> {
        self.write16(phys, value, access);
        Ok(())
    }

    fn write32_checked(&self, phys: Addr, value: u32, access: &BusAccess) -> Result<(), FaultKind> {
        self.write32(phys, value, access);
        Ok(())
    }
}

/// Plain byte-accurate RAM over an aliasing slice.
#[derive(Debug, Clone)]
pub struct RamTarget {
    slice: MemSlice,
}

impl RamTarget {
    pub fn new(slice: MemSlice) -> Self {
        RamTarget { slice }
    }

    pub fn slice(&self) -> &MemSlice {
        &self.slice
    }
}

impl BusTarget for RamTarget {
    fn caps(&self) -> TargetCaps {
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::SUPPORTS_WIDE
    }

    fn read8(&self, phys: Addr, _access: &BusAccess) -> u8 {
        self.slice.read(phys as usize)
    }

    fn write8(&self, phys: Addr, value: u8, _access: &BusAccess) {
        self.slice.write(phys as usize, value);
    }

    fn read16(&self, phys: Addr, _access: &BusAccess) -> u16 {
        let p = phys as usize;
        u16::from_le_bytes([self.slice.read(p), self.slice.read(p + 1)])
    }

    fn read32(&self, phys: Addr, _access: &BusAccess) -> u32 {
        let b = self.slice.read_bytes(phys as usize, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    fn write16(&self, phys: Addr, value: u16, _access: &BusAccess) {
        self.slice.copy_from(phys as usize, &value.to_le_bytes());
    }

    fn write32(&self, phys: Addr, value: u32, _access: &BusAccess) {
        self.slice.copy_from(phys as usize, &value.to_le_bytes());
    }
}

/// Read-only storage. Writes land on the floor without fault, as on the real
/// bus.
#[derive(Debug, Clone)]
pub struct RomTarget {
    slice: RoMemSlice,
}

impl RomTarget {
    pub fn new(slice: RoMemSlice) -> Self {
        RomTarget { slice }
    }
}

impl BusTarget for RomTarget {
    fn caps(&self) -> TargetCaps {
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_WIDE
    }

    fn read8(&self, phys: Addr, _access: &BusAccess) -> u8 {
        self.slice.read(phys as usize)
    }

    fn write8(&self, _phys: Addr, _value: u8, _access: &BusAccess) {}

    fn read16(&self, phys: Addr, _access: &BusAccess) -> u16 {
        let p = phys as usize;
        u16::from_le_bytes([self.slice.read(p), self.slice.read(p + 1)])
    }

    fn read32(&self, phys: Addr, _access: &BusAccess) -> u32 {
        let b = self.slice.read_bytes(phys as usize, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }
}

/// A sub-target resolved by a [`CompositeTarget`], with the physical offset
/// already translated into the sub-target's own space.
pub struct SubTarget {
    pub target: Rc<dyn BusTarget>,
    pub phys: Addr,
}

impl SubTarget {
    pub fn new(target: Rc<dyn BusTarget>, phys: Addr) -> Self {
        SubTarget { target, phys }
    }
}

/// A target that routes each access to one of several sub-targets based on
/// controller state, or to nobody at all (floating bus).
///
/// Resolution must be pure: mutating controller state belongs in
/// `on_access`, which runs before dispatch for every access that is not
/// side-effect free (the hook is where address-sensitive soft switches
/// live). Wrap an implementor in [`Composite`] to hand it to the bus.
pub trait CompositeTarget {
    fn composite_caps(&self) -> TargetCaps {
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::HAS_SIDE_EFFECTS
    }

    /// Pick the sub-target for an access at `offset`, or `None` to leave the
    /// bus floating. Resolution may depend on the intent; a write may go
    /// somewhere a read does not.
    fn resolve_target(&self, offset: Addr, intent: AccessIntent) -> Option<SubTarget>;

    fn sub_region_tag(&self, offset: Addr) -> RegionTag;

    /// Pre-dispatch hook. Never invoked for side-effect-free accesses.
    fn on_access(&self, _offset: Addr, _access: &BusAccess) {}
}

/// Adapter giving any [`CompositeTarget`] the bus-facing dispatch contract:
/// reads that resolve to nothing return [`FLOATING_BUS`], writes that
/// resolve to nothing are discarded without fault.
pub struct Composite<C: CompositeTarget>(pub C);

impl<C: CompositeTarget> Composite<C> {
    pub fn new(inner: C) -> Self {
        Composite(inner)
    }

    pub fn inner(&self) -> &C {
        &self.0
    }
}

impl<C: CompositeTarget> BusTarget for Composite<C> {
    fn caps(&self) -> TargetCaps {
        self.0.composite_caps()
    }

    fn read8(&self, phys: Addr, access: &BusAccess) -> u8 {
        if !access.is_side_effect_free() {
            self.0.on_access(phys, access);
        }
        match self.0.resolve_target(phys, access.intent) {
            Some(sub) => sub.target.read8(sub.phys, access),
            None => FLOATING_BUS,
        }
    }

    fn write8(&self, phys: Addr, value: u8, access: &BusAccess) {
        if !access.is_side_effect_free() {
            self.0.on_access(phys, access);
        }
        if let Some(sub) = self.0.resolve_target(phys, access.intent) {
            sub.target.write8(sub.phys, value, access);
        }
    }
}
