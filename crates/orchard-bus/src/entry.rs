use std::rc::Rc;

use orchard_mem::BusTarget;
use orchard_types::{Addr, DeviceId, PagePerms, PrivilegeLevel, RegionTag, TargetCaps};

/// Immutable descriptor for one page of the address space. Replaced as a
/// whole by map/remap; the bus never mutates an entry in place.
#[derive(Clone)]
pub struct PageEntry {
    pub device_id: DeviceId,
    pub region: RegionTag,
    pub perms: PagePerms,
    pub caps: TargetCaps,
    pub target: Rc<dyn BusTarget>,
    pub physical_base: Addr,
    pub min_read_privilege: PrivilegeLevel,
    pub min_write_privilege: PrivilegeLevel,
    pub min_execute_privilege: PrivilegeLevel,
    pub sealed: bool,
}

impl PageEntry {
    pub fn new(
        device_id: DeviceId,
        region: RegionTag,
        perms: PagePerms,
        caps: TargetCaps,
        target: Rc<dyn BusTarget>,
        physical_base: Addr,
    ) -> Self {
        PageEntry {
            device_id,
            region,
            perms,
            caps,
            target,
            physical_base,
            min_read_privilege: PrivilegeLevel::Ring3,
            min_write_privilege: PrivilegeLevel::Ring3,
            min_execute_privilege: PrivilegeLevel::Ring3,
            sealed: false,
        }
    }

    pub fn with_privilege_floors(
        mut self,
        read: PrivilegeLevel,
        write: PrivilegeLevel,
        execute: PrivilegeLevel,
    ) -> Self {
        self.min_read_privilege = read;
        self.min_write_privilege = write;
        self.min_execute_privilege = execute;
        self
    }

    /// A sealed entry rejects every later remap of its page.
    pub fn sealed(mut self) -> Self {
        self.sealed = true;
        self
    }
}

impl PartialEq for PageEntry {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
            && self.device_id == other.device_id
            && self.region == other.region
            && self.perms == other.perms
            && self.caps == other.caps
            && self.physical_base == other.physical_base
            && self.min_read_privilege == other.min_read_privilege
            && self.min_write_privilege == other.min_write_privilege
            && self.min_execute_privilege == other.min_execute_privilege
            && self.sealed == other.sealed
    }
}

impl core::fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PageEntry")
            .field("device_id", &self.device_id)
            .field("region", &self.region)
            .field("perms", &self.perms)
            .field("caps", &self.caps)
            .field("physical_base", &self.physical_base)
            .field("sealed", &self.sealed)
            .finish_non_exhaustive()
    }
}
