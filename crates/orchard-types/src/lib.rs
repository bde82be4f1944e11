//! Shared value types for the bus fabric: addresses, cycles, access
//! descriptors, permissions, capabilities, and fault records.
//!
//! Everything here is a plain value. The types carry no behavior beyond
//! derivation helpers and predicates; the bus, scheduler, and devices all
//! speak in terms of these.

mod access;
mod fault;

pub use access::{AccessFlags, AccessIntent, BusAccess, BusAccessMode, PagePerms, PrivilegeLevel};
pub use fault::{BusFault, BusResult, FaultKind};

/// Virtual address. The canonical machine issues 16-bit addresses; larger
/// address spaces (up to 32 bits) use the same type.
pub type Addr = u32;

/// Monotonically non-decreasing cycle counter.
pub type Cycle = u64;

/// Identifies the device behind a mapping or an access. 0 is the
/// motherboard / "nobody".
pub type DeviceId = u16;

pub const PAGE_SHIFT: u32 = 12;
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
pub const PAGE_MASK: Addr = (PAGE_SIZE as Addr) - 1;

/// Value read from an address nothing drives.
pub const FLOATING_BUS: u8 = 0xFF;

/// Coarse classification of what a page holds, carried through mappings and
/// into fault reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegionTag {
    Ram,
    Rom,
    Io,
    Stack,
    Slot,
    #[default]
    Unknown,
}

impl core::fmt::Display for RegionTag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            RegionTag::Ram => "ram",
            RegionTag::Rom => "rom",
            RegionTag::Io => "io",
            RegionTag::Stack => "stack",
            RegionTag::Slot => "slot",
            RegionTag::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// What a bus target is able or allowed to do.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TargetCaps: u8 {
        const SUPPORTS_PEEK = 1;
        const SUPPORTS_POKE = 2;
        const SUPPORTS_WIDE = 4;
        const HAS_SIDE_EFFECTS = 8;
        const TIMING_SENSITIVE = 16;
    }
}
