use crate::{Addr, Cycle, DeviceId};

/// Why an access is happening. Debug and DMA intents are distinguished from
/// CPU data traffic so targets and permission gates can treat them
/// differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessIntent {
    DataRead,
    DataWrite,
    InstructionFetch,
    DebugRead,
    DebugWrite,
    DmaRead,
    DmaWrite,
}

impl AccessIntent {
    pub fn is_read(self) -> bool {
        matches!(
            self,
            AccessIntent::DataRead
                | AccessIntent::InstructionFetch
                | AccessIntent::DebugRead
                | AccessIntent::DmaRead
        )
    }

    pub fn is_write(self) -> bool {
        !self.is_read()
    }
}

impl core::fmt::Display for AccessIntent {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            AccessIntent::DataRead => "data-read",
            AccessIntent::DataWrite => "data-write",
            AccessIntent::InstructionFetch => "instruction-fetch",
            AccessIntent::DebugRead => "debug-read",
            AccessIntent::DebugWrite => "debug-write",
            AccessIntent::DmaRead => "dma-read",
            AccessIntent::DmaWrite => "dma-write",
        };
        f.write_str(s)
    }
}

bitflags::bitflags! {
    /// Per-access modifiers, orthogonal to [`AccessIntent`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AccessFlags: u8 {
        /// The access must not disturb device state (soft switches,
        /// sequencers). Targets honor this by short-circuiting.
        const NO_SIDE_EFFECTS = 1;
        const LITTLE_ENDIAN = 2;
        /// Caller asks for a wide access to run as one target operation.
        const ATOMIC = 4;
        /// Caller forces byte-by-byte decomposition even where a wide path
        /// exists.
        const DECOMPOSE = 8;
    }
}

/// How the bus performs wide accesses by default. `Decomposed` is the
/// legacy 8-bit machine behavior: every 16/32-bit access is a sequence of
/// byte operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusAccessMode {
    #[default]
    Decomposed,
    Atomic,
}

bitflags::bitflags! {
    /// Page access permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PagePerms: u8 {
        const READ = 1;
        const WRITE = 2;
        const EXECUTE = 4;
    }
}

impl PagePerms {
    pub const READ_WRITE: PagePerms = PagePerms::READ.union(PagePerms::WRITE);
    pub const READ_EXECUTE: PagePerms = PagePerms::READ.union(PagePerms::EXECUTE);
    pub const ALL: PagePerms = PagePerms::all();
}

/// Ring 0 is most privileged. The derived order makes
/// `access.privilege <= floor` the "is privileged enough" test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PrivilegeLevel {
    Ring0,
    Ring1,
    Ring2,
    #[default]
    Ring3,
}

/// Everything a target gets to know about one access. Passed by reference
/// down the dispatch chain; derive a shifted copy with
/// [`BusAccess::with_address_offset`] when fanning out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusAccess {
    pub address: Addr,
    /// Value being written, if any. Unused for reads.
    pub value: u32,
    pub width_bits: u8,
    pub mode: BusAccessMode,
    /// Emulation (6502-compat) flag of the issuing CPU, for targets that
    /// behave differently across CPU modes.
    pub emulation: bool,
    pub intent: AccessIntent,
    pub source_id: DeviceId,
    pub cycle: Cycle,
    pub flags: AccessFlags,
    pub privilege: PrivilegeLevel,
}

impl BusAccess {
    pub fn new(intent: AccessIntent, address: Addr) -> Self {
        BusAccess {
            address,
            value: 0,
            width_bits: 8,
            mode: BusAccessMode::Decomposed,
            emulation: true,
            intent,
            source_id: 0,
            cycle: 0,
            flags: AccessFlags::LITTLE_ENDIAN,
            privilege: PrivilegeLevel::Ring3,
        }
    }

    pub fn data_read(address: Addr) -> Self {
        BusAccess::new(AccessIntent::DataRead, address)
    }

    pub fn data_write(address: Addr, value: u32) -> Self {
        let mut a = BusAccess::new(AccessIntent::DataWrite, address);
        a.value = value;
        a
    }

    pub fn debug_read(address: Addr) -> Self {
        let mut a = BusAccess::new(AccessIntent::DebugRead, address);
        a.flags |= AccessFlags::NO_SIDE_EFFECTS;
        a
    }

    /// Same access shifted by `n` bytes; used when decomposing wide
    /// operations into byte operations.
    pub fn with_address_offset(&self, n: Addr) -> Self {
        let mut a = *self;
        a.address = self.address.wrapping_add(n);
        a
    }

    pub fn is_side_effect_free(&self) -> bool {
        self.flags.contains(AccessFlags::NO_SIDE_EFFECTS) || self.is_debug_access()
    }

    pub fn is_atomic_requested(&self) -> bool {
        self.mode == BusAccessMode::Atomic || self.flags.contains(AccessFlags::ATOMIC)
    }

    pub fn is_decompose_forced(&self) -> bool {
        self.flags.contains(AccessFlags::DECOMPOSE)
    }

    pub fn is_debug_access(&self) -> bool {
        matches!(
            self.intent,
            AccessIntent::DebugRead | AccessIntent::DebugWrite
        )
    }

    pub fn is_dma_access(&self) -> bool {
        matches!(self.intent, AccessIntent::DmaRead | AccessIntent::DmaWrite)
    }

    pub fn is_read(&self) -> bool {
        self.intent.is_read()
    }

    pub fn is_write(&self) -> bool {
        self.intent.is_write()
    }
}
