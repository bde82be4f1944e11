//! Fixed points of the canonical 64 KiB memory map.

use orchard_types::Addr;

/// Motherboard device id for mappings and signal assertions.
pub const MOTHERBOARD_ID: u16 = 0;

pub const MAIN_RAM_SIZE: usize = 0xC000;

/// Soft-switch / slot page.
pub const IO_PAGE_BASE: Addr = 0xC000;

pub const SLOT_ROM_BASE: Addr = 0xC100;
pub const EXPANSION_ROM_BASE: Addr = 0xC800;
pub const EXPANSION_ROM_SIZE: usize = 0x800;

/// Upper ROM / language-card territory.
pub const HIGH_ROM_BASE: Addr = 0xD000;
pub const HIGH_ROM_SIZE: usize = 0x3000;

/// The double-banked first 4 KiB of the language card.
pub const LC_BANK_SIZE: usize = 0x1000;
/// Language-card RAM behind `$D000..$FFFF`: two 4 KiB banks plus the fixed
/// 8 KiB above `$E000`.
pub const LC_RAM_SIZE: usize = 0x4000;

/// Name under which the provisioning bundle supplies the motherboard ROM.
pub const SYSTEM_ROM_IMAGE: &str = "system";
