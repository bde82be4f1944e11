//! Auxiliary memory: a second 48 KiB RAM overlaid on main memory through
//! bus layers.
//!
//! Two layers are wired at provisioning time: `aux-zp` covers the zero
//! page region (the ALTZP switch pair at `$C008/$C009` drives it) and
//! `aux-mem` covers the whole `$0000..$BFFF` range for full bank flips.
//! The base mappings are snapshotted before either layer ever activates,
//! so deactivation always lands back on main RAM.

use std::cell::Cell;
use std::rc::Rc;

use orchard_bus::{LayerError, LayeredMapping, MainBus, MapError};
use orchard_mem::{PhysicalMemory, RamTarget, SliceError};
use orchard_platform::{IoHandlerEntry, IoPageDispatcher, MotherboardDevice};
use orchard_types::{PagePerms, RegionTag, TargetCaps, PAGE_SHIFT};

use crate::constants::{MAIN_RAM_SIZE, MOTHERBOARD_ID};

pub const AUX_ZP_LAYER: &str = "aux-zp";
pub const AUX_MEM_LAYER: &str = "aux-mem";

const AUX_ZP_SIZE: u32 = 0x1000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuxSetupError {
    #[error(transparent)]
    Layer(#[from] LayerError),
    #[error(transparent)]
    Map(#[from] MapError),
    #[error(transparent)]
    Slice(#[from] SliceError),
}

/// Motherboard auxiliary-memory device. Clones share the aux RAM and
/// switch state.
#[derive(Clone)]
pub struct AuxMemoryCard {
    bus: MainBus,
    aux_ram: PhysicalMemory,
    alt_zp: Rc<Cell<bool>>,
}

impl AuxMemoryCard {
    /// Creates the aux RAM, registers both layers on the bus, and
    /// snapshots the base mappings they shadow.
    pub fn new(bus: MainBus) -> Result<Self, AuxSetupError> {
        let aux_ram = PhysicalMemory::new(MAIN_RAM_SIZE, "aux");
        let zp_target = Rc::new(RamTarget::new(aux_ram.slice(0, AUX_ZP_SIZE as usize)?));
        let mem_target = Rc::new(RamTarget::new(aux_ram.slice(0, MAIN_RAM_SIZE)?));

        bus.save_base_mapping_range(0, MAIN_RAM_SIZE >> PAGE_SHIFT)?;

        bus.create_layer(AUX_ZP_LAYER, 20)?;
        bus.add_layered_mapping(LayeredMapping {
            virtual_base: 0,
            size: AUX_ZP_SIZE,
            layer: AUX_ZP_LAYER.to_string(),
            device_id: MOTHERBOARD_ID,
            region: RegionTag::Ram,
            perms: PagePerms::ALL,
            caps: TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::SUPPORTS_WIDE,
            target: zp_target,
            phys_base: 0,
        })?;

        bus.create_layer(AUX_MEM_LAYER, 10)?;
        bus.add_layered_mapping(LayeredMapping {
            virtual_base: 0,
            size: MAIN_RAM_SIZE as u32,
            layer: AUX_MEM_LAYER.to_string(),
            device_id: MOTHERBOARD_ID,
            region: RegionTag::Ram,
            perms: PagePerms::ALL,
            caps: TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::SUPPORTS_WIDE,
            target: mem_target,
            phys_base: 0,
        })?;

        Ok(AuxMemoryCard {
            bus,
            aux_ram,
            alt_zp: Rc::new(Cell::new(false)),
        })
    }

    pub fn set_alt_zp(&self, on: bool) -> Result<(), LayerError> {
        self.alt_zp.set(on);
        if on {
            self.bus.activate_layer(AUX_ZP_LAYER)
        } else {
            self.bus.deactivate_layer(AUX_ZP_LAYER)
        }
    }

    pub fn alt_zp(&self) -> bool {
        self.alt_zp.get()
    }

    /// Flips the whole `$0000..$BFFF` window to (or from) aux RAM.
    pub fn set_aux_memory(&self, on: bool) -> Result<(), LayerError> {
        if on {
            self.bus.activate_layer(AUX_MEM_LAYER)
        } else {
            self.bus.deactivate_layer(AUX_MEM_LAYER)
        }
    }

    pub fn aux_ram(&self) -> &PhysicalMemory {
        &self.aux_ram
    }
}

impl MotherboardDevice for AuxMemoryCard {
    fn name(&self) -> &str {
        "aux-memory"
    }

    fn register_handlers(&self, dispatcher: &IoPageDispatcher) {
        // $C008 write: main zero page. $C009 write: aux zero page.
        for (offset, on) in [(0x08u8, false), (0x09u8, true)] {
            let card = self.clone();
            dispatcher.set_handlers(
                offset,
                IoHandlerEntry::write_only(Rc::new(move |_off, _value, _access| {
                    let _ = card.set_alt_zp(on);
                }))
                .with_side_effects(),
            );
        }
        // $C016 read: bit 7 reports ALTZP. Pure status, no side effects.
        let alt_zp = self.alt_zp.clone();
        dispatcher.set_handlers(
            0x16,
            IoHandlerEntry::read_only(Rc::new(move |_off, _access| {
                if alt_zp.get() {
                    0x80
                } else {
                    0x00
                }
            })),
        );
    }

    fn reset(&self) {
        let _ = self.set_alt_zp(false);
        let _ = self.set_aux_memory(false);
    }
}
