//! The language card: 16 KiB of RAM behind the `$D000..$FFFF` ROM, driven
//! by the sixteen soft switches at `$C080..$C08F`.
//!
//! Read source and write enable are independent: the card can read ROM
//! while writes land in RAM. Bit 0/1 of the switch offset pick the read
//! source and arm write enable, bit 3 picks which 4 KiB bank sits at
//! `$D000`. Write enable requires two consecutive reads of an odd switch
//! (the R×2 protocol); any even access write-protects and clears the
//! pre-write arm, and any switch write clears the arm.

use std::cell::RefCell;
use std::rc::Rc;

use orchard_mem::{
    BusTarget, Composite, CompositeTarget, PhysicalMemory, RamTarget, RoMemSlice, RomTarget,
    SliceError, SubTarget,
};
use orchard_platform::{IoHandlerEntry, IoPageDispatcher, MotherboardDevice};
use orchard_types::{AccessIntent, Addr, RegionTag, TargetCaps, FLOATING_BUS};

use crate::constants::{LC_BANK_SIZE, LC_RAM_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LcState {
    read_ram: bool,
    write_enabled: bool,
    pre_write: bool,
    bank2: bool,
}

impl LcState {
    /// Power-on state: reading ROM, writes enabled, bank 2 at `$D000`.
    fn power_on() -> Self {
        LcState {
            read_ram: false,
            write_enabled: true,
            pre_write: false,
            bank2: true,
        }
    }

    /// Applies one `$C08x` access to the switch state.
    fn touch(&mut self, offset: u8, is_read: bool) {
        let sw = offset & 0x0F;
        self.bank2 = sw & 0x8 == 0;
        self.read_ram = matches!(sw & 0x3, 0x0 | 0x3);
        if sw & 1 == 1 {
            if is_read {
                if self.pre_write {
                    self.write_enabled = true;
                }
                self.pre_write = true;
            } else {
                self.pre_write = false;
            }
        } else {
            self.pre_write = false;
            self.write_enabled = false;
        }
    }
}

/// Motherboard language card. Clones share switch state and RAM.
#[derive(Clone)]
pub struct LanguageCard {
    state: Rc<RefCell<LcState>>,
    ram: PhysicalMemory,
    rom: RoMemSlice,
}

impl LanguageCard {
    pub fn new(rom: RoMemSlice) -> Self {
        LanguageCard {
            state: Rc::new(RefCell::new(LcState::power_on())),
            ram: PhysicalMemory::new(LC_RAM_SIZE, "language-card"),
            rom,
        }
    }

    /// The bus target covering `$D000..$FFFF` (physical offsets
    /// `0x0000..0x2FFF`).
    pub fn region_target(&self) -> Result<Rc<dyn BusTarget>, SliceError> {
        Ok(Rc::new(Composite::new(LcRegionTarget {
            state: self.state.clone(),
            bank1: Rc::new(RamTarget::new(self.ram.slice(0, LC_BANK_SIZE)?)),
            bank2: Rc::new(RamTarget::new(self.ram.slice(LC_BANK_SIZE, LC_BANK_SIZE)?)),
            high: Rc::new(RamTarget::new(self.ram.slice(2 * LC_BANK_SIZE, 2 * LC_BANK_SIZE)?)),
            rom: Rc::new(RomTarget::new(self.rom.clone())),
        })))
    }

    pub fn is_reading_ram(&self) -> bool {
        self.state.borrow().read_ram
    }

    pub fn is_write_enabled(&self) -> bool {
        self.state.borrow().write_enabled
    }

    pub fn bank2_selected(&self) -> bool {
        self.state.borrow().bank2
    }

    pub fn ram(&self) -> &PhysicalMemory {
        &self.ram
    }
}

impl MotherboardDevice for LanguageCard {
    fn name(&self) -> &str {
        "language-card"
    }

    fn register_handlers(&self, dispatcher: &IoPageDispatcher) {
        for offset in 0x80..=0x8F {
            let read_state = self.state.clone();
            let write_state = self.state.clone();
            dispatcher.set_handlers(
                offset,
                IoHandlerEntry::read_write(
                    Rc::new(move |off, _access| {
                        read_state.borrow_mut().touch(off, true);
                        FLOATING_BUS
                    }),
                    Rc::new(move |off, _value, _access| {
                        write_state.borrow_mut().touch(off, false);
                    }),
                )
                .with_side_effects()
                .with_peek(Rc::new(|_, _| FLOATING_BUS)),
            );
        }
    }

    fn reset(&self) {
        *self.state.borrow_mut() = LcState::power_on();
    }
}

struct LcRegionTarget {
    state: Rc<RefCell<LcState>>,
    bank1: Rc<dyn BusTarget>,
    bank2: Rc<dyn BusTarget>,
    high: Rc<dyn BusTarget>,
    rom: Rc<dyn BusTarget>,
}

impl CompositeTarget for LcRegionTarget {
    fn composite_caps(&self) -> TargetCaps {
        // Routing is pure state lookup; the switches themselves live in the
        // I/O page.
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE
    }

    fn resolve_target(&self, offset: Addr, intent: AccessIntent) -> Option<SubTarget> {
        let st = self.state.borrow();
        let banked = (offset as usize) < LC_BANK_SIZE;
        let ram_sub = || {
            if banked {
                let bank = if st.bank2 { &self.bank2 } else { &self.bank1 };
                SubTarget::new(bank.clone(), offset)
            } else {
                SubTarget::new(self.high.clone(), offset - LC_BANK_SIZE as Addr)
            }
        };
        if intent.is_read() {
            if st.read_ram {
                Some(ram_sub())
            } else {
                Some(SubTarget::new(self.rom.clone(), offset))
            }
        } else if st.write_enabled {
            Some(ram_sub())
        } else {
            // Write-protected: the write is dropped on the floor, no fault.
            None
        }
    }

    fn sub_region_tag(&self, _offset: Addr) -> RegionTag {
        if self.state.borrow().read_ram {
            RegionTag::Ram
        } else {
            RegionTag::Rom
        }
    }
}
