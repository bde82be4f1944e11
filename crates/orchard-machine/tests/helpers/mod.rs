#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use orchard_machine::{Machine, ProvisioningBundle};
use orchard_mem::{PhysicalMemory, RoMemSlice};
use orchard_platform::{
    IoHandlerEntry, PeripheralKind, SlotCard, SlotCardHandle, SlotIoHandlers,
};
use orchard_sched::EventContext;

#[derive(Default)]
pub struct CardEvents {
    pub initialized: u32,
    pub resets: u32,
    pub selected: u32,
    pub deselected: u32,
}

pub struct TestCard {
    slot: Option<u8>,
    rom: PhysicalMemory,
    pub events: Rc<RefCell<CardEvents>>,
}

impl TestCard {
    pub fn new(rom_byte: u8) -> (SlotCardHandle, Rc<RefCell<CardEvents>>) {
        let rom = PhysicalMemory::new(0x100, "test-card-rom");
        rom.fill(rom_byte);
        let events = Rc::new(RefCell::new(CardEvents::default()));
        let card = Rc::new(RefCell::new(TestCard {
            slot: None,
            rom,
            events: events.clone(),
        }));
        (card, events)
    }
}

impl SlotCard for TestCard {
    fn name(&self) -> &str {
        "test-card"
    }

    fn kind(&self) -> PeripheralKind {
        PeripheralKind::Other
    }

    fn slot_number(&self) -> Option<u8> {
        self.slot
    }

    fn set_slot_number(&mut self, slot: Option<u8>) {
        self.slot = slot;
    }

    fn io_handlers(&mut self) -> SlotIoHandlers {
        SlotIoHandlers::new().with(0, IoHandlerEntry::read_only(Rc::new(|_, _| 0x6C)))
    }

    fn rom_region(&self) -> Option<RoMemSlice> {
        Some(self.rom.read_only_slice(0, 0x100).unwrap())
    }

    fn on_expansion_rom_selected(&mut self) {
        self.events.borrow_mut().selected += 1;
    }

    fn on_expansion_rom_deselected(&mut self) {
        self.events.borrow_mut().deselected += 1;
    }

    fn reset(&mut self) {
        self.events.borrow_mut().resets += 1;
    }

    fn initialize(&mut self, _ctx: &EventContext) {
        self.events.borrow_mut().initialized += 1;
    }
}

pub fn stock_machine() -> Machine {
    Machine::new(ProvisioningBundle::default()).unwrap()
}
