use std::cell::RefCell;
use std::rc::Rc;

use orchard_bus::{MainBus, PageEntry};
use orchard_mem::{Composite, PhysicalMemory, RoMemSlice};
use orchard_platform::{
    IoHandlerEntry, IoPageDispatcher, IoRegionTarget, PeripheralKind, SlotCard, SlotCardHandle,
    SlotIoHandlers, SlotManager,
};
use orchard_types::{PagePerms, RegionTag, TargetCaps, FLOATING_BUS};

struct RomCard {
    slot: Option<u8>,
    rom: PhysicalMemory,
    expansion: Option<PhysicalMemory>,
}

impl RomCard {
    fn new(rom_byte: u8, with_expansion: bool) -> SlotCardHandle {
        let rom = PhysicalMemory::new(0x100, "card-rom");
        rom.fill(rom_byte);
        let expansion = with_expansion.then(|| {
            let x = PhysicalMemory::new(0x800, "card-xrom");
            x.fill(rom_byte.wrapping_add(1));
            x
        });
        Rc::new(RefCell::new(RomCard {
            slot: None,
            rom,
            expansion,
        }))
    }
}

impl SlotCard for RomCard {
    fn name(&self) -> &str {
        "rom-card"
    }

    fn kind(&self) -> PeripheralKind {
        PeripheralKind::Storage
    }

    fn slot_number(&self) -> Option<u8> {
        self.slot
    }

    fn set_slot_number(&mut self, slot: Option<u8>) {
        self.slot = slot;
    }

    fn io_handlers(&mut self) -> SlotIoHandlers {
        SlotIoHandlers::new()
    }

    fn rom_region(&self) -> Option<RoMemSlice> {
        Some(self.rom.read_only_slice(0, 0x100).unwrap())
    }

    fn expansion_rom_region(&self) -> Option<RoMemSlice> {
        self.expansion
            .as_ref()
            .map(|m| m.read_only_slice(0, 0x800).unwrap())
    }
}

/// The canonical $C000 page on a bare bus.
fn io_page_fixture() -> (MainBus, IoPageDispatcher, SlotManager) {
    let bus = MainBus::new(16).unwrap();
    let dispatcher = IoPageDispatcher::new();
    let slots = SlotManager::new(dispatcher.clone());
    let target = Rc::new(Composite::new(IoRegionTarget::new(
        0xC000,
        dispatcher.clone(),
        slots.clone(),
    )));
    bus.map_page_at(
        0xC000,
        PageEntry::new(
            0,
            RegionTag::Io,
            PagePerms::ALL,
            TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::HAS_SIDE_EFFECTS,
            target,
            0,
        ),
    )
    .unwrap();
    (bus, dispatcher, slots)
}

#[test]
fn soft_switches_answer_in_the_low_256_bytes() {
    let (bus, dispatcher, _slots) = io_page_fixture();
    dispatcher.set_handlers(0x30, IoHandlerEntry::read_only(Rc::new(|_, _| 0x3C)));

    assert_eq!(bus.read_u8(0xC030), 0x3C);
    assert_eq!(bus.read_u8(0xC031), FLOATING_BUS);
}

#[test]
fn reading_a_slot_rom_window_serves_the_card_and_selects_it() {
    let (bus, _dispatcher, slots) = io_page_fixture();
    slots.install(3, RomCard::new(0x33, true)).unwrap();

    assert_eq!(bus.read_u8(0xC300), 0x33);
    assert_eq!(bus.read_u8(0xC3FF), 0x33);
    assert_eq!(slots.active_expansion_slot(), Some(3));

    // The shared window now serves slot 3's expansion ROM.
    assert_eq!(bus.read_u8(0xC800), 0x34);
    assert_eq!(bus.read_u8(0xCFFE), 0x34);
}

#[test]
fn empty_slot_windows_float() {
    let (bus, _dispatcher, slots) = io_page_fixture();
    slots.install(3, RomCard::new(0x33, true)).unwrap();

    assert_eq!(bus.read_u8(0xC500), FLOATING_BUS); // no card in slot 5
    // Touching slot 5's window still moved the selection there.
    assert_eq!(slots.active_expansion_slot(), Some(5));
    assert_eq!(bus.read_u8(0xC800), FLOATING_BUS);
}

#[test]
fn cfff_releases_the_expansion_window() {
    let (bus, _dispatcher, slots) = io_page_fixture();
    slots.install(2, RomCard::new(0x22, true)).unwrap();

    bus.read_u8(0xC200);
    assert_eq!(slots.active_expansion_slot(), Some(2));

    assert_eq!(bus.read_u8(0xCFFF), FLOATING_BUS);
    assert_eq!(slots.active_expansion_slot(), None);
}

#[test]
fn a_card_without_expansion_rom_floats_the_shared_window() {
    let (bus, _dispatcher, slots) = io_page_fixture();
    slots.install(4, RomCard::new(0x44, false)).unwrap();

    bus.read_u8(0xC400);
    assert_eq!(slots.active_expansion_slot(), Some(4));
    assert_eq!(bus.read_u8(0xC800), FLOATING_BUS);
}

#[test]
fn debug_reads_never_move_the_expansion_selection() {
    let (bus, _dispatcher, slots) = io_page_fixture();
    slots.install(3, RomCard::new(0x33, true)).unwrap();

    let bytes = bus.inspect(0xC300, 2);
    assert_eq!(bytes, vec![0x33, 0x33]);
    assert_eq!(slots.active_expansion_slot(), None);

    // And a debug pass over $CFFF does not deselect either.
    bus.read_u8(0xC200);
    bus.inspect(0xCFFF, 1);
    assert_eq!(slots.active_expansion_slot(), Some(2));
}
