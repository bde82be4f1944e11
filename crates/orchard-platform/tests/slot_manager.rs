use std::cell::RefCell;
use std::rc::Rc;

use orchard_mem::{PhysicalMemory, RoMemSlice};
use orchard_platform::{
    IoHandlerEntry, IoPageDispatcher, PeripheralKind, SlotCard, SlotCardHandle, SlotError,
    SlotIoHandlers, SlotManager,
};
use orchard_types::BusAccess;

#[derive(Default)]
struct CardEvents {
    selected: u32,
    deselected: u32,
    resets: u32,
}

struct TestCard {
    name: String,
    slot: Option<u8>,
    rom: Option<PhysicalMemory>,
    expansion: Option<PhysicalMemory>,
    events: Rc<RefCell<CardEvents>>,
}

impl TestCard {
    fn new(name: &str, rom_byte: u8) -> (SlotCardHandle, Rc<RefCell<CardEvents>>) {
        let rom = PhysicalMemory::new(0x100, format!("{name}-rom"));
        rom.fill(rom_byte);
        let expansion = PhysicalMemory::new(0x800, format!("{name}-xrom"));
        expansion.fill(rom_byte ^ 0xFF);
        let events = Rc::new(RefCell::new(CardEvents::default()));
        let card = Rc::new(RefCell::new(TestCard {
            name: name.to_string(),
            slot: None,
            rom: Some(rom),
            expansion: Some(expansion),
            events: events.clone(),
        }));
        (card, events)
    }
}

impl SlotCard for TestCard {
    fn name(&self) -> &str {
        &self.name
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
        SlotIoHandlers::new().with(0, IoHandlerEntry::read_only(Rc::new(|_, _| 0x5A)))
    }

    fn rom_region(&self) -> Option<RoMemSlice> {
        self.rom
            .as_ref()
            .map(|m| m.read_only_slice(0, 0x100).unwrap())
    }

    fn expansion_rom_region(&self) -> Option<RoMemSlice> {
        self.expansion
            .as_ref()
            .map(|m| m.read_only_slice(0, 0x800).unwrap())
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
}

fn manager() -> SlotManager {
    SlotManager::new(IoPageDispatcher::new())
}

#[test]
fn install_wires_the_slot_and_sets_the_slot_number() {
    let slots = manager();
    let (card, _) = TestCard::new("disk", 0xD0);

    slots.install(6, card.clone()).unwrap();
    assert_eq!(card.borrow().slot_number(), Some(6));
    assert!(slots.card(6).is_some());

    // Device-select handlers appear at $C0E0 for slot 6.
    let value = slots
        .dispatcher()
        .read(0xE0, &BusAccess::data_read(0xC0E0));
    assert_eq!(value, 0x5A);

    assert_eq!(slots.slot_rom_region(6).unwrap().read(0), 0xD0);
}

#[test]
fn occupied_and_out_of_range_slots_are_rejected() {
    let slots = manager();
    let (first, _) = TestCard::new("one", 1);
    let (second, _) = TestCard::new("two", 2);

    slots.install(3, first).unwrap();
    assert_eq!(slots.install(3, second.clone()).unwrap_err(), SlotError::SlotOccupied(3));
    assert_eq!(
        slots.install(0, second.clone()).unwrap_err(),
        SlotError::SlotOutOfRange(0)
    );
    assert_eq!(
        slots.install(8, second).unwrap_err(),
        SlotError::SlotOutOfRange(8)
    );
}

#[test]
fn expansion_selection_invokes_the_card_callbacks() {
    let slots = manager();
    let (card1, ev1) = TestCard::new("one", 1);
    let (card2, ev2) = TestCard::new("two", 2);
    slots.install(1, card1).unwrap();
    slots.install(2, card2).unwrap();

    slots.select_expansion_slot(1);
    assert_eq!(slots.active_expansion_slot(), Some(1));
    assert_eq!(ev1.borrow().selected, 1);

    // Re-selecting the same slot is not a deselect/select bounce.
    slots.select_expansion_slot(1);
    assert_eq!(ev1.borrow().selected, 1);
    assert_eq!(ev1.borrow().deselected, 0);

    slots.select_expansion_slot(2);
    assert_eq!(ev1.borrow().deselected, 1);
    assert_eq!(ev2.borrow().selected, 1);

    slots.deselect_expansion_slot();
    assert_eq!(ev2.borrow().deselected, 1);
    assert_eq!(slots.active_expansion_slot(), None);

    // Idempotent.
    slots.deselect_expansion_slot();
    assert_eq!(ev2.borrow().deselected, 1);
}

#[test]
fn slot_rom_addresses_select_their_slot() {
    let slots = manager();
    let (card, ev) = TestCard::new("one", 1);
    slots.install(4, card).unwrap();

    slots.handle_slot_rom_access(0xC400);
    assert_eq!(slots.active_expansion_slot(), Some(4));
    assert_eq!(ev.borrow().selected, 1);

    // The soft-switch page never selects.
    slots.deselect_expansion_slot();
    slots.handle_slot_rom_access(0xC042);
    assert_eq!(slots.active_expansion_slot(), None);

    // Addresses outside $C100..$C7FF are ignored too.
    slots.handle_slot_rom_access(0xC900);
    slots.handle_slot_rom_access(0x4200);
    assert_eq!(slots.active_expansion_slot(), None);
}

#[test]
fn removing_a_card_releases_everything_it_held() {
    let slots = manager();
    let (card, ev) = TestCard::new("one", 1);
    slots.install(5, card.clone()).unwrap();
    slots.select_expansion_slot(5);

    slots.remove(5).unwrap();
    assert_eq!(ev.borrow().deselected, 1);
    assert_eq!(slots.active_expansion_slot(), None);
    assert_eq!(card.borrow().slot_number(), None);
    assert!(slots.card(5).is_none());
    assert_eq!(
        slots
            .dispatcher()
            .read(0xD0, &BusAccess::data_read(0xC0D0)),
        0xFF
    );

    // Removing an empty slot is a no-op.
    slots.remove(5).unwrap();
    assert_eq!(slots.remove(0).unwrap_err(), SlotError::SlotOutOfRange(0));
}

#[test]
fn reset_deselects_and_fans_out_to_every_card() {
    let slots = manager();
    let (card1, ev1) = TestCard::new("one", 1);
    let (card2, ev2) = TestCard::new("two", 2);
    slots.install(1, card1).unwrap();
    slots.install(7, card2).unwrap();
    slots.select_expansion_slot(7);

    slots.reset();
    assert_eq!(slots.active_expansion_slot(), None);
    assert_eq!(ev2.borrow().deselected, 1);
    assert_eq!(ev1.borrow().resets, 1);
    assert_eq!(ev2.borrow().resets, 1);
}
