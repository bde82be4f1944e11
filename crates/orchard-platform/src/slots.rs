use std::cell::RefCell;
use std::rc::Rc;

use orchard_mem::{BusTarget, CompositeTarget, RoMemSlice, RomTarget, SubTarget};
use orchard_sched::EventContext;
use orchard_types::{AccessIntent, Addr, BusAccess, RegionTag, TargetCaps};

use crate::{IoPageDispatcher, IoPageTarget, SlotIoHandlers};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SlotError {
    #[error("slot {0} out of range; cards occupy slots 1..=7")]
    SlotOutOfRange(usize),
    #[error("slot {0} is already occupied")]
    SlotOccupied(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeripheralKind {
    Storage,
    Video,
    Audio,
    Input,
    Clock,
    Serial,
    Other,
}

/// A card plugged into slots 1..=7.
///
/// Cards do not retain the dispatcher: their soft-switch handlers are
/// handed over once at install time and live in the dispatcher's table
/// until removal.
pub trait SlotCard {
    fn name(&self) -> &str;

    fn kind(&self) -> PeripheralKind;

    fn device_type(&self) -> &str {
        "peripheral"
    }

    fn slot_number(&self) -> Option<u8>;

    fn set_slot_number(&mut self, slot: Option<u8>);

    /// The sixteen device-select handlers installed at
    /// `$C080 + slot * $10`.
    fn io_handlers(&mut self) -> SlotIoHandlers;

    /// The card's 256-byte ROM, visible at `$Cs00..$Cs FF`.
    fn rom_region(&self) -> Option<RoMemSlice> {
        None
    }

    /// The card's 2 KiB expansion ROM, visible at `$C800..$CFFF` while the
    /// card is selected.
    fn expansion_rom_region(&self) -> Option<RoMemSlice> {
        None
    }

    fn on_expansion_rom_selected(&mut self) {}

    fn on_expansion_rom_deselected(&mut self) {}

    fn reset(&mut self) {}

    fn initialize(&mut self, _ctx: &EventContext) {}
}

pub type SlotCardHandle = Rc<RefCell<dyn SlotCard>>;

/// A device soldered to the motherboard: registers handlers directly on
/// the dispatcher instead of occupying a slot.
pub trait MotherboardDevice {
    fn name(&self) -> &str;

    fn register_handlers(&self, dispatcher: &IoPageDispatcher);

    fn reset(&self) {}

    fn initialize(&self, _ctx: &EventContext) {}
}

#[derive(Default)]
struct SlotState {
    cards: [Option<SlotCardHandle>; 8],
    rom_targets: [Option<Rc<dyn BusTarget>>; 8],
    expansion_targets: [Option<Rc<dyn BusTarget>>; 8],
    active_expansion: Option<u8>,
}

/// Owns the seven expansion slots: card installation, the per-slot ROM
/// windows, and which card currently holds the shared expansion-ROM
/// window. Clones share state.
#[derive(Clone)]
pub struct SlotManager {
    dispatcher: IoPageDispatcher,
    state: Rc<RefCell<SlotState>>,
}

impl SlotManager {
    pub fn new(dispatcher: IoPageDispatcher) -> Self {
        SlotManager {
            dispatcher,
            state: Rc::new(RefCell::new(SlotState::default())),
        }
    }

    pub fn dispatcher(&self) -> &IoPageDispatcher {
        &self.dispatcher
    }

    pub fn install(&self, slot: usize, card: SlotCardHandle) -> Result<(), SlotError> {
        if !(1..=7).contains(&slot) {
            return Err(SlotError::SlotOutOfRange(slot));
        }
        if self.state.borrow().cards[slot].is_some() {
            return Err(SlotError::SlotOccupied(slot));
        }
        let (handlers, rom, expansion) = {
            let mut c = card.borrow_mut();
            tracing::debug!(slot, card = c.name(), "install card");
            c.set_slot_number(Some(slot as u8));
            (c.io_handlers(), c.rom_region(), c.expansion_rom_region())
        };
        self.dispatcher.install_slot_handlers(slot, handlers);
        let mut st = self.state.borrow_mut();
        st.rom_targets[slot] = rom.map(|r| Rc::new(RomTarget::new(r)) as Rc<dyn BusTarget>);
        st.expansion_targets[slot] =
            expansion.map(|r| Rc::new(RomTarget::new(r)) as Rc<dyn BusTarget>);
        st.cards[slot] = Some(card);
        Ok(())
    }

    /// Removes the card in `slot`, deselecting its expansion ROM first if
    /// it holds the shared window. No-op when the slot is empty.
    pub fn remove(&self, slot: usize) -> Result<(), SlotError> {
        if !(1..=7).contains(&slot) {
            return Err(SlotError::SlotOutOfRange(slot));
        }
        if self.state.borrow().active_expansion == Some(slot as u8) {
            self.deselect_expansion_slot();
        }
        let card = {
            let mut st = self.state.borrow_mut();
            st.rom_targets[slot] = None;
            st.expansion_targets[slot] = None;
            st.cards[slot].take()
        };
        if let Some(card) = card {
            self.dispatcher.remove_slot_handlers(slot);
            let mut c = card.borrow_mut();
            tracing::debug!(slot, card = c.name(), "remove card");
            c.set_slot_number(None);
        }
        Ok(())
    }

    pub fn card(&self, slot: usize) -> Option<SlotCardHandle> {
        self.state.borrow().cards.get(slot)?.clone()
    }

    pub fn slot_rom_region(&self, slot: usize) -> Option<RoMemSlice> {
        self.card(slot)?.borrow().rom_region()
    }

    pub fn expansion_rom_region(&self, slot: usize) -> Option<RoMemSlice> {
        self.card(slot)?.borrow().expansion_rom_region()
    }

    pub(crate) fn slot_rom_target(&self, slot: usize) -> Option<Rc<dyn BusTarget>> {
        self.state.borrow().rom_targets.get(slot)?.clone()
    }

    pub(crate) fn expansion_rom_target(&self, slot: usize) -> Option<Rc<dyn BusTarget>> {
        self.state.borrow().expansion_targets.get(slot)?.clone()
    }

    pub fn active_expansion_slot(&self) -> Option<u8> {
        self.state.borrow().active_expansion
    }

    /// Hands the shared expansion-ROM window to `slot`. The previous
    /// holder (if any) is told it lost the window; selecting the current
    /// holder again is a no-op.
    pub fn select_expansion_slot(&self, slot: u8) {
        let (prev, next) = {
            let mut st = self.state.borrow_mut();
            if st.active_expansion == Some(slot) {
                return;
            }
            let prev = st
                .active_expansion
                .and_then(|s| st.cards[s as usize].clone());
            st.active_expansion = Some(slot);
            (prev, st.cards[slot as usize].clone())
        };
        tracing::debug!(slot, "select expansion rom");
        if let Some(card) = prev {
            card.borrow_mut().on_expansion_rom_deselected();
        }
        if let Some(card) = next {
            card.borrow_mut().on_expansion_rom_selected();
        }
    }

    /// Releases the shared expansion-ROM window. Idempotent.
    pub fn deselect_expansion_slot(&self) {
        let prev = {
            let mut st = self.state.borrow_mut();
            let Some(slot) = st.active_expansion.take() else {
                return;
            };
            st.cards[slot as usize].clone()
        };
        tracing::debug!("deselect expansion rom");
        if let Some(card) = prev {
            card.borrow_mut().on_expansion_rom_deselected();
        }
    }

    /// `$Cs00..$CsFF` accesses (s in 1..=7) select slot `s`'s expansion
    /// ROM; the soft-switch page `$C0xx` is ignored.
    pub fn handle_slot_rom_access(&self, addr: Addr) {
        if (0xC100..0xC800).contains(&addr) {
            self.select_expansion_slot(((addr >> 8) & 0xF) as u8);
        }
    }

    /// Deselects the expansion window and resets every installed card.
    pub fn reset(&self) {
        self.deselect_expansion_slot();
        let cards: Vec<SlotCardHandle> = {
            let st = self.state.borrow();
            st.cards.iter().flatten().cloned().collect()
        };
        for card in cards {
            card.borrow_mut().reset();
        }
    }
}

/// The composite target behind the canonical machine's `$C000` page:
/// soft switches in the low 256 bytes, per-slot ROM at `$C100..$C7FF`,
/// and the shared 2 KiB expansion-ROM window at `$C800..$CFFF`.
///
/// Accessing a slot's ROM window hands that slot the expansion window (the
/// hardware's `$CsXX` select), and touching `$CFFF` releases it. Both side
/// effects are suppressed for side-effect-free accesses.
pub struct IoRegionTarget {
    base: Addr,
    io: Rc<dyn BusTarget>,
    slots: SlotManager,
}

impl IoRegionTarget {
    pub fn new(base: Addr, dispatcher: IoPageDispatcher, slots: SlotManager) -> Self {
        IoRegionTarget {
            base,
            io: Rc::new(IoPageTarget::new(dispatcher)),
            slots,
        }
    }
}

impl CompositeTarget for IoRegionTarget {
    fn composite_caps(&self) -> TargetCaps {
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_POKE | TargetCaps::HAS_SIDE_EFFECTS
    }

    fn resolve_target(&self, offset: Addr, _intent: AccessIntent) -> Option<SubTarget> {
        match offset {
            0x000..=0x0FF => Some(SubTarget::new(self.io.clone(), offset)),
            0x100..=0x7FF => {
                let slot = (offset >> 8) as usize;
                let target = self.slots.slot_rom_target(slot)?;
                Some(SubTarget::new(target, offset & 0xFF))
            }
            0x800..=0xFFF => {
                let slot = self.slots.active_expansion_slot()?;
                let target = self.slots.expansion_rom_target(slot as usize)?;
                Some(SubTarget::new(target, offset - 0x800))
            }
            _ => None,
        }
    }

    fn sub_region_tag(&self, offset: Addr) -> RegionTag {
        if offset < 0x100 {
            RegionTag::Io
        } else {
            RegionTag::Slot
        }
    }

    fn on_access(&self, offset: Addr, _access: &BusAccess) {
        if offset == 0xFFF {
            self.slots.deselect_expansion_slot();
            return;
        }
        self.slots.handle_slot_rom_access(self.base + offset);
    }
}
