use std::cell::RefCell;
use std::rc::Rc;

use orchard_mem::BusTarget;
use orchard_types::{Addr, BusAccess, TargetCaps, FLOATING_BUS};

pub type IoReadFn = Rc<dyn Fn(u8, &BusAccess) -> u8>;
pub type IoWriteFn = Rc<dyn Fn(u8, u8, &BusAccess)>;

/// Handlers for one I/O page offset. An entry with neither handler behaves
/// like an unwired address: reads float, writes vanish.
///
/// `side_effects` declares that touching the handlers mutates controller
/// state; side-effect-free accesses then skip them entirely, answering
/// reads from `peek` (or the floating bus) and dropping writes.
#[derive(Clone, Default)]
pub struct IoHandlerEntry {
    pub read: Option<IoReadFn>,
    pub write: Option<IoWriteFn>,
    pub peek: Option<IoReadFn>,
    pub side_effects: bool,
}

impl IoHandlerEntry {
    pub fn read_only(f: IoReadFn) -> Self {
        IoHandlerEntry {
            read: Some(f),
            ..Default::default()
        }
    }

    pub fn write_only(f: IoWriteFn) -> Self {
        IoHandlerEntry {
            write: Some(f),
            ..Default::default()
        }
    }

    pub fn read_write(read: IoReadFn, write: IoWriteFn) -> Self {
        IoHandlerEntry {
            read: Some(read),
            write: Some(write),
            ..Default::default()
        }
    }

    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = true;
        self
    }

    pub fn with_peek(mut self, peek: IoReadFn) -> Self {
        self.peek = Some(peek);
        self
    }

    fn is_empty(&self) -> bool {
        self.read.is_none() && self.write.is_none()
    }
}

struct DispatcherState {
    entries: Vec<IoHandlerEntry>,
}

/// 256-offset soft-switch dispatch table. Clones share state; the slot
/// manager and the bus-facing target each hold one.
#[derive(Clone)]
pub struct IoPageDispatcher {
    state: Rc<RefCell<DispatcherState>>,
}

impl Default for IoPageDispatcher {
    fn default() -> Self {
        IoPageDispatcher::new()
    }
}

impl IoPageDispatcher {
    pub fn new() -> Self {
        IoPageDispatcher {
            state: Rc::new(RefCell::new(DispatcherState {
                entries: vec![IoHandlerEntry::default(); 256],
            })),
        }
    }

    pub fn set_handlers(&self, offset: u8, entry: IoHandlerEntry) {
        self.state.borrow_mut().entries[offset as usize] = entry;
    }

    pub fn set_read_handler(&self, offset: u8, f: IoReadFn) {
        self.state.borrow_mut().entries[offset as usize].read = Some(f);
    }

    pub fn set_write_handler(&self, offset: u8, f: IoWriteFn) {
        self.state.borrow_mut().entries[offset as usize].write = Some(f);
    }

    pub fn clear_handlers(&self, offset: u8) {
        self.state.borrow_mut().entries[offset as usize] = IoHandlerEntry::default();
    }

    pub fn has_handlers(&self, offset: u8) -> bool {
        !self.state.borrow().entries[offset as usize].is_empty()
    }

    /// Dispatches a read. No handler: floating bus. Side-effect-free
    /// access against a side-effectful handler: best-effort `peek`, never
    /// the handler itself.
    pub fn read(&self, offset: u8, access: &BusAccess) -> u8 {
        let (read, peek, side_effects) = {
            let st = self.state.borrow();
            let e = &st.entries[offset as usize];
            (e.read.clone(), e.peek.clone(), e.side_effects)
        };
        let Some(read) = read else {
            return FLOATING_BUS;
        };
        if side_effects && access.is_side_effect_free() {
            return match peek {
                Some(peek) => peek(offset, access),
                None => FLOATING_BUS,
            };
        }
        read(offset, access)
    }

    /// Dispatches a write. No handler: dropped. Side-effect-free access
    /// against a side-effectful handler: dropped.
    pub fn write(&self, offset: u8, value: u8, access: &BusAccess) {
        let (write, side_effects) = {
            let st = self.state.borrow();
            let e = &st.entries[offset as usize];
            (e.write.clone(), e.side_effects)
        };
        let Some(write) = write else { return };
        if side_effects && access.is_side_effect_free() {
            return;
        }
        write(offset, value, access);
    }

    /// Binds a card's sixteen device-select handlers at
    /// `$C080 + slot * $10`. Slot 0 belongs to the motherboard.
    pub fn install_slot_handlers(&self, slot: usize, handlers: SlotIoHandlers) {
        assert!(slot < 8, "slot {slot} out of range");
        let base = 0x80 + slot * 0x10;
        let mut st = self.state.borrow_mut();
        for (i, entry) in handlers.into_entries().into_iter().enumerate() {
            st.entries[base + i] = entry;
        }
    }

    pub fn remove_slot_handlers(&self, slot: usize) {
        assert!(slot < 8, "slot {slot} out of range");
        let base = 0x80 + slot * 0x10;
        let mut st = self.state.borrow_mut();
        for i in 0..16 {
            st.entries[base + i] = IoHandlerEntry::default();
        }
    }
}

/// Sixteen consecutive handler entries, as installed for one slot.
#[derive(Clone, Default)]
pub struct SlotIoHandlers {
    entries: [IoHandlerEntry; 16],
}

impl SlotIoHandlers {
    pub fn new() -> Self {
        SlotIoHandlers::default()
    }

    pub fn set(&mut self, index: usize, entry: IoHandlerEntry) {
        self.entries[index] = entry;
    }

    pub fn with(mut self, index: usize, entry: IoHandlerEntry) -> Self {
        self.set(index, entry);
        self
    }

    fn into_entries(self) -> [IoHandlerEntry; 16] {
        self.entries
    }
}

/// Bus target serving the dispatcher's 256 offsets.
pub struct IoPageTarget {
    dispatcher: IoPageDispatcher,
}

impl IoPageTarget {
    pub fn new(dispatcher: IoPageDispatcher) -> Self {
        IoPageTarget { dispatcher }
    }
}

impl BusTarget for IoPageTarget {
    fn caps(&self) -> TargetCaps {
        TargetCaps::SUPPORTS_PEEK | TargetCaps::HAS_SIDE_EFFECTS | TargetCaps::TIMING_SENSITIVE
    }

    fn read8(&self, phys: Addr, access: &BusAccess) -> u8 {
        self.dispatcher.read((phys & 0xFF) as u8, access)
    }

    fn write8(&self, phys: Addr, value: u8, access: &BusAccess) {
        self.dispatcher.write((phys & 0xFF) as u8, value, access);
    }
}
