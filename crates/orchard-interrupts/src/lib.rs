//! Open-collector signal aggregation.
//!
//! Each line tracks the set of device ids currently pulling it; the line is
//! asserted while the set is non-empty, so two devices sharing IRQ behave
//! like wired-OR hardware. NMI additionally latches its rising edge until
//! the CPU consumes it.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

use orchard_types::{Cycle, DeviceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalLine {
    Irq,
    Nmi,
    Reset,
    Rdy,
    DmaReq,
}

impl SignalLine {
    pub const COUNT: usize = 5;

    fn index(self) -> usize {
        match self {
            SignalLine::Irq => 0,
            SignalLine::Nmi => 1,
            SignalLine::Reset => 2,
            SignalLine::Rdy => 3,
            SignalLine::DmaReq => 4,
        }
    }
}

impl core::fmt::Display for SignalLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SignalLine::Irq => "IRQ",
            SignalLine::Nmi => "NMI",
            SignalLine::Reset => "RESET",
            SignalLine::Rdy => "RDY",
            SignalLine::DmaReq => "DMAREQ",
        };
        f.write_str(s)
    }
}

/// One level transition on a line. `device_id` is the device whose
/// assert/deassert caused the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalChange {
    pub line: SignalLine,
    pub asserted: bool,
    pub device_id: DeviceId,
    pub cycle: Cycle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&SignalChange)>;

#[derive(Default)]
struct SignalState {
    asserting: [BTreeSet<DeviceId>; SignalLine::COUNT],
    nmi_edge: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

/// Handle to the machine's signal lines. Clones share state.
#[derive(Clone, Default)]
pub struct SignalBus {
    state: Rc<RefCell<SignalState>>,
}

impl SignalBus {
    pub fn new() -> Self {
        SignalBus::default()
    }

    /// Adds `device_id` to the line's asserting set. Emits a transition
    /// (and, for NMI, latches the edge) only when the set goes from empty
    /// to non-empty; re-asserting an already-asserted line does nothing.
    pub fn assert(&self, line: SignalLine, device_id: DeviceId, cycle: Cycle) {
        let change = {
            let mut st = self.state.borrow_mut();
            let set = &mut st.asserting[line.index()];
            let was_empty = set.is_empty();
            set.insert(device_id);
            if !was_empty {
                return;
            }
            if line == SignalLine::Nmi {
                st.nmi_edge = true;
            }
            tracing::trace!(%line, device_id, cycle, "line asserted");
            SignalChange {
                line,
                asserted: true,
                device_id,
                cycle,
            }
        };
        self.notify(&change);
    }

    /// Removes `device_id` from the line's asserting set. Emits a
    /// transition only when the last asserter lets go. A latched NMI edge
    /// survives the deassert until consumed.
    pub fn deassert(&self, line: SignalLine, device_id: DeviceId, cycle: Cycle) {
        let change = {
            let mut st = self.state.borrow_mut();
            let set = &mut st.asserting[line.index()];
            if !set.remove(&device_id) || !set.is_empty() {
                return;
            }
            tracing::trace!(%line, device_id, cycle, "line released");
            SignalChange {
                line,
                asserted: false,
                device_id,
                cycle,
            }
        };
        self.notify(&change);
    }

    pub fn is_asserted(&self, line: SignalLine) -> bool {
        !self.state.borrow().asserting[line.index()].is_empty()
    }

    /// Returns and clears the latched NMI rising edge.
    pub fn consume_nmi_edge(&self) -> bool {
        let mut st = self.state.borrow_mut();
        core::mem::take(&mut st.nmi_edge)
    }

    /// Clears every asserting set and the NMI latch. Listeners stay
    /// registered.
    pub fn reset(&self) {
        let mut st = self.state.borrow_mut();
        for set in &mut st.asserting {
            set.clear();
        }
        st.nmi_edge = false;
    }

    /// Registers a listener invoked synchronously on every level
    /// transition.
    pub fn subscribe(&self, listener: Rc<dyn Fn(&SignalChange)>) -> ListenerId {
        let mut st = self.state.borrow_mut();
        let id = ListenerId(st.next_listener);
        st.next_listener += 1;
        st.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.state.borrow_mut().listeners.retain(|(l, _)| *l != id);
    }

    fn notify(&self, change: &SignalChange) {
        // Snapshot so a listener can subscribe/unsubscribe or assert
        // another line without re-entering the borrow.
        let listeners: Vec<Listener> = self
            .state
            .borrow()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for l in listeners {
            l(change);
        }
    }
}

impl core::fmt::Debug for SignalBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let st = self.state.borrow();
        f.debug_struct("SignalBus")
            .field("asserting", &st.asserting)
            .field("nmi_edge", &st.nmi_edge)
            .field("listeners", &st.listeners.len())
            .finish()
    }
}
