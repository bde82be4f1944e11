//! Cycle-stamped, deterministic event scheduling.
//!
//! Events are ordered by `(cycle, priority, sequence)`; the sequence number
//! is assigned at insertion, so events agreeing on cycle and priority
//! dispatch in FIFO order. Cancellation tombstones the handle and reclaims
//! the heap slot lazily; dispatch never observes a cancelled event.
//!
//! Given identical initial state and identical call sequences, two
//! schedulers produce identical callback orders and identical final `now` —
//! there is no wall clock anywhere, `Cycle` is the only time.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::rc::Rc;

use orchard_bus::MainBus;
use orchard_interrupts::SignalBus;
use orchard_types::Cycle;

/// How many cancelled handles may pile up before the queue is compacted.
const TOMBSTONE_COMPACT_THRESHOLD: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("dispatch requires a bound event context; call set_context after construction/reset")]
    ContextUnbound,
}

/// Stable identifier for a scheduled event, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

impl EventHandle {
    pub fn from_raw(raw: u64) -> Self {
        EventHandle(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Classification tag for filtering and diagnostics; the scheduler itself
/// treats it as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DeviceTimer,
    VideoScanline,
    AudioTick,
    DiskMotor,
    Custom(u16),
}

/// Read-only bundle handed to every callback: shared handles to the bus
/// and the signal lines. The dispatching scheduler is passed alongside, so
/// a callback can reschedule itself and read the current cycle from it.
#[derive(Clone)]
pub struct EventContext {
    pub bus: MainBus,
    pub signals: SignalBus,
}

impl EventContext {
    pub fn new(bus: MainBus, signals: SignalBus) -> Self {
        EventContext { bus, signals }
    }
}

pub type EventCallback = Rc<dyn Fn(&mut Scheduler, &EventContext)>;

struct ScheduledEvent {
    handle: EventHandle,
    cycle: Cycle,
    priority: u8,
    sequence: u64,
    kind: EventKind,
    callback: EventCallback,
    tag: Option<String>,
}

impl ScheduledEvent {
    fn key(&self) -> (Cycle, u8, u64) {
        (self.cycle, self.priority, self.sequence)
    }
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key order so the earliest
        // (cycle, priority, sequence) is at the top.
        other.key().cmp(&self.key())
    }
}

pub struct Scheduler {
    now: Cycle,
    heap: BinaryHeap<ScheduledEvent>,
    tombstones: HashSet<EventHandle>,
    next_handle: u64,
    next_sequence: u64,
    ctx: Option<Rc<EventContext>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            now: 0,
            heap: BinaryHeap::new(),
            tombstones: HashSet::new(),
            next_handle: 0,
            next_sequence: 0,
            ctx: None,
        }
    }

    pub fn now(&self) -> Cycle {
        self.now
    }

    pub fn set_context(&mut self, ctx: EventContext) {
        self.ctx = Some(Rc::new(ctx));
    }

    /// Queue depth, counting cancelled events whose slots have not been
    /// reclaimed yet.
    pub fn pending_event_count(&self) -> usize {
        self.heap.len()
    }

    pub fn schedule_at(
        &mut self,
        cycle: Cycle,
        kind: EventKind,
        priority: u8,
        callback: EventCallback,
        tag: Option<&str>,
    ) -> EventHandle {
        let handle = EventHandle(self.next_handle);
        self.next_handle += 1;
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            handle,
            cycle,
            priority,
            sequence,
            kind,
            callback,
            tag: tag.map(str::to_string),
        });
        handle
    }

    pub fn schedule_after(
        &mut self,
        delta: Cycle,
        kind: EventKind,
        priority: u8,
        callback: EventCallback,
        tag: Option<&str>,
    ) -> EventHandle {
        self.schedule_at(self.now + delta, kind, priority, callback, tag)
    }

    /// Tombstones the handle. The first call for any given handle returns
    /// `true` — including a handle this scheduler never issued, which
    /// records the intent to cancel — and repeats return `false`. Crossing
    /// the tombstone threshold compacts cancelled events out of the queue.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let first = self.tombstones.insert(handle);
        if self.tombstones.len() > TOMBSTONE_COMPACT_THRESHOLD {
            self.compact();
        }
        first
    }

    fn compact(&mut self) {
        let tombstones = &self.tombstones;
        self.heap.retain(|e| !tombstones.contains(&e.handle));
        tracing::debug!(
            pending = self.heap.len(),
            "compacted cancelled events out of the queue"
        );
    }

    fn drop_cancelled_top(&mut self) {
        while let Some(top) = self.heap.peek() {
            if !self.tombstones.contains(&top.handle) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Cycle stamp of the earliest live event.
    pub fn peek_next_due(&mut self) -> Option<Cycle> {
        self.drop_cancelled_top();
        self.heap.peek().map(|e| e.cycle)
    }

    fn bound_context(&self) -> Result<Rc<EventContext>, SchedulerError> {
        self.ctx.clone().ok_or(SchedulerError::ContextUnbound)
    }

    /// Pops and runs every live event stamped at or before `now`, in
    /// `(cycle, priority, sequence)` order. `now` does not move. Events a
    /// callback schedules at or before `now` are picked up by the same
    /// call. Returns how many callbacks ran.
    pub fn dispatch_due(&mut self) -> Result<usize, SchedulerError> {
        let ctx = self.bound_context()?;
        let mut dispatched = 0;
        while let Some(ev) = self.pop_due(self.now) {
            self.run_event(ev, &ctx);
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn run_event(&mut self, ev: ScheduledEvent, ctx: &Rc<EventContext>) {
        tracing::trace!(
            cycle = ev.cycle,
            kind = ?ev.kind,
            tag = ev.tag.as_deref(),
            "dispatch event"
        );
        (ev.callback)(self, ctx.as_ref());
    }

    fn pop_due(&mut self, upto: Cycle) -> Option<ScheduledEvent> {
        self.drop_cancelled_top();
        if self.heap.peek().is_some_and(|e| e.cycle <= upto) {
            self.heap.pop()
        } else {
            None
        }
    }

    /// Advances to `cycle`, stopping at every intermediate event stamp:
    /// `now` is set to each due event's own cycle before its callback runs,
    /// so every callback observes exactly its scheduled time. Afterwards
    /// `now` is `max(now, cycle)`.
    pub fn advance(&mut self, cycle: Cycle) -> Result<(), SchedulerError> {
        let ctx = self.bound_context()?;
        loop {
            self.drop_cancelled_top();
            let Some(top) = self.heap.peek() else { break };
            if top.cycle > cycle {
                break;
            }
            self.now = self.now.max(top.cycle);
            while let Some(ev) = self.pop_due(self.now) {
                self.run_event(ev, &ctx);
            }
        }
        self.now = self.now.max(cycle);
        Ok(())
    }

    /// Jumps `now` to the earliest live event and dispatches everything due
    /// there. Returns `false` when the queue holds no live events.
    pub fn jump_to_next_event(&mut self) -> Result<bool, SchedulerError> {
        let ctx = self.bound_context()?;
        self.drop_cancelled_top();
        let Some(top) = self.heap.peek() else {
            return Ok(false);
        };
        self.now = self.now.max(top.cycle);
        while let Some(ev) = self.pop_due(self.now) {
            self.run_event(ev, &ctx);
        }
        Ok(true)
    }

    /// Clears the queue and tombstones and rewinds `now` to zero. The
    /// event context is dropped; it must be re-bound before the next
    /// dispatch. Handle ids are not reused.
    pub fn reset(&mut self) {
        tracing::debug!(dropped = self.heap.len(), "scheduler reset");
        self.heap.clear();
        self.tombstones.clear();
        self.now = 0;
        self.ctx = None;
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("pending", &self.heap.len())
            .field("tombstones", &self.tombstones.len())
            .field("context_bound", &self.ctx.is_some())
            .finish()
    }
}
