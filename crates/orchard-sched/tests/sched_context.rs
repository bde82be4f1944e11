use std::rc::Rc;

use orchard_bus::{LayeredMapping, MainBus};
use orchard_interrupts::{SignalBus, SignalLine};
use orchard_mem::{PhysicalMemory, RamTarget};
use orchard_sched::{EventContext, EventKind, Scheduler};
use orchard_types::{PagePerms, RegionTag, TargetCaps};

const RW_CAPS: TargetCaps = TargetCaps::SUPPORTS_PEEK
    .union(TargetCaps::SUPPORTS_POKE)
    .union(TargetCaps::SUPPORTS_WIDE);

fn machine_bus() -> MainBus {
    let bus = MainBus::new(16).unwrap();
    let mem = PhysicalMemory::new(0x4000, "main");
    bus.map_region(
        0,
        0x4000,
        1,
        RegionTag::Ram,
        PagePerms::ALL,
        RW_CAPS,
        Rc::new(RamTarget::new(mem.slice(0, 0x4000).unwrap())),
        0,
    )
    .unwrap();
    bus
}

#[test]
fn callbacks_reach_the_bus_and_signal_lines_through_the_context() {
    let bus = machine_bus();
    let signals = SignalBus::new();
    let mut sched = Scheduler::new();
    sched.set_context(EventContext::new(bus.clone(), signals.clone()));

    sched.schedule_at(
        60,
        EventKind::DeviceTimer,
        0,
        Rc::new(|sched, ctx| {
            ctx.bus.write_u8(0x0100, 0x5C);
            ctx.signals.assert(SignalLine::Irq, 5, sched.now());
        }),
        Some("vbl"),
    );

    sched.advance(59).unwrap();
    assert!(!signals.is_asserted(SignalLine::Irq));

    sched.advance(60).unwrap();
    assert_eq!(bus.read_u8(0x0100), 0x5C);
    assert!(signals.is_asserted(SignalLine::Irq));
}

#[test]
fn callbacks_may_rewire_bus_mappings_mid_run() {
    let bus = machine_bus();
    bus.save_base_mapping_range(0, 4).unwrap();

    let shadow = PhysicalMemory::new(0x1000, "shadow");
    shadow.fill(0x99);
    bus.create_layer("shadow", 10).unwrap();
    bus.add_layered_mapping(LayeredMapping {
        virtual_base: 0x1000,
        size: 0x1000,
        layer: "shadow".to_string(),
        device_id: 3,
        region: RegionTag::Ram,
        perms: PagePerms::ALL,
        caps: RW_CAPS,
        target: Rc::new(RamTarget::new(shadow.slice(0, 0x1000).unwrap())),
        phys_base: 0,
    })
    .unwrap();

    let mut sched = Scheduler::new();
    sched.set_context(EventContext::new(bus.clone(), SignalBus::new()));
    sched.schedule_at(
        10,
        EventKind::Custom(7),
        0,
        Rc::new(|_sched, ctx| {
            ctx.bus.activate_layer("shadow").unwrap();
        }),
        None,
    );

    assert_eq!(bus.read_u8(0x1000), 0x00);
    sched.advance(10).unwrap();
    assert_eq!(bus.read_u8(0x1000), 0x99);
}

#[test]
fn a_device_driven_by_events_toggles_a_signal_deterministically() {
    // Square-wave generator: flips IRQ every 8 cycles, twice.
    fn arm(sched: &mut Scheduler, phase: bool, remaining: u32) {
        if remaining == 0 {
            return;
        }
        sched.schedule_after(
            8,
            EventKind::DeviceTimer,
            1,
            Rc::new(move |sched, ctx| {
                if phase {
                    ctx.signals.assert(SignalLine::Irq, 2, sched.now());
                } else {
                    ctx.signals.deassert(SignalLine::Irq, 2, sched.now());
                }
                arm(sched, !phase, remaining - 1);
            }),
            None,
        );
    }

    let signals = SignalBus::new();
    let mut sched = Scheduler::new();
    sched.set_context(EventContext::new(machine_bus(), signals.clone()));
    arm(&mut sched, true, 4);

    sched.advance(8).unwrap();
    assert!(signals.is_asserted(SignalLine::Irq));
    sched.advance(16).unwrap();
    assert!(!signals.is_asserted(SignalLine::Irq));
    sched.advance(24).unwrap();
    assert!(signals.is_asserted(SignalLine::Irq));
    sched.advance(32).unwrap();
    assert!(!signals.is_asserted(SignalLine::Irq));
}
