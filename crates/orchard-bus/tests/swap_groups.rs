use std::rc::Rc;

use orchard_bus::{LayeredMapping, MainBus, SwapError, SwapGroupId};
use orchard_mem::{BusTarget, PhysicalMemory, RamTarget, RomTarget};
use orchard_types::{AccessIntent, FaultKind, PagePerms, RegionTag, TargetCaps};

const RW_CAPS: TargetCaps = TargetCaps::SUPPORTS_PEEK
    .union(TargetCaps::SUPPORTS_POKE)
    .union(TargetCaps::SUPPORTS_WIDE);

struct LanguageCardFixture {
    bus: MainBus,
    group: SwapGroupId,
}

/// ROM at $D000..$FFFF as the base mapping, plus a swap group over the
/// first 4 KiB with rom / bank1 / bank2 variants.
fn language_card_fixture() -> LanguageCardFixture {
    let bus = MainBus::new(16).unwrap();

    let rom = PhysicalMemory::new(0x3000, "rom");
    rom.fill(0xFF);
    let rom_target: Rc<dyn BusTarget> =
        Rc::new(RomTarget::new(rom.read_only_slice(0, 0x3000).unwrap()));
    bus.map_region(
        0xD000,
        0x3000,
        1,
        RegionTag::Rom,
        PagePerms::ALL,
        TargetCaps::SUPPORTS_PEEK | TargetCaps::SUPPORTS_WIDE,
        rom_target.clone(),
        0,
    )
    .unwrap();
    bus.save_base_mapping_range(0xD, 3).unwrap();

    let banks = PhysicalMemory::new(0x2000, "lc-ram");
    let bank1: Rc<dyn BusTarget> = Rc::new(RamTarget::new(banks.slice(0, 0x1000).unwrap()));
    let bank2: Rc<dyn BusTarget> = Rc::new(RamTarget::new(banks.slice(0x1000, 0x1000).unwrap()));

    let group = bus.create_swap_group("d000-bank", 0xD000, 0x1000).unwrap();
    bus.add_swap_variant(group, "rom", rom_target, 0, PagePerms::READ_EXECUTE)
        .unwrap();
    bus.add_swap_variant(group, "bank1", bank1, 0, PagePerms::ALL)
        .unwrap();
    bus.add_swap_variant(group, "bank2", bank2, 0, PagePerms::ALL)
        .unwrap();

    LanguageCardFixture { bus, group }
}

#[test]
fn bank_switching_preserves_each_banks_contents() {
    let LanguageCardFixture { bus, group } = language_card_fixture();

    // No variant active yet: the base ROM answers.
    assert_eq!(bus.read_u8(0xD000), 0xFF);
    assert_eq!(bus.active_swap_variant(group).unwrap(), None);

    bus.activate_swap_variant(group, "bank2").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x00);
    bus.write_u8(0xD000, 0x42);
    assert_eq!(bus.read_u8(0xD000), 0x42);

    bus.activate_swap_variant(group, "bank1").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x00);
    bus.write_u8(0xD000, 0x99);

    bus.activate_swap_variant(group, "bank2").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x42); // bank2 kept its byte

    bus.activate_swap_variant(group, "rom").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0xFF);
    assert_eq!(bus.active_swap_variant(group).unwrap(), Some("rom".to_string()));

    bus.activate_swap_variant(group, "bank1").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x99);
}

#[test]
fn variant_switches_only_touch_the_group_range() {
    let LanguageCardFixture { bus, group } = language_card_fixture();
    bus.activate_swap_variant(group, "bank1").unwrap();

    // $E000.. stays on the base ROM mapping.
    assert_eq!(bus.read_u8(0xE000), 0xFF);
    assert_eq!(bus.read_u8(0xD000), 0x00);
}

#[test]
fn deactivating_the_group_restores_the_saved_base() {
    let LanguageCardFixture { bus, group } = language_card_fixture();

    bus.activate_swap_variant(group, "bank1").unwrap();
    bus.write_u8(0xD123, 0x55);
    bus.deactivate_swap_group(group).unwrap();

    assert_eq!(bus.read_u8(0xD123), 0xFF); // ROM again
    assert_eq!(bus.active_swap_variant(group).unwrap(), None);

    bus.activate_swap_variant(group, "bank1").unwrap();
    assert_eq!(bus.read_u8(0xD123), 0x55);
}

#[test]
fn rom_variant_swallows_writes_like_hardware() {
    let LanguageCardFixture { bus, group } = language_card_fixture();
    bus.activate_swap_variant(group, "bank2").unwrap();
    bus.write_u8(0xD000, 0x42);

    bus.activate_swap_variant(group, "rom").unwrap();
    // The rom variant has no write permission; the bus faults the store.
    let acc = bus.access(AccessIntent::DataWrite, 0xD000);
    assert_eq!(
        bus.try_write8(0xD000, 0x00, &acc).unwrap_err().kind,
        FaultKind::Permission
    );

    bus.activate_swap_variant(group, "bank2").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x42);
}

#[test]
fn an_active_layer_always_beats_the_swap_variant() {
    let LanguageCardFixture { bus, group } = language_card_fixture();
    bus.activate_swap_variant(group, "bank1").unwrap();
    bus.write_u8(0xD000, 0x31);

    let shadow = PhysicalMemory::new(0x1000, "shadow");
    shadow.fill(0x77);
    bus.create_layer("debug-shadow", 100).unwrap();
    bus.add_layered_mapping(LayeredMapping {
        virtual_base: 0xD000,
        size: 0x1000,
        layer: "debug-shadow".to_string(),
        device_id: 9,
        region: RegionTag::Ram,
        perms: PagePerms::ALL,
        caps: RW_CAPS,
        target: Rc::new(RamTarget::new(shadow.slice(0, 0x1000).unwrap())),
        phys_base: 0,
    })
    .unwrap();

    bus.activate_layer("debug-shadow").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x77);

    // Dropping the layer falls back to the still-active variant.
    bus.deactivate_layer("debug-shadow").unwrap();
    assert_eq!(bus.read_u8(0xD000), 0x31);
}

#[test]
fn group_and_variant_lookups_fail_loudly() {
    let bus = MainBus::new(16).unwrap();

    // An id issued by a different bus resolves nowhere on this one.
    let other = MainBus::new(16).unwrap();
    let foreign = other.create_swap_group("g", 0x0000, 0x1000).unwrap();
    assert_eq!(
        bus.active_swap_variant(foreign).unwrap_err(),
        SwapError::UnknownGroup(foreign)
    );

    let mem = PhysicalMemory::new(0x1000, "bank");
    let target: Rc<dyn BusTarget> = Rc::new(RamTarget::new(mem.slice(0, 0x1000).unwrap()));
    assert!(matches!(
        bus.add_swap_variant(foreign, "x", target.clone(), 0, PagePerms::ALL)
            .unwrap_err(),
        SwapError::UnknownGroup(_)
    ));

    let group = bus.create_swap_group("g", 0xD000, 0x1000).unwrap();
    bus.add_swap_variant(group, "a", target.clone(), 0, PagePerms::ALL)
        .unwrap();
    assert!(matches!(
        bus.add_swap_variant(group, "a", target, 0, PagePerms::ALL)
            .unwrap_err(),
        SwapError::DuplicateVariant { .. }
    ));
    assert!(matches!(
        bus.activate_swap_variant(group, "missing").unwrap_err(),
        SwapError::UnknownVariant { .. }
    ));

    assert!(matches!(
        bus.create_swap_group("bad", 0x0100, 0x1000).unwrap_err(),
        SwapError::Unaligned {
            param: "virtualAddress",
            ..
        }
    ));

    assert_eq!(bus.swap_group_id("g"), Some(group));
    assert_eq!(bus.swap_group_id("nope"), None);
}
