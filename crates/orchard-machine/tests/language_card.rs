mod helpers;

use helpers::stock_machine;
use orchard_types::FLOATING_BUS;
use pretty_assertions::assert_eq;

#[test]
fn power_on_reads_rom_with_writes_landing_in_ram() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    assert!(!lc.is_reading_ram());
    assert!(lc.is_write_enabled());
    assert!(lc.bank2_selected());

    // Write goes to bank 2 RAM even while reads come from ROM.
    bus.write_u8(0xD000, 0x42);
    assert_eq!(bus.read_u8(0xD000), 0xFF);

    // $C080: read RAM bank 2, write protect.
    bus.read_u8(0xC080);
    assert!(lc.is_reading_ram());
    assert!(!lc.is_write_enabled());
    assert_eq!(bus.read_u8(0xD000), 0x42);

    // Protected: this store vanishes.
    bus.write_u8(0xD000, 0x00);
    assert_eq!(bus.read_u8(0xD000), 0x42);
}

#[test]
fn write_enable_requires_two_consecutive_odd_reads() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    bus.read_u8(0xC080); // write protect first
    assert!(!lc.is_write_enabled());

    bus.read_u8(0xC081);
    assert!(!lc.is_write_enabled()); // armed, not enabled
    bus.read_u8(0xC081);
    assert!(lc.is_write_enabled());
}

#[test]
fn an_even_read_between_the_pair_disarms_the_protocol() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    bus.read_u8(0xC080);
    bus.read_u8(0xC081); // armed
    bus.read_u8(0xC080); // disarms and protects
    bus.read_u8(0xC081); // arming over from scratch
    assert!(!lc.is_write_enabled());
    bus.read_u8(0xC081);
    assert!(lc.is_write_enabled());
}

#[test]
fn writing_a_switch_clears_the_pre_write_arm() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    bus.read_u8(0xC080);
    bus.read_u8(0xC081); // armed
    bus.write_u8(0xC081, 0x00); // write clears the arm, not the protocol
    bus.read_u8(0xC081);
    assert!(!lc.is_write_enabled());
    bus.read_u8(0xC081);
    assert!(lc.is_write_enabled());
}

#[test]
fn switch_reads_return_the_floating_bus() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    for offset in 0x80..=0x8F {
        assert_eq!(bus.read_u8(0xC000 + offset), FLOATING_BUS);
    }
}

#[test]
fn read_source_and_bank_decode_from_the_switch_offset() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    for offset in 0x80u32..=0x8F {
        bus.read_u8(0xC000 + offset);
        let sw = offset & 0x0F;
        assert_eq!(lc.is_reading_ram(), matches!(sw & 3, 0 | 3), "switch {sw:X}");
        assert_eq!(lc.bank2_selected(), sw & 8 == 0, "switch {sw:X}");
    }
}

#[test]
fn the_two_d000_banks_hold_independent_bytes() {
    let machine = stock_machine();
    let bus = machine.bus().clone();

    // Read RAM bank 2, write enabled (RR on $C083).
    bus.read_u8(0xC083);
    bus.read_u8(0xC083);
    assert_eq!(bus.read_u8(0xD000), 0x00);
    bus.write_u8(0xD000, 0x42);
    assert_eq!(bus.read_u8(0xD000), 0x42);

    // Bank 1 via $C08B: fresh storage.
    bus.read_u8(0xC08B);
    bus.read_u8(0xC08B);
    assert_eq!(bus.read_u8(0xD000), 0x00);
    bus.write_u8(0xD000, 0x99);
    assert_eq!(bus.read_u8(0xD000), 0x99);

    // Back to bank 2: its byte survived.
    bus.read_u8(0xC083);
    assert_eq!(bus.read_u8(0xD000), 0x42);

    // And the ROM is untouched by all of it.
    bus.read_u8(0xC081);
    assert_eq!(bus.read_u8(0xD000), 0xFF);
}

#[test]
fn the_high_region_is_a_single_bank() {
    let machine = stock_machine();
    let bus = machine.bus().clone();

    bus.read_u8(0xC083);
    bus.read_u8(0xC083);
    bus.write_u8(0xE123, 0x77);
    bus.write_u8(0xFFFE, 0x88);
    assert_eq!(bus.read_u8(0xE123), 0x77);

    // Bank select only affects $D000..$DFFF.
    bus.read_u8(0xC08B);
    assert_eq!(bus.read_u8(0xE123), 0x77);
    assert_eq!(bus.read_u8(0xFFFE), 0x88);
}

#[test]
fn debug_reads_never_advance_the_switch_protocol() {
    let machine = stock_machine();
    let bus = machine.bus().clone();
    let lc = machine.language_card();

    bus.read_u8(0xC080);
    bus.read_u8(0xC081); // armed

    // A debugger sweeping the soft-switch page must not complete the pair
    // (nor disturb the arm with its even-address passes).
    let bytes = bus.inspect(0xC080, 16);
    assert!(bytes.iter().all(|&b| b == FLOATING_BUS));
    assert!(!lc.is_write_enabled());

    bus.read_u8(0xC081);
    assert!(lc.is_write_enabled());

    // Inspecting the banked region reads the current source (ROM after
    // the odd switch) silently.
    assert_eq!(bus.inspect(0xD000, 2), vec![0xFF, 0xFF]);
}
