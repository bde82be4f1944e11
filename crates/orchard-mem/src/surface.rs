use orchard_types::{Addr, Cycle};

/// The memory surface the CPU and simple collaborators consume. Infallible:
/// implementations resolve faults internally (panic with the formatted
/// fault, return floating-bus values, or whatever their contract says);
/// callers that need fault values use the implementation's fallible API
/// directly.
pub trait MemoryBus {
    fn size(&self) -> usize;

    fn read_u8(&mut self, addr: Addr) -> u8;

    fn write_u8(&mut self, addr: Addr, value: u8);

    fn read_u16(&mut self, addr: Addr) -> u16;

    fn write_u16(&mut self, addr: Addr, value: u16);

    fn read_u32(&mut self, addr: Addr) -> u32;

    fn write_u32(&mut self, addr: Addr, value: u32);

    fn read_word(&mut self, addr: Addr) -> u16 {
        self.read_u16(addr)
    }

    fn write_word(&mut self, addr: Addr, value: u16) {
        self.write_u16(addr, value)
    }

    /// Side-effect-free debug read of a byte range. Unreadable bytes come
    /// back as the floating-bus value.
    fn inspect(&mut self, start: Addr, len: usize) -> Vec<u8>;

    /// Debug wipe of RAM-tagged pages only. ROM, I/O, and device regions
    /// are untouched.
    fn clear_ram(&mut self);

    fn cycle_count(&self) -> Cycle;

    fn reset_cycle_count(&mut self);
}
