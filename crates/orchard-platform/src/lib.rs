//! The I/O page and the slot backplane.
//!
//! The soft-switch page is a 256-entry dispatch table of per-offset
//! read/write handlers; the seven expansion slots hang off it through
//! [`SlotManager`], which also owns the per-slot 256-byte ROM windows and
//! the shared 2 KiB expansion-ROM window. [`IoRegionTarget`] stitches the
//! three sub-regions into the single bus page the canonical machine maps at
//! `$C000`.

mod io_page;
mod slots;

pub use io_page::{IoHandlerEntry, IoPageDispatcher, IoPageTarget, IoReadFn, IoWriteFn, SlotIoHandlers};
pub use slots::{
    IoRegionTarget, MotherboardDevice, PeripheralKind, SlotCard, SlotCardHandle, SlotError,
    SlotManager,
};
