//! Physical byte storage and the bus-target endpoints that serve it.
//!
//! [`PhysicalMemory`] owns a contiguous zero-initialised buffer and vends
//! [`MemSlice`]/[`RoMemSlice`] views that alias the same storage. Targets
//! ([`RamTarget`], [`RomTarget`], anything implementing [`BusTarget`]) hold
//! such views and answer reads and writes at physical offsets. The bus never
//! owns the memory; it holds targets through page entries.

mod phys;
mod surface;
mod target;

pub use phys::{MemSlice, PhysAccessToken, PhysicalMemory, RoMemSlice, SliceError};
pub use surface::MemoryBus;
pub use target::{BusTarget, Composite, CompositeTarget, RamTarget, RomTarget, SubTarget};
